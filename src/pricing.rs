// ===============================
// src/pricing.rs
// ===============================
use chrono::{DateTime, Duration, Utc};

use crate::domain::{Merchant, PaymentRail, TradeOffer, PRICE_LOCK_MINUTES};

/// Platform margin deducted from the reference price (3%).
pub const PLATFORM_MARGIN: f64 = 0.03;

#[derive(Debug, Clone)]
pub struct PricingEngine {
    pub margin: f64,
    pub local_currency: String,
}

impl Default for PricingEngine {
    fn default() -> Self { Self { margin: PLATFORM_MARGIN, local_currency: "KES".to_string() } }
}

impl PricingEngine {
    pub fn new(local_currency: impl Into<String>) -> Self {
        Self { local_currency: local_currency.into(), ..Self::default() }
    }

    /// Harga offer = referensi * (1 - margin). 0 = belum tersedia.
    pub fn offer_price(&self, reference_local: f64) -> f64 {
        if !reference_local.is_finite() || reference_local <= 0.0 {
            return 0.0;
        }
        reference_local * (1.0 - self.margin)
    }

    /// Lock an offer for the selected rail. `reference_local` is the spot price
    /// in local currency (None before the feed has loaded or when degraded).
    pub fn lock_offer(
        &self,
        reference_local: Option<f64>,
        rail: PaymentRail,
        merchant: &Merchant,
        now: DateTime<Utc>,
    ) -> TradeOffer {
        let unit_price = self.offer_price(reference_local.unwrap_or(0.0));
        self.offer_at(unit_price, rail, merchant, now)
    }

    /// Offer at a fixed listing price (bypasses the margin).
    pub fn offer_at(&self, unit_price: f64, rail: PaymentRail, merchant: &Merchant, now: DateTime<Utc>) -> TradeOffer {
        TradeOffer {
            unit_price: if unit_price.is_finite() && unit_price > 0.0 { unit_price } else { 0.0 },
            rail,
            local_currency: self.local_currency.clone(),
            merchant_id: merchant.id.clone(),
            locked_at: now,
            expires_at: now + Duration::minutes(PRICE_LOCK_MINUTES),
            limits: merchant.limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merchants::MerchantDirectory;

    #[test]
    fn offer_price_applies_margin() {
        let p = PricingEngine::default();
        for r in [1.0, 4.82, 680.41, 123_456.0] {
            assert!((p.offer_price(r) - r * 0.97).abs() <= 1e-9 * r);
        }
    }

    #[test]
    fn unknown_reference_is_unavailable() {
        let p = PricingEngine::default();
        assert_eq!(p.offer_price(0.0), 0.0);
        assert_eq!(p.offer_price(-3.0), 0.0);
        assert_eq!(p.offer_price(f64::NAN), 0.0);
        let dir = MerchantDirectory::builtin();
        let offer = p.lock_offer(None, PaymentRail::MobileMoney, dir.default_merchant(), Utc::now());
        assert!(!offer.is_available());
    }

    #[test]
    fn lock_window_is_fifteen_minutes() {
        let p = PricingEngine::new("KES");
        let dir = MerchantDirectory::builtin();
        let now = Utc::now();
        let offer = p.lock_offer(Some(680.0), PaymentRail::BankTransfer, dir.default_merchant(), now);
        assert_eq!(offer.expires_at - offer.locked_at, Duration::minutes(15));
        assert!((offer.unit_price - 659.6).abs() < 1e-9);
        assert_eq!(offer.local_currency, "KES");
        assert!(!offer.is_expired(now + Duration::minutes(14)));
        assert!(offer.is_expired(now + Duration::minutes(15)));
    }
}

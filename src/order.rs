// ===============================
// src/order.rs
// ===============================
//
// Settlement request message: snapshot of offer + quote + network + account
// + referral, rendered as one text payload for the messaging channel.
// No error path: missing optional fields render as `N/A`.
//
use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Merchant, NetworkOption, ReferralState, SettlementQuote, TradeOffer};
use crate::metrics::ORDERS;

pub const PLACEHOLDER: &str = "N/A";
pub const ORDER_NO_MIN: u32 = 100_000;
pub const ORDER_NO_MAX: u32 = 999_999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub order_number: u32,
    pub offer: TradeOffer,
    pub quote: SettlementQuote,
    pub network: Option<String>,
    pub deposit_address: Option<String>,
    pub account_ref: Option<String>,
    pub referral: ReferralState,
    pub created_at: DateTime<Utc>,
    pub local_time: String,
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub struct OrderInput<'a> {
    pub offer: &'a TradeOffer,
    pub quote: &'a SettlementQuote,
    pub network: Option<&'a NetworkOption>,
    pub account_ref: Option<&'a str>,
    pub referral: &'a ReferralState,
    pub merchant: Option<&'a Merchant>,
}

pub fn build<R: Rng + ?Sized>(
    input: OrderInput<'_>,
    now: DateTime<Utc>,
    offset: FixedOffset,
    rng: &mut R,
) -> SettlementRequest {
    ORDERS.inc();
    SettlementRequest {
        order_number: rng.gen_range(ORDER_NO_MIN..=ORDER_NO_MAX),
        offer: input.offer.clone(),
        quote: *input.quote,
        network: non_empty(input.network.map(|n| n.name.as_str())),
        deposit_address: non_empty(input.merchant.and_then(|m| m.deposit_address.as_deref())),
        account_ref: non_empty(input.account_ref),
        referral: input.referral.clone(),
        created_at: now,
        local_time: now.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string(),
    }
}

impl SettlementRequest {
    pub fn render(&self) -> String {
        let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| PLACEHOLDER.to_string());
        let mut lines = vec![
            format!("NEW SELL ORDER #{}", self.order_number),
            format!("Amount: {} WLD", self.quote.quantity),
            format!("Network: {}", or_na(&self.network)),
            format!("Deposit address: {}", or_na(&self.deposit_address)),
            format!("Time: {}", self.local_time),
            format!("Payment method: {}", self.offer.rail),
            format!("You receive: {:.2} {}", self.quote.net, self.offer.local_currency.to_ascii_uppercase()),
            format!("Account: {}", or_na(&self.account_ref)),
        ];
        if let Some(r) = self.referral.referrer_id.as_deref().filter(|r| !r.is_empty()) {
            lines.push(format!("Referred by: {r}"));
        }
        lines.join("\n")
    }

    /// Pre-filled chat deep link. Without a phone number the user picks the chat.
    pub fn deep_link(&self, phone: Option<&str>) -> String {
        message_link(phone, &self.render())
    }
}

pub fn message_link(phone: Option<&str>, text: &str) -> String {
    let enc = urlencoding::encode(text);
    match phone.filter(|p| !p.is_empty()) {
        Some(p) => format!("https://wa.me/{p}?text={enc}"),
        None => format!("https://wa.me/?text={enc}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentRail;
    use crate::merchants::MerchantDirectory;
    use crate::pricing::PricingEngine;
    use crate::settlement::SettlementCalculator;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eat() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn sample(referral: ReferralState, account: Option<&str>) -> SettlementRequest {
        let now = Utc.with_ymd_and_hms(2025, 3, 18, 12, 0, 0).unwrap();
        let dir = MerchantDirectory::builtin();
        let m = dir.default_merchant();
        let offer = PricingEngine::new("kes").offer_at(660.0, PaymentRail::BankTransfer, m, now);
        let quote = SettlementCalculator::default().quote(&offer, Some(1000.0), now).unwrap();
        build(
            OrderInput {
                offer: &offer,
                quote: &quote,
                network: m.networks.first(),
                account_ref: account,
                referral: &referral,
                merchant: Some(m),
            },
            now,
            eat(),
            &mut StdRng::seed_from_u64(11),
        )
    }

    #[test]
    fn renders_full_message() {
        let req = sample(ReferralState { referrer_id: Some("alice".into()) }, Some("Equity Bank 0123456789"));
        let text = req.render();
        assert!((ORDER_NO_MIN..=ORDER_NO_MAX).contains(&req.order_number));
        assert!(text.starts_with(&format!("NEW SELL ORDER #{}", req.order_number)));
        assert!(text.contains("Amount: 1000 WLD"));
        assert!(text.contains("Network: OPTIMISM (Optimism Network)"));
        assert!(text.contains("Deposit address: 0x5e7ef40b29147e856a3615bbef78140f5d19844e"));
        assert!(text.contains("Time: 18/03/2025 15:00"));
        assert!(text.contains("Payment method: Bank Transfer"));
        assert!(text.contains("You receive: 659892.00 KES"));
        assert!(text.contains("Account: Equity Bank 0123456789"));
        assert!(text.ends_with("Referred by: alice"));
    }

    #[test]
    fn no_referral_line_and_placeholders() {
        let req = sample(ReferralState::default(), Some("   "));
        let text = req.render();
        assert!(!text.contains("Referred by"));
        assert!(text.contains("Account: N/A"));
    }

    #[test]
    fn deep_link_is_url_encoded() {
        let req = sample(ReferralState::default(), None);
        let link = req.deep_link(Some("254700000001"));
        assert!(link.starts_with("https://wa.me/254700000001?text=NEW%20SELL%20ORDER%20%23"));
        assert!(!link.contains('\n'));
        assert!(link.contains("%0A"));
        assert!(req.deep_link(None).starts_with("https://wa.me/?text="));
    }

    #[test]
    fn order_numbers_stay_six_digits() {
        let mut rng = StdRng::seed_from_u64(0);
        let now = Utc::now();
        let dir = MerchantDirectory::builtin();
        let offer = PricingEngine::default().offer_at(660.0, PaymentRail::Lightning, dir.default_merchant(), now);
        let q = SettlementQuote::zero();
        let r = ReferralState::default();
        for _ in 0..1_000 {
            let req = build(
                OrderInput { offer: &offer, quote: &q, network: None, account_ref: None, referral: &r, merchant: None },
                now,
                eat(),
                &mut rng,
            );
            assert_eq!(req.order_number.to_string().len(), 6);
            assert!(req.render().contains("Network: N/A"));
        }
    }
}

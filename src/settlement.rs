// ===============================
// src/settlement.rs
// ===============================
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{SettlementQuote, TradeOffer};
use crate::fees::FeeSchedule;
use crate::metrics::QUOTES;

#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    #[error("Price lock expired at {expires_at}; request a fresh offer")]
    OfferExpired { expires_at: DateTime<Utc> },
    #[error("offer price unavailable (reference price not loaded)")]
    PriceUnavailable,
    #[error("quantity missing or invalid")]
    NoQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitCheck { Within, BelowMin, AboveMax }

/// Raw user input -> quantity. Kosong / bukan angka / <= 0 -> None.
pub fn parse_quantity(raw: Option<&str>) -> Option<f64> {
    let q = raw?.trim().parse::<f64>().ok()?;
    (q.is_finite() && q > 0.0).then_some(q)
}

#[derive(Debug, Clone, Default)]
pub struct SettlementCalculator {
    pub fees: FeeSchedule,
}

impl SettlementCalculator {
    pub fn new(fees: FeeSchedule) -> Self { Self { fees } }

    /// Recomputed synchronously on every quantity change.
    /// Invalid quantity yields a zeroed quote; an expired offer is rejected.
    pub fn quote(
        &self,
        offer: &TradeOffer,
        quantity: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<SettlementQuote, SettlementError> {
        if offer.is_expired(now) {
            return Err(SettlementError::OfferExpired { expires_at: offer.expires_at });
        }
        let quantity = match quantity {
            Some(q) if q.is_finite() && q > 0.0 => q,
            _ => return Ok(SettlementQuote::zero()),
        };

        let gross = quantity * offer.unit_price;
        let fee = self.fees.fee_for(offer.rail, gross);
        let net = (gross - fee).max(0.0);
        QUOTES.inc();
        Ok(SettlementQuote { quantity, gross, fee, net })
    }

    pub fn quote_raw(
        &self,
        offer: &TradeOffer,
        raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SettlementQuote, SettlementError> {
        self.quote(offer, parse_quantity(raw), now)
    }

    /// Quote yang boleh dijadikan settlement request: harga harus tersedia
    /// dan quantity valid. Quote biasa tetap boleh 0 (tampilan "unavailable").
    pub fn order_quote(
        &self,
        offer: &TradeOffer,
        raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SettlementQuote, SettlementError> {
        if !offer.is_available() {
            return Err(SettlementError::PriceUnavailable);
        }
        let q = self.quote_raw(offer, raw, now)?;
        if q.is_zero() {
            return Err(SettlementError::NoQuantity);
        }
        Ok(q)
    }
}

/// Cek gross terhadap limit listing (informational).
pub fn check_limits(offer: &TradeOffer, quote: &SettlementQuote) -> LimitCheck {
    if quote.gross < offer.limits.min {
        LimitCheck::BelowMin
    } else if quote.gross > offer.limits.max {
        LimitCheck::AboveMax
    } else {
        LimitCheck::Within
    }
}

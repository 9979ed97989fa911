// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Price-lock window advertised to the counterparty.
pub const PRICE_LOCK_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint { pub label: String, pub price: f64 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange { H1, D1, W1, M1, Y1 }

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [TimeRange::H1, TimeRange::D1, TimeRange::W1, TimeRange::M1, TimeRange::Y1];

    /// Lookback `days` yang diminta ke provider.
    pub fn provider_days(&self) -> u32 {
        match self {
            TimeRange::H1 | TimeRange::D1 => 1,
            TimeRange::W1 => 7,
            TimeRange::M1 => 30,
            TimeRange::Y1 => 365,
        }
    }

    /// Span actually displayed (1H is cut out of the 1-day window).
    pub fn span(&self) -> Duration {
        match self {
            TimeRange::H1 => Duration::minutes(60),
            TimeRange::D1 => Duration::days(1),
            TimeRange::W1 => Duration::days(7),
            TimeRange::M1 => Duration::days(30),
            TimeRange::Y1 => Duration::days(365),
        }
    }

    pub fn label_format(&self) -> &'static str {
        match self {
            TimeRange::H1 | TimeRange::D1 => "%H:%M",
            TimeRange::W1 | TimeRange::M1 => "%m/%d",
            TimeRange::Y1 => "%m/%Y",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::H1 => "1H",
            TimeRange::D1 => "1D",
            TimeRange::W1 => "1W",
            TimeRange::M1 => "1M",
            TimeRange::Y1 => "1Y",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TimeRange {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        TimeRange::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| format!("unknown range `{wanted}` (expected 1H|1D|1W|1M|1Y)"))
    }
}

/// One published view of the market. Replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub series: Vec<PricePoint>,
    /// Spot price in the chart (quote) currency.
    pub reference_price: f64,
    /// Spot price in the local settlement currency; `None` when degraded.
    pub local_price: Option<f64>,
    pub change_percent: f64,
    pub range: TimeRange,
    pub degraded: bool,
    /// Spot price arrived but the series has not yet.
    pub provisional: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Persentase perubahan first -> last. 0 jika series kosong.
pub fn change_percent(series: &[PricePoint]) -> f64 {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) if first.price != 0.0 => (last.price - first.price) / first.price * 100.0,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentRail { Lightning, MobileMoney, BankTransfer }

impl PaymentRail {
    /// Flat transfer fee only applies to fiat rails.
    pub fn charges_transfer_fee(&self) -> bool {
        matches!(self, PaymentRail::MobileMoney | PaymentRail::BankTransfer)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentRail::Lightning => "BTC Lightning",
            PaymentRail::MobileMoney => "M-Pesa",
            PaymentRail::BankTransfer => "Bank Transfer",
        }
    }
}

impl fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.display_name()) }
}

impl FromStr for PaymentRail {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lightning" | "btc" | "ln" => Ok(PaymentRail::Lightning),
            "mobile_money" | "mobilemoney" | "mpesa" | "m-pesa" => Ok(PaymentRail::MobileMoney),
            "bank_transfer" | "banktransfer" | "bank" => Ok(PaymentRail::BankTransfer),
            other => Err(format!("unknown payment rail `{other}` (expected lightning|mpesa|bank)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderLimits { pub min: f64, pub max: f64 }

impl Default for OrderLimits {
    fn default() -> Self { Self { min: 10.0, max: 100_000.0 } }
}

/// Offer locked at selection time. `unit_price` never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub unit_price: f64,
    pub rail: PaymentRail,
    pub local_currency: String,
    pub merchant_id: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub limits: OrderLimits,
}

impl TradeOffer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }

    /// 0 berarti harga belum tersedia (pre-load).
    pub fn is_available(&self) -> bool { self.unit_price > 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SettlementQuote { pub quantity: f64, pub gross: f64, pub fee: f64, pub net: f64 }

impl SettlementQuote {
    pub fn zero() -> Self { Self::default() }
    pub fn is_zero(&self) -> bool { self.quantity == 0.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferralState { pub referrer_id: Option<String> }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOption { pub name: String, pub notes: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    pub deposit_address: Option<String>,
    pub networks: Vec<NetworkOption>,
    pub limits: OrderLimits,
}

/// Events yang direkam ke JSONL (lihat recorder.rs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Snapshot(MarketSnapshot),
    Quote { offer: TradeOffer, quote: SettlementQuote },
    Settlement(crate::order::SettlementRequest),
}

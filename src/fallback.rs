// ===============================
// src/fallback.rs
// ===============================
//
// Synthetic price history for degraded mode (feed unreachable).
// - random walk, step uniform in [-0.075, +0.075], floored at 0.1
// - timestamps evenly spaced across the range window, ending at `now`
// - RNG is passed in: production seeds from the clock, tests pin a seed
//
use chrono::{DateTime, FixedOffset, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{PricePoint, TimeRange};

pub const DEFAULT_POINT_COUNT: usize = 50;
pub const START_PRICE: f64 = 4.65;
pub const MAX_STEP: f64 = 0.075;
pub const PRICE_FLOOR: f64 = 0.1;

/// Label bucket sesuai range (dipakai juga oleh feed live).
pub fn format_label(range: TimeRange, ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(range.label_format()).to_string()
}

pub fn generate<R: Rng + ?Sized>(
    range: TimeRange,
    point_count: usize,
    now: DateTime<Utc>,
    offset: FixedOffset,
    rng: &mut R,
) -> Vec<PricePoint> {
    if point_count == 0 {
        return Vec::new();
    }
    let span_ms = range.span().num_milliseconds();
    let step_ms = if point_count > 1 { span_ms / (point_count as i64 - 1) } else { 0 };
    let start = now - chrono::Duration::milliseconds(step_ms * (point_count as i64 - 1));

    let mut price = START_PRICE;
    let mut out = Vec::with_capacity(point_count);
    for i in 0..point_count {
        let delta: f64 = rng.gen_range(-MAX_STEP..=MAX_STEP);
        price = (price + delta).max(PRICE_FLOOR);
        let ts = start + chrono::Duration::milliseconds(step_ms * i as i64);
        out.push(PricePoint { label: format_label(range, ts, offset), price });
    }
    out
}

/// RNG produksi: seed dari jam sistem.
pub fn clock_rng() -> StdRng {
    let seed = Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64;
    StdRng::seed_from_u64(seed)
}

// ===============================
// src/fees.rs
// ===============================
//
// Flat transfer fee per gross bracket (local currency units).
// Bracket boundaries are stored as [min_inclusive, max_exclusive) so that
// fractional amounts like 99.50 still fall into exactly one bracket.
//
use crate::domain::PaymentRail;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBracket {
    pub min_inclusive: f64,
    pub max_exclusive: f64, // f64::INFINITY for the open-ended bracket
    pub fee: f64,
}

impl FeeBracket {
    pub fn contains(&self, gross: f64) -> bool {
        gross >= self.min_inclusive && gross < self.max_exclusive
    }
}

const STANDARD_BRACKETS: [FeeBracket; 5] = [
    FeeBracket { min_inclusive: 0.0, max_exclusive: 100.0, fee: 0.0 },
    FeeBracket { min_inclusive: 100.0, max_exclusive: 1_000.0, fee: 13.0 },
    FeeBracket { min_inclusive: 1_000.0, max_exclusive: 10_000.0, fee: 90.0 },
    FeeBracket { min_inclusive: 10_000.0, max_exclusive: 100_000.0, fee: 108.0 },
    FeeBracket { min_inclusive: 100_000.0, max_exclusive: f64::INFINITY, fee: 108.0 },
];

#[derive(Debug, Clone)]
pub struct FeeSchedule {
    brackets: Vec<FeeBracket>,
}

impl Default for FeeSchedule {
    fn default() -> Self { Self::standard() }
}

impl FeeSchedule {
    /// Jadwal global (satu untuk semua merchant/region).
    pub fn standard() -> Self {
        Self { brackets: STANDARD_BRACKETS.to_vec() }
    }

    #[cfg(test)]
    pub fn brackets(&self) -> &[FeeBracket] { &self.brackets }

    pub fn bracket_for(&self, gross: f64) -> &FeeBracket {
        // negatif / NaN diperlakukan seperti 0
        let g = if gross.is_nan() || gross < 0.0 { 0.0 } else { gross };
        self.brackets
            .iter()
            .find(|b| b.contains(g))
            .unwrap_or(&self.brackets[self.brackets.len() - 1])
    }

    pub fn fee(&self, gross: f64) -> f64 {
        self.bracket_for(gross).fee
    }

    /// Fee gated by rail: Lightning never pays a transfer fee.
    pub fn fee_for(&self, rail: PaymentRail, gross: f64) -> f64 {
        if rail.charges_transfer_fee() { self.fee(gross) } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_boundaries() {
        let s = FeeSchedule::standard();
        assert_eq!(s.fee(0.0), 0.0);
        assert_eq!(s.fee(99.0), 0.0);
        assert_eq!(s.fee(99.99), 0.0);
        assert_eq!(s.fee(100.0), 13.0);
        assert_eq!(s.fee(999.0), 13.0);
        assert_eq!(s.fee(1_000.0), 90.0);
        assert_eq!(s.fee(9_999.0), 90.0);
        assert_eq!(s.fee(10_000.0), 108.0);
        assert_eq!(s.fee(99_999.0), 108.0);
        assert_eq!(s.fee(100_000.0), 108.0);
        assert_eq!(s.fee(1e12), 108.0);
    }

    #[test]
    fn exactly_one_bracket_matches() {
        let s = FeeSchedule::standard();
        let mut g = 0.0;
        while g < 250_000.0 {
            let n = s.brackets().iter().filter(|b| b.contains(g)).count();
            assert_eq!(n, 1, "gross {g} matched {n} brackets");
            g += 37.25;
        }
    }

    #[test]
    fn brackets_are_contiguous_from_zero() {
        let b = FeeSchedule::standard();
        let b = b.brackets();
        assert_eq!(b[0].min_inclusive, 0.0);
        for w in b.windows(2) {
            assert_eq!(w[0].max_exclusive, w[1].min_inclusive);
        }
        assert!(b[b.len() - 1].max_exclusive.is_infinite());
    }

    #[test]
    fn fee_is_idempotent() {
        let s = FeeSchedule::standard();
        for g in [0.0, 99.0, 150.5, 4_200.0, 33_000.0, 660_000.0] {
            assert_eq!(s.fee(g), s.fee(g));
        }
    }

    #[test]
    fn lightning_is_free_and_bad_input_clamps() {
        let s = FeeSchedule::standard();
        assert_eq!(s.fee_for(PaymentRail::Lightning, 660_000.0), 0.0);
        assert_eq!(s.fee_for(PaymentRail::MobileMoney, 500.0), 13.0);
        assert_eq!(s.fee_for(PaymentRail::BankTransfer, 5_000.0), 90.0);
        assert_eq!(s.fee(-5.0), 0.0);
        assert_eq!(s.fee(f64::NAN), 0.0);
    }
}

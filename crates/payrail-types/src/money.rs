//! Fixed-point rounding rules for balance mutations.
//!
//! Two directed roundings, never symmetric:
//!
//! - amounts to be **escrowed** round up (away from zero) to the minor-unit
//!   precision, so the platform never under-collects;
//! - amounts to be **released or credited** truncate (toward zero), so
//!   repeated partial releases can never drift past what was frozen.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount that is about to be frozen. Always rounds away from
/// zero at `dp` decimal places.
#[must_use]
pub fn round_escrow(amount: Decimal, dp: u32) -> Decimal {
    amount.round_dp_with_strategy(dp, RoundingStrategy::AwayFromZero)
}

/// Round an amount that is about to be released or credited. Always
/// truncates toward zero at `dp` decimal places.
#[must_use]
pub fn round_release(amount: Decimal, dp: u32) -> Decimal {
    amount.round_dp_with_strategy(dp, RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escrow_rounds_up() {
        // 10000 / 96 = 104.1666... -> 104.17
        let raw = Decimal::new(10_000, 0) / Decimal::new(96, 0);
        assert_eq!(round_escrow(raw, 2), Decimal::new(10417, 2));
    }

    #[test]
    fn escrow_rounds_up_even_on_tiny_remainder() {
        // 104.7120... -> 104.72, never 104.71
        let raw = Decimal::new(10_000, 0) / Decimal::new(955, 1);
        assert_eq!(round_escrow(raw, 2), Decimal::new(10472, 2));
    }

    #[test]
    fn release_truncates() {
        let raw = Decimal::new(10_000, 0) / Decimal::new(96, 0);
        assert_eq!(round_release(raw, 2), Decimal::new(10416, 2));
    }

    #[test]
    fn exact_amounts_unchanged() {
        let exact = Decimal::new(10471, 2);
        assert_eq!(round_escrow(exact, 2), exact);
        assert_eq!(round_release(exact, 2), exact);
    }

    #[test]
    fn escrow_never_below_release() {
        let samples = [
            Decimal::new(1, 3),
            Decimal::new(999_999, 4),
            Decimal::new(104_712_041, 6),
        ];
        for raw in samples {
            assert!(
                round_escrow(raw, 2) >= round_release(raw, 2),
                "escrow rounding must dominate release rounding for {raw}"
            );
        }
    }

    #[test]
    fn repeated_release_rounding_is_stable() {
        // Truncation is idempotent: rounding an already-rounded value
        // must not move it again.
        let once = round_release(Decimal::new(104_712_041, 6), 2);
        let twice = round_release(once, 2);
        assert_eq!(once, twice);
    }
}

//! Rounding rules.
//!
//! Currency amounts are `Decimal` and are rounded to whole currency units,
//! half away from zero. Physical quantities are `f64` and are never rounded when
//! reserved; only batch-level consumption summaries round to 2 decimal places.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept by consumption summaries.
pub const QUANTITY_DECIMAL_PLACES: i32 = 2;

/// Round a currency amount to the nearest whole unit (half away from zero).
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a physical quantity to `QUANTITY_DECIMAL_PLACES` decimal places.
pub fn round_quantity(quantity: f64) -> f64 {
    let factor = 10f64.powi(QUANTITY_DECIMAL_PLACES);
    (quantity * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn currency_rounds_half_away_from_zero() {
        assert_eq!(round_currency(dec!(2.5)), dec!(3));
        assert_eq!(round_currency(dec!(3.5)), dec!(4));
        assert_eq!(round_currency(dec!(-2.5)), dec!(-3));
        assert_eq!(round_currency(dec!(10.49)), dec!(10));
    }

    #[test]
    fn quantity_rounds_to_two_places() {
        assert_eq!(round_quantity(0.1 + 0.2), 0.3);
        assert_eq!(round_quantity(1.005_1), 1.01);
        assert_eq!(round_quantity(4.0), 4.0);
    }

    proptest! {
        #[test]
        fn rounded_quantity_is_within_half_a_hundredth(q in 0.0f64..1_000_000.0) {
            let r = round_quantity(q);
            prop_assert!((r - q).abs() <= 0.005 + 1e-9);
        }

        #[test]
        fn rounded_currency_has_no_fraction(cents in -10_000_000i64..10_000_000i64) {
            let amount = Decimal::new(cents, 2);
            let rounded = round_currency(amount);
            prop_assert_eq!(rounded.fract(), Decimal::ZERO);
            prop_assert!((rounded - amount).abs() <= dec!(0.5));
        }
    }
}

//! Conversion between decimal dollar amounts and whole cents.
//!
//! Expense amounts are persisted as whole cents so that sums over stored
//! values are exact. Conversion back to dollars happens once, at the query
//! edge.

/// Convert a dollar `amount` to whole cents, rounding half away from zero.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert whole `cents` to a dollar amount.
pub fn to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod money_tests {
    use super::{to_cents, to_dollars};

    #[test]
    fn converts_exact_amounts() {
        assert_eq!(to_cents(12.34), 1234);
        assert_eq!(to_cents(0.01), 1);
        assert_eq!(to_cents(1000.00), 100_000);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // .125 is exactly representable in binary, so these really are halves.
        assert_eq!(to_cents(1.125), 113);
        assert_eq!(to_cents(-1.125), -113);
    }

    #[test]
    fn converts_cents_to_dollars() {
        assert_eq!(to_dollars(1234), 12.34);
        assert_eq!(to_dollars(0), 0.0);
    }

    #[test]
    fn round_trip_is_within_one_cent() {
        for amount in [0.01, 0.99, 1.005, 2.675, 12.34, 123.456, 999.99] {
            let round_tripped = to_dollars(to_cents(amount));

            assert!(
                (round_tripped - amount).abs() <= 0.005,
                "want {amount} within half a cent, got {round_tripped}"
            );
        }
    }
}

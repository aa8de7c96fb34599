//! Currency helpers
//!
//! All amounts are `Decimal`. Rounding to two places happens only at display
//! time and when patching the cached balance after a wallet debit.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half away from zero to two decimal places
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Display form used across the storefront, e.g. `$19.99`
pub fn format_usd(value: Decimal) -> String {
    format!("${:.2}", round2(value))
}

/// Parse a user-entered amount. Returns `None` for blanks and garbage.
pub fn parse_amount(input: &str) -> Option<Decimal> {
    let trimmed = input.trim().trim_start_matches('$');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(dec("30.005")), dec("30.01"));
        assert_eq!(round2(dec("50.00") - dec("19.99")), dec("30.01"));
        assert_eq!(round2(dec("0.1") + dec("0.2")), dec("0.30"));
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(dec("19.9")), "$19.90");
        assert_eq!(format_usd(dec("0")), "$0.00");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 25 "), Some(dec("25")));
        assert_eq!(parse_amount("$10.50"), Some(dec("10.50")));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
    }
}

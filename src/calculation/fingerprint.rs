use std::fmt;

use anyhow::Result;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_decimal_macros::dec;

use crate::util::text;

/// Two digits taken from the fractional part of a price, always `00`..`99`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The shapes a price arrives in from the different upstreams.
#[derive(Debug, Clone, Copy)]
pub enum PriceValue<'a> {
    /// A JSON number. Converted through its shortest text form.
    Float(f64),
    Decimal(Decimal),
    /// Display text such as `"25,176.85"`.
    Text(&'a str),
}

impl PriceValue<'_> {
    pub fn to_decimal(self) -> Result<Decimal> {
        match self {
            PriceValue::Float(f) => text::decimal_from_f64(f),
            PriceValue::Decimal(d) => Ok(d),
            PriceValue::Text(s) => text::parse_decimal(s, None),
        }
    }
}

/// Derives the fingerprint of a price.
///
/// The first two fractional digits are kept and everything after them is
/// dropped, never rounded: `25176.849` gives `84`, `123.4` gives `40` and an
/// integer gives `00`. The sign is ignored.
pub fn extract_fingerprint(price: Decimal) -> Fingerprint {
    let hundredths = (price.abs().fract() * dec!(100)).trunc();
    let digits = hundredths.to_u8().unwrap_or(0);
    Fingerprint(format!("{:02}", digits))
}

/// Normalizes `value` to a decimal and derives its fingerprint.
pub fn extract_fingerprint_from(value: PriceValue<'_>) -> Result<Fingerprint> {
    Ok(extract_fingerprint(value.to_decimal()?))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn fp(s: &str) -> String {
        extract_fingerprint(Decimal::from_str(s).unwrap()).to_string()
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        assert_eq!(fp("25176.849"), "84");
        assert_eq!(fp("25176.8499999"), "84");
        assert_eq!(fp("0.999"), "99");
        assert_eq!(fp("18432.07"), "07");
    }

    #[test]
    fn test_integer_yields_zeroes() {
        assert_eq!(fp("25176"), "00");
        assert_eq!(fp("0"), "00");
        assert_eq!(fp("25176.00"), "00");
    }

    #[test]
    fn test_single_fractional_digit_is_padded() {
        assert_eq!(fp("123.4"), "40");
        assert_eq!(fp("9.0"), "00");
    }

    #[test]
    fn test_sign_is_ignored() {
        assert_eq!(fp("-123.456"), "45");
    }

    #[test]
    fn test_always_two_characters() {
        for s in ["1.01", "1.1", "1", "1.999999", "65535.5", "0.05"] {
            assert_eq!(fp(s).len(), 2, "{}", s);
        }
    }

    #[test]
    fn test_idempotent() {
        let price = Decimal::from_str("80597.669").unwrap();
        assert_eq!(extract_fingerprint(price), extract_fingerprint(price));
        assert_eq!(extract_fingerprint(price).as_str(), "66");
    }

    #[test]
    fn test_from_text_with_thousands_separator() {
        let result = extract_fingerprint_from(PriceValue::Text("18,432.07")).unwrap();
        assert_eq!(result.as_str(), "07");
        let result = extract_fingerprint_from(PriceValue::Text("25,176.85")).unwrap();
        assert_eq!(result.as_str(), "85");
    }

    #[test]
    fn test_from_float_uses_shortest_form() {
        // 25176.85 is 25176.849999999998544808477163314819335937500 in binary.
        let result = extract_fingerprint_from(PriceValue::Float(25176.85)).unwrap();
        assert_eq!(result.as_str(), "85");
        let result = extract_fingerprint_from(PriceValue::Float(44000.1)).unwrap();
        assert_eq!(result.as_str(), "10");
    }

    #[test]
    fn test_from_invalid_text() {
        assert!(extract_fingerprint_from(PriceValue::Text("--")).is_err());
        assert!(extract_fingerprint_from(PriceValue::Float(f64::INFINITY)).is_err());
    }
}

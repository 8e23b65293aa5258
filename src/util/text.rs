use std::{collections::HashSet, str::FromStr};

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;

/// Characters that show up around a quoted price on pages and feeds but are
/// never part of the number itself.
const NUMBER_ESCAPE_CHAR: &[char] = &[
    ',', ' ', '_', '\'', '"', '\n', '\r', '\t', '\u{a0}', '\u{202f}', '+', '$', '€', '£', '¥',
    '₹', '₩', '元', '%',
];

/// Parses a decimal value from a given string.
///
/// Thousands separators and the usual currency/whitespace noise are removed
/// before parsing, so `"25,176.85"` and `"₹ 25 176.85"` both become
/// `25176.85`. The value keeps every fractional digit that was present in the
/// text; nothing goes through a binary float.
///
/// # Arguments
///
/// * `s`: the textual number.
/// * `escape_chars`: optional extra characters to drop before parsing.
///
/// # Example
///
/// ```ignore
/// let price = parse_decimal("18,432.07", None)?;
/// assert_eq!(price.to_string(), "18432.07");
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    if cleaned.is_empty() {
        return Err(anyhow!("Failed to parse '{}' as Decimal because it is empty", s));
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// Converts a JSON float into a `Decimal` through its shortest round-trip
/// text form, so `25176.85_f64` becomes exactly `25176.85` instead of the
/// binary expansion `25176.849999...`.
pub fn decimal_from_f64(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(anyhow!("Failed to convert {} to Decimal because it is not finite", value));
    }

    let text = value.to_string();
    Decimal::from_str(&text)
        .map_err(|why| anyhow!("Failed to convert {} to Decimal because {:?}", text, why))
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Removes a set of escape characters from a given string.
///
/// The built-in set (`NUMBER_ESCAPE_CHAR`) is always applied; `escape_chars`
/// extends it.
pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.trim().chars().filter(|c| !filters.contains(c)).collect()
}

//! Price text normalization
//!
//! Retailers print prices as `"299,00 kr"`, `"299:-"`, `"1 299 kr"`,
//! `"100–120 kr"` or bare meta values like `"299.00"`. [`parse_price`] turns
//! any of them into a number rounded to öre, and never fails loudly: an
//! unparseable input is reported through [`ParsedPrice::ok`].

use crate::ParseError;
use serde::{Deserialize, Serialize};

/// Outcome of [`parse_price`].
///
/// `value` is `0.0` whenever `ok` is false. That zero means "unavailable",
/// not "free"; use [`ParsedPrice::amount`] to keep the distinction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedPrice {
    pub value: f64,
    pub ok: bool,
}

impl ParsedPrice {
    pub const UNAVAILABLE: ParsedPrice = ParsedPrice {
        value: 0.0,
        ok: false,
    };

    pub fn amount(&self) -> Option<f64> {
        self.ok.then_some(self.value)
    }
}

/// Tri-state price as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PriceStatus {
    /// Fetch succeeded and the price text parsed.
    Available(f64),
    /// Fetch succeeded but the price was absent or unparseable.
    Unavailable,
    /// The fetch itself failed.
    Failed,
}

impl PriceStatus {
    pub fn amount(&self) -> Option<f64> {
        match self {
            PriceStatus::Available(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<ParsedPrice> for PriceStatus {
    fn from(parsed: ParsedPrice) -> Self {
        match parsed.amount() {
            Some(v) => PriceStatus::Available(v),
            None => PriceStatus::Unavailable,
        }
    }
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

const CURRENCY_MARKERS: [&str; 4] = ["kr", "sek", ":-", ",-"];

/// Normalize localized price text into a number.
///
/// Strips currency markers, ordinary, non-breaking and narrow spaces, and
/// anything after an opening parenthesis. A comma decimal separator becomes
/// a point. For ranges (`"100–120"`) only the first bound is used.
///
/// Never fails loudly; see [`try_parse_price`] for the reason behind an
/// unavailable result.
pub fn parse_price(raw: &str) -> ParsedPrice {
    match try_parse_price(raw) {
        Ok(value) => ParsedPrice { value, ok: true },
        Err(_) => ParsedPrice::UNAVAILABLE,
    }
}

/// Like [`parse_price`], but says why the text was rejected.
///
/// Anything left after the currency markers other than digits, `.`, `,`
/// and whitespace rejects the whole text, so labels such as `"Ord.pris"`
/// or `"3 st för"` never leak digits into the amount. Whitespace between
/// digit groups is only accepted as a thousands separator.
///
/// # Errors
/// Returns [`ParseError::Missing`] for blank text and
/// [`ParseError::Unparseable`] for everything else that is not a price.
pub fn try_parse_price(raw: &str) -> Result<f64, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::Missing);
    }
    let unparseable = || ParseError::Unparseable {
        raw: raw.to_string(),
    };
    if text.starts_with('-') || text.starts_with('\u{2212}') {
        return Err(unparseable());
    }

    let text = text.split('(').next().unwrap_or_default();
    let mut cleaned = first_range_bound(text).to_lowercase();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }

    if cleaned
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == ',' || c == '.' || c.is_whitespace()))
    {
        return Err(unparseable());
    }

    // "299 kr." leaves a trailing point behind.
    let cleaned = cleaned.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    let groups: Vec<&str> = cleaned.split_whitespace().collect();
    if !is_thousands_grouping(&groups) {
        return Err(unparseable());
    }

    let digits: String = groups
        .concat()
        .chars()
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    // "1.299.00" after comma conversion: only the last separator is decimal.
    let canonical = match digits.rfind('.') {
        Some(idx) => {
            let (int_part, frac_part) = digits.split_at(idx);
            format!("{}.{}", int_part.replace('.', ""), &frac_part[1..])
        }
        None => digits,
    };

    if !canonical.chars().any(|c| c.is_ascii_digit()) {
        return Err(unparseable());
    }

    match canonical.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(round2(value)),
        _ => Err(unparseable()),
    }
}

/// `["1", "299,50"]` is one amount; `["50", "199"]` is two.
fn is_thousands_grouping(groups: &[&str]) -> bool {
    let Some((first, rest)) = groups.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let leading = first.len() <= 3 && first.chars().all(|c| c.is_ascii_digit());
    let last = rest.len() - 1;
    leading
        && rest.iter().enumerate().all(|(i, group)| {
            let int_part = if i == last {
                group.split(|c| c == ',' || c == '.').next().unwrap_or_default()
            } else {
                group
            };
            int_part.len() == 3 && int_part.chars().all(|c| c.is_ascii_digit())
        })
}

/// Cut at the first range separator that follows a digit.
fn first_range_bound(text: &str) -> &str {
    let mut seen_digit = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_ascii_digit() {
            seen_digit = true;
            continue;
        }
        if seen_digit && matches!(ch, '\u{2013}' | '\u{2014}' | '-') {
            // "299:-" and "299,-" are currency, not ranges.
            let rest = &text[idx + ch.len_utf8()..];
            if rest.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
                return &text[..idx];
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_swedish_price_with_nbsp() {
        let parsed = parse_price("299,00\u{a0}kr");
        assert!(parsed.ok);
        assert_eq!(parsed.value, 299.00);
    }

    #[test]
    fn test_parse_range_uses_first_bound() {
        assert_eq!(parse_price("100\u{2013}10 kr").value, 100.00);
        assert_eq!(parse_price("100 - 120 kr").value, 100.00);
        assert_eq!(parse_price("149\u{2014}199").value, 149.00);
    }

    #[test]
    fn test_parse_empty_is_unavailable() {
        assert_eq!(parse_price(""), ParsedPrice::UNAVAILABLE);
        assert_eq!(parse_price("   "), ParsedPrice::UNAVAILABLE);
        assert_eq!(parse_price("").amount(), None);
    }

    #[test]
    fn test_parse_already_numeric() {
        assert_eq!(parse_price("299.00").value, 299.00);
        assert_eq!(parse_price("349").value, 349.00);
    }

    #[test]
    fn test_parse_thousands_and_suffixes() {
        assert_eq!(parse_price("1 299 kr").value, 1299.00);
        assert_eq!(parse_price("1\u{202f}299,50 kr").value, 1299.50);
        assert_eq!(parse_price("299:-").value, 299.00);
        assert_eq!(parse_price("189 SEK").value, 189.00);
        assert_eq!(parse_price("209.00 kr (inkl. 10% studentrabatt)").value, 209.00);
    }

    #[test]
    fn test_parse_rounds_to_two_decimals() {
        assert_eq!(parse_price("12,346").value, 12.35);
        assert_eq!(parse_price("0,004").value, 0.0);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(!parse_price("kr").ok);
        assert!(!parse_price("Slutsåld").ok);
        assert!(!parse_price("-15 kr").ok);
        assert!(!parse_price("...").ok);
        assert!(!parse_price("Ord.pris 349 kr").ok);
        assert!(!parse_price("3 st för 100 kr").ok);
        assert!(!parse_price("ISBN 9789144156798").ok);
        assert!(!parse_price("Spara 50 kr, nu 199 kr").ok);
        assert!(!parse_price("Slutsåld, 2 st kvar").ok);
        assert!(!parse_price("50 kr 199 kr").ok);
        assert!(!parse_price("12 %").ok);
    }

    #[test]
    fn test_try_parse_reports_reason() {
        assert_eq!(try_parse_price("  "), Err(ParseError::Missing));
        assert_eq!(
            try_parse_price("Ord.pris 349 kr"),
            Err(ParseError::Unparseable {
                raw: "Ord.pris 349 kr".to_string()
            })
        );
        assert_eq!(try_parse_price("1 299,50 kr"), Ok(1299.50));
        assert_eq!(try_parse_price("299 kr."), Ok(299.0));
    }

    #[test]
    fn test_genuine_zero_is_ok() {
        let parsed = parse_price("0 kr");
        assert!(parsed.ok);
        assert_eq!(parsed.amount(), Some(0.0));
    }

    #[test]
    fn test_price_status_from_parsed() {
        assert_eq!(
            PriceStatus::from(parse_price("99 kr")),
            PriceStatus::Available(99.0)
        );
        assert_eq!(PriceStatus::from(parse_price("")), PriceStatus::Unavailable);
        assert_eq!(PriceStatus::Failed.amount(), None);
    }
}

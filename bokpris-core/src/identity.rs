//! Book identifier

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical ISBN: separators stripped, check digit `X` upper-cased.
///
/// This is the join key across quotes, ledger rows, the watchlist and the
/// result cache, so two spellings of the same book must compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    /// Canonicalize and validate a user- or file-supplied identifier.
    ///
    /// Hyphens and whitespace are removed. The result must be an ISBN-13
    /// (13 digits) or an ISBN-10 (9 digits followed by a digit or `X`).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let canonical: String = raw
            .chars()
            .filter(|c| *c != '-' && *c != '\u{2010}' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let invalid = |reason: &str| ValidationError::InvalidIdentifier {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        if canonical.is_empty() {
            return Err(invalid("identifier is empty"));
        }

        match canonical.len() {
            13 => {
                if !canonical.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("ISBN-13 must contain only digits"));
                }
            }
            10 => {
                let (body, check) = canonical.split_at(9);
                if !body.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("ISBN-10 body must contain only digits"));
                }
                if !check.chars().all(|c| c.is_ascii_digit() || c == 'X') {
                    return Err(invalid("ISBN-10 check digit must be a digit or X"));
                }
            }
            n => {
                return Err(invalid(&format!("expected 10 or 13 characters, got {}", n)));
            }
        }

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isbn {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(value: Isbn) -> Self {
        value.0
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

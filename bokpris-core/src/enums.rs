//! Retailer discriminator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// The fixed set of purchase and resale venues.
///
/// The slug is the persisted form (ledger `retailer` column, chart keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retailer {
    /// Adlibris Campus: rendered storefront, also a resale venue
    AdlibrisCampus,
    /// Studentapan: second-hand marketplace, also a resale venue
    Studentapan,
    /// Bokus: search-resolved retailer with student discount and promotions
    Bokus,
    /// Akademibokhandeln: direct product path, student discount
    Akademibokhandeln,
}

impl Retailer {
    pub const ALL: [Retailer; 4] = [
        Retailer::AdlibrisCampus,
        Retailer::Studentapan,
        Retailer::Bokus,
        Retailer::Akademibokhandeln,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Retailer::AdlibrisCampus => "adlibris_campus",
            Retailer::Studentapan => "studentapan",
            Retailer::Bokus => "bokus",
            Retailer::Akademibokhandeln => "akademibokhandeln",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Retailer::AdlibrisCampus => "Adlibris Campus",
            Retailer::Studentapan => "Studentapan",
            Retailer::Bokus => "Bokus",
            Retailer::Akademibokhandeln => "Akademibokhandeln",
        }
    }

    /// Venues where a student can sell the book back.
    pub fn is_resale_venue(&self) -> bool {
        matches!(self, Retailer::AdlibrisCampus | Retailer::Studentapan)
    }

    /// Parse a persisted slug. Surrounding whitespace and case are ignored.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let slug = slug.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|r| r.slug() == slug)
    }
}

impl fmt::Display for Retailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Retailer {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s).ok_or_else(|| ValidationError::UnknownRetailer {
            slug: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_roundtrip() {
        for retailer in Retailer::ALL {
            assert_eq!(Retailer::from_slug(retailer.slug()), Some(retailer));
        }
    }

    #[test]
    fn test_from_slug_tolerates_case_and_padding() {
        assert_eq!(Retailer::from_slug(" Bokus "), Some(Retailer::Bokus));
        assert_eq!(Retailer::from_slug("adlibris"), None);
    }

    #[test]
    fn test_resale_venues() {
        let resale: Vec<_> = Retailer::ALL.iter().filter(|r| r.is_resale_venue()).collect();
        assert_eq!(resale, vec![&Retailer::AdlibrisCampus, &Retailer::Studentapan]);
    }

    #[test]
    fn test_serde_uses_slug() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            retailer: Retailer,
        }
        let text = toml::to_string(&Wrapper {
            retailer: Retailer::AdlibrisCampus,
        })
        .unwrap();
        assert!(text.contains("adlibris_campus"));
    }
}

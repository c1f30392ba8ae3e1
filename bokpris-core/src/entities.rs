//! Quotes and persisted price rows

use crate::{Day, Isbn, Retailer, Timestamp};
use serde::{Deserialize, Serialize};

/// One adapter's raw, unparsed retrieval result for one identifier.
///
/// Missing title or price are `None`: the retailer answered, the element was
/// simply absent. A failed retrieval is a `FetchError`, never a `Quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub isbn: Isbn,
    pub retailer: Retailer,
    pub title: Option<String>,
    pub raw_price: Option<String>,
    /// Canonical product page this quote was read from.
    pub product_url: String,
    pub fetched_at: Timestamp,
}

impl Quote {
    pub fn new(isbn: Isbn, retailer: Retailer, product_url: impl Into<String>) -> Self {
        Self {
            isbn,
            retailer,
            title: None,
            raw_price: None,
            product_url: product_url.into(),
            fetched_at: chrono::Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_raw_price(mut self, raw_price: impl Into<String>) -> Self {
        self.raw_price = Some(raw_price.into());
        self
    }

    pub fn fetched_at(mut self, at: Timestamp) -> Self {
        self.fetched_at = at;
        self
    }
}

/// One persisted ledger row.
///
/// At most one row exists per `(date, isbn, retailer)`; the ledger enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: Day,
    pub isbn: Isbn,
    pub retailer: Retailer,
    /// Raw retailer price before any discount. `0.0` marks an unparseable price.
    pub price: f64,
}

impl PriceRecord {
    pub fn new(date: Day, isbn: Isbn, retailer: Retailer, price: f64) -> Self {
        Self {
            date,
            isbn,
            retailer,
            price,
        }
    }

    /// Deduplication key.
    pub fn key(&self) -> (Day, &Isbn, Retailer) {
        (self.date, &self.isbn, self.retailer)
    }

    /// Rows written for a day whose price text could not be parsed.
    pub fn is_unavailable(&self) -> bool {
        self.price <= 0.0
    }
}

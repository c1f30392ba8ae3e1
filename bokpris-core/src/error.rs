//! Error types for bokpris operations

use crate::Retailer;
use thiserror::Error;

/// Retailer-scoped retrieval failures. Never fatal for the other retailers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{retailer}: {step} timed out after {after_ms}ms")]
    Timeout {
        retailer: Retailer,
        step: String,
        after_ms: u64,
    },

    #[error("{retailer}: network failure: {reason}")]
    Network { retailer: Retailer, reason: String },

    #[error("{retailer}: HTTP {status} for {url}")]
    HttpStatus {
        retailer: Retailer,
        status: u16,
        url: String,
    },

    #[error("{retailer}: blocked by anti-bot wall (HTTP {status})")]
    Blocked { retailer: Retailer, status: u16 },

    #[error("{retailer}: no product found for ISBN {isbn}")]
    NoResult { retailer: Retailer, isbn: String },

    #[error("{retailer}: refresh deadline exceeded")]
    DeadlineExceeded { retailer: Retailer },
}

impl FetchError {
    pub fn retailer(&self) -> Retailer {
        match self {
            FetchError::Timeout { retailer, .. }
            | FetchError::Network { retailer, .. }
            | FetchError::HttpStatus { retailer, .. }
            | FetchError::Blocked { retailer, .. }
            | FetchError::NoResult { retailer, .. }
            | FetchError::DeadlineExceeded { retailer } => *retailer,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::HttpStatus { status, .. } => *status >= 500,
            FetchError::Blocked { status, .. } => *status == 429,
            FetchError::NoResult { .. } | FetchError::DeadlineExceeded { .. } => false,
        }
    }
}

/// Price text that could not be normalized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unparseable price text: {raw:?}")]
    Unparseable { raw: String },

    #[error("Price element missing")]
    Missing,
}

/// Ledger and watchlist I/O failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt row in {path} at line {line}: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("Persistence task failed: {reason}")]
    Join { reason: String },
}

impl PersistenceError {
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Promotion {name} for {retailer} ends ({end}) before it starts ({start})")]
    InvalidPromotionRange {
        retailer: Retailer,
        name: String,
        start: String,
        end: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid identifier {raw:?}: {reason}")]
    InvalidIdentifier { raw: String, reason: String },

    #[error("Unknown retailer slug: {slug}")]
    UnknownRetailer { slug: String },
}

/// Discount calculation failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PricingError {
    #[error("No discount policy configured for {retailer}")]
    NoPolicy { retailer: Retailer },

    #[error("Invalid base price: {value}")]
    InvalidBasePrice { value: f64 },
}

/// Master error type for all bokpris errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BokprisError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),
}

/// Result type alias for bokpris operations.
pub type BokprisResult<T> = Result<T, BokprisError>;

// =============================================================================
// TESTS
// =============================================================================

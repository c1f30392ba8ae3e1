//! Bokpris Core - Domain Types and Pricing Rules
//!
//! Pure data structures and pure functions. Every other crate depends on this.
//! Nothing in here performs network or file I/O except configuration loading.

pub mod clock;
pub mod config;
pub mod discount;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod price;
pub mod resale;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BokprisConfig, FetchConfig, RefreshConfig, RetryConfig, StoreEndpoints, CACHE_TTL_SECS,
};
pub use discount::{DiscountEngine, DiscountedPrice, Promotion, RetailerPolicy};
pub use entities::{PriceRecord, Quote};
pub use enums::Retailer;
pub use error::{
    BokprisError, BokprisResult, ConfigError, FetchError, ParseError, PersistenceError,
    PricingError, ValidationError,
};
pub use identity::Isbn;
pub use price::{parse_price, round2, try_parse_price, ParsedPrice, PriceStatus};
pub use resale::resale_proceeds;
pub use retry::retry_async;

/// Calendar day used for ledger rows and promotion windows.
pub type Day = chrono::NaiveDate;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

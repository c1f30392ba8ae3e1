//! Bokpris Storage - Ledger, Watchlist and Result Cache
//!
//! The ledger is the sole writer of price rows and enforces one row per
//! `(date, identifier, retailer)`. Calls are blocking file I/O; async
//! callers run them on a blocking thread.

pub mod cache;
pub mod ledger;
pub mod registry;
pub mod watchlist;

pub use cache::{CacheKey, CacheRead, CacheStats, ResultCache, ViewKind};
pub use ledger::{
    CsvLedger, InMemoryLedger, TimeSeriesLedger, WriteOutcome, LEDGER_HEADER, LEGACY_LEDGER_HEADER,
};
pub use registry::{WatchEntry, WatchListRegistry};
pub use watchlist::WatchlistFile;

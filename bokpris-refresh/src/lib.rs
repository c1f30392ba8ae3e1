//! Bokpris Refresh - Orchestration, Scheduling and the Query Service
//!
//! [`RefreshOrchestrator`] refreshes one identifier at every retailer.
//! [`RefreshScheduler`] sweeps stale identifiers once a day. [`PriceService`]
//! ties them to the ledger, watchlist and chart cache behind a start/stop
//! lifecycle.

pub mod orchestrator;
pub mod scheduler;
pub mod service;
pub mod telemetry;
pub mod views;

pub use orchestrator::{
    RefreshOrchestrator, RefreshReport, RetailerOutcome, FETCH_FAILED_LABEL, PRICE_MISSING_LABEL,
};
pub use scheduler::{
    next_run_after, RefreshScheduler, SchedulerMetrics, SchedulerSnapshot, SweepSchedule,
    SweepSummary,
};
pub use service::PriceService;
pub use telemetry::{init_tracing, LogFormat, DEFAULT_LOG_FILTER};
pub use views::{ChartPayload, Series};

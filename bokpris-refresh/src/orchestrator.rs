//! One identifier's refresh across every retailer
//!
//! Adapters run in parallel under a shared per-identifier deadline. Each
//! retailer's outcome is settled on its own: a fetch failure, an unparseable
//! price or a failed ledger write never touches the other retailers.

use bokpris_core::{
    resale_proceeds, retry_async, try_parse_price, BokprisError, Clock, Day, DiscountEngine,
    FetchError, Isbn, ParseError, PersistenceError, PriceRecord, PriceStatus, Quote, Retailer,
    RetryConfig,
};
use bokpris_storage::{TimeSeriesLedger, WriteOutcome};
use bokpris_stores::AdapterSet;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shown when the retailer answered without a usable price.
pub const PRICE_MISSING_LABEL: &str = "Pris saknas";
/// Shown when the fetch itself failed.
pub const FETCH_FAILED_LABEL: &str = "Hämtning misslyckades";

// ============================================================================
// REPORT TYPES
// ============================================================================

/// What happened at one retailer during one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RetailerOutcome {
    pub retailer: Retailer,
    pub title: Option<String>,
    pub status: PriceStatus,
    /// Buyer-facing price text, discount terms included where configured.
    pub display_price: String,
    /// Product page resolved by this call. Never shared between refreshes.
    pub product_url: Option<String>,
    /// Seller proceeds at resale venues, when a price is available.
    pub resale_proceeds: Option<f64>,
    /// Whether a ledger row exists for today after this refresh.
    pub persisted: bool,
    /// Why the price is unavailable. Not a failure: the sentinel is recorded.
    pub parse_error: Option<ParseError>,
    /// Fetch or persistence failure, if any.
    pub error: Option<BokprisError>,
}

impl RetailerOutcome {
    fn failed(retailer: Retailer, error: FetchError) -> Self {
        Self {
            retailer,
            title: None,
            status: PriceStatus::Failed,
            display_price: FETCH_FAILED_LABEL.to_string(),
            product_url: None,
            resale_proceeds: None,
            persisted: false,
            parse_error: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate result of refreshing one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub isbn: Isbn,
    /// Ledger date and promotion reference date used for this refresh.
    pub reference_date: Day,
    pub outcomes: BTreeMap<Retailer, RetailerOutcome>,
}

impl RefreshReport {
    /// First title any retailer returned, in retailer order.
    pub fn title(&self) -> Option<&str> {
        self.outcomes.values().find_map(|o| o.title.as_deref())
    }

    /// Outcomes carrying an error.
    pub fn failures(&self) -> impl Iterator<Item = &RetailerOutcome> {
        self.outcomes.values().filter(|o| o.is_failure())
    }

    /// Outcomes without an error, including unavailable prices.
    pub fn successes(&self) -> impl Iterator<Item = &RetailerOutcome> {
        self.outcomes.values().filter(|o| !o.is_failure())
    }

    pub fn outcome(&self, retailer: Retailer) -> Option<&RetailerOutcome> {
        self.outcomes.get(&retailer)
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Fans a refresh out to every registered adapter and records the results.
pub struct RefreshOrchestrator {
    adapters: AdapterSet,
    ledger: Arc<dyn TimeSeriesLedger>,
    engine: Arc<DiscountEngine>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    deadline: Duration,
}

impl RefreshOrchestrator {
    /// Create an orchestrator.
    ///
    /// # Arguments
    /// * `adapters` - Retailers to query on every refresh
    /// * `ledger` - Destination for raw prices
    /// * `engine` - Discount terms used for display prices
    /// * `clock` - Source of the ledger date and promotion reference date
    pub fn new(
        adapters: AdapterSet,
        ledger: Arc<dyn TimeSeriesLedger>,
        engine: Arc<DiscountEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapters,
            ledger,
            engine,
            clock,
            retry: RetryConfig::default(),
            deadline: Duration::from_millis(bokpris_core::config::DEFAULT_REFRESH_DEADLINE_MS),
        }
    }

    /// Retry policy for ledger writes.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overall time allowed for all adapter calls of one identifier.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Refresh `isbn` at every retailer.
    ///
    /// Adapter calls still running at the deadline are dropped and reported
    /// as `FetchError::DeadlineExceeded`. Ledger writes happen after the
    /// fetches and are not subject to the deadline.
    pub async fn refresh(&self, isbn: &Isbn) -> RefreshReport {
        let reference_date = self.clock.today();
        let deadline = Instant::now() + self.deadline;
        tracing::debug!(isbn = %isbn, retailers = self.adapters.len(), "Refresh started");

        let fetches = self.adapters.iter().map(|(retailer, adapter)| async move {
            let result = match tokio::time::timeout_at(deadline, adapter.fetch(isbn)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::DeadlineExceeded { retailer }),
            };
            (retailer, result)
        });
        let fetched = join_all(fetches).await;

        let settled = join_all(
            fetched
                .into_iter()
                .map(|(retailer, result)| self.settle(isbn, reference_date, retailer, result)),
        )
        .await;

        let report = RefreshReport {
            isbn: isbn.clone(),
            reference_date,
            outcomes: settled.into_iter().map(|o| (o.retailer, o)).collect(),
        };

        tracing::info!(
            isbn = %isbn,
            succeeded = report.successes().count(),
            failed = report.failures().count(),
            "Refresh completed"
        );
        report
    }

    async fn settle(
        &self,
        isbn: &Isbn,
        reference_date: Day,
        retailer: Retailer,
        result: Result<Quote, FetchError>,
    ) -> RetailerOutcome {
        let quote = match result {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(isbn = %isbn, retailer = %retailer, error = %e, "Fetch failed");
                return RetailerOutcome::failed(retailer, e);
            }
        };

        let parsed = quote
            .raw_price
            .as_deref()
            .ok_or(ParseError::Missing)
            .and_then(try_parse_price);
        let (status, parse_error) = match parsed {
            Ok(value) => (PriceStatus::Available(value), None),
            Err(e) => {
                tracing::info!(
                    isbn = %isbn,
                    retailer = %retailer,
                    error = %e,
                    "Price unavailable, recording sentinel"
                );
                (PriceStatus::Unavailable, Some(e))
            }
        };

        let price = status.amount().unwrap_or(0.0);
        let record = PriceRecord::new(reference_date, isbn.clone(), retailer, price);
        let (persisted, error) = match self.persist(record).await {
            Ok(_) => (true, None),
            Err(e) => {
                tracing::error!(isbn = %isbn, retailer = %retailer, error = %e, "Ledger write failed");
                (false, Some(BokprisError::from(e)))
            }
        };

        RetailerOutcome {
            retailer,
            display_price: self.display_price(retailer, status, reference_date),
            resale_proceeds: status.amount().and_then(|v| resale_proceeds(retailer, v)),
            title: quote.title,
            status,
            product_url: Some(quote.product_url),
            persisted,
            parse_error,
            error,
        }
    }

    fn display_price(&self, retailer: Retailer, status: PriceStatus, reference_date: Day) -> String {
        let Some(amount) = status.amount() else {
            return match status {
                PriceStatus::Failed => FETCH_FAILED_LABEL.to_string(),
                _ => PRICE_MISSING_LABEL.to_string(),
            };
        };
        if !self.engine.has_policy(retailer) {
            return format!("{:.2} kr", amount);
        }
        match self.engine.discounted_price(amount, retailer, reference_date) {
            Ok(discounted) => discounted.display_price,
            Err(e) => {
                tracing::warn!(retailer = %retailer, error = %e, "Discount not applied");
                format!("{:.2} kr", amount)
            }
        }
    }

    /// Write on a blocking thread, retrying transient failures.
    ///
    /// A write that has started runs to completion even if this future is
    /// dropped.
    async fn persist(&self, record: PriceRecord) -> Result<WriteOutcome, PersistenceError> {
        let outcome = retry_async(
            &self.retry,
            "ledger_write",
            |e: &PersistenceError| !matches!(e, PersistenceError::LockPoisoned),
            || {
                let ledger = self.ledger.clone();
                let record = record.clone();
                async move {
                    tokio::task::spawn_blocking(move || ledger.write(&record))
                        .await
                        .map_err(|e| PersistenceError::Join {
                            reason: e.to_string(),
                        })
                        .and_then(|written| written)
                }
            },
        )
        .await?;

        if outcome == WriteOutcome::Duplicate {
            tracing::debug!(
                isbn = %record.isbn,
                retailer = %record.retailer,
                date = %record.date,
                "Row for today already recorded"
            );
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("adapters", &self.adapters)
            .field("deadline", &self.deadline)
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Price Service
//!
//! The one object a host process builds at startup. It owns the ledger,
//! watchlist, cache and orchestrator, exposes the query surface used by the
//! presentation layer, and runs the daily scheduler between `start()` and
//! `stop()`.

use crate::{
    ChartPayload, RefreshOrchestrator, RefreshReport, RefreshScheduler, SchedulerMetrics,
    SchedulerSnapshot, SweepSchedule,
};
use bokpris_core::{
    BokprisConfig, BokprisResult, Clock, Day, DiscountEngine, Isbn, PersistenceError,
    PriceRecord, Retailer, SystemClock,
};
use bokpris_storage::{
    CacheKey, CacheRead, CacheStats, CsvLedger, ResultCache, TimeSeriesLedger, ViewKind,
    WatchEntry, WatchListRegistry, WatchlistFile,
};
use bokpris_stores::{AdapterSet, PageFetcher};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Scheduler task plus its shutdown switch.
struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Arc<SchedulerMetrics>>,
}

/// Book price tracking service.
pub struct PriceService {
    config: BokprisConfig,
    ledger: Arc<dyn TimeSeriesLedger>,
    registry: WatchListRegistry,
    cache: Arc<ResultCache<ChartPayload>>,
    orchestrator: Arc<RefreshOrchestrator>,
    scheduler: Arc<RefreshScheduler>,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<Running>>,
}

impl PriceService {
    /// Build the production service: CSV ledger, watchlist file, HTTP adapters
    /// and the system clock.
    ///
    /// # Arguments
    /// * `config` - Validated before anything is built
    /// * `renderer` - Fetcher returning rendered markup for the Campus storefront
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: BokprisConfig, renderer: Arc<dyn PageFetcher>) -> BokprisResult<Self> {
        let adapters = AdapterSet::standard(&config, renderer)?;
        let ledger: Arc<dyn TimeSeriesLedger> = Arc::new(CsvLedger::new(&config.ledger_path));
        Self::with_components(config, ledger, adapters, Arc::new(SystemClock))
    }

    /// Build the service over injected parts.
    ///
    /// # Arguments
    /// * `config` - Validated before anything is built
    /// * `ledger` - Price history store
    /// * `adapters` - Retailers queried on each refresh
    /// * `clock` - Time source for ledger dates, promotions and cache ages
    pub fn with_components(
        config: BokprisConfig,
        ledger: Arc<dyn TimeSeriesLedger>,
        adapters: AdapterSet,
        clock: Arc<dyn Clock>,
    ) -> BokprisResult<Self> {
        config.validate()?;
        for problem in config.invalid_promotions() {
            tracing::warn!(error = %problem, "Promotion will never apply");
        }

        let watchlist = Arc::new(WatchlistFile::new(&config.watchlist_path));
        let registry = WatchListRegistry::new(ledger.clone(), watchlist);
        let cache = Arc::new(ResultCache::new(config.cache_ttl(), clock.clone()));
        let engine = Arc::new(DiscountEngine::new(
            config.policies.clone(),
            config.promotions.clone(),
        ));

        let orchestrator = Arc::new(
            RefreshOrchestrator::new(adapters, ledger.clone(), engine, clock.clone())
                .with_retry(config.retry.clone())
                .with_deadline(config.refresh.deadline()),
        );
        let scheduler = Arc::new(RefreshScheduler::new(
            orchestrator.clone(),
            registry.clone(),
            clock.clone(),
            &config.refresh,
        ));

        tracing::info!(
            ledger = %config.ledger_path.display(),
            watchlist = %config.watchlist_path.display(),
            retailers = orchestrator.adapters().len(),
            "Price service created"
        );

        Ok(Self {
            config,
            ledger,
            registry,
            cache,
            orchestrator,
            scheduler,
            clock,
            running: Mutex::new(None),
        })
    }

    /// Replace the sweep schedule. Takes effect on the next `start()`.
    pub fn with_schedule(mut self, schedule: SweepSchedule) -> Self {
        self.scheduler = Arc::new(
            RefreshScheduler::new(
                self.orchestrator.clone(),
                self.registry.clone(),
                self.clock.clone(),
                &self.config.refresh,
            )
            .with_schedule(schedule),
        );
        self
    }

    pub fn config(&self) -> &BokprisConfig {
        &self.config
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Spawn the scheduler task. Returns `false` if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return false;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.scheduler.clone().run(shutdown_rx));
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        tracing::info!("Price service started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|r| r.is_some())
            .unwrap_or_else(|e| e.into_inner().is_some())
    }

    /// Signal shutdown and wait for the scheduler to finish.
    ///
    /// A sweep in progress launches no further refreshes; refreshes already
    /// running complete their ledger writes first. Returns the final metrics,
    /// or `None` if the service was not running.
    pub async fn stop(&self) -> Option<SchedulerSnapshot> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        let _ = running.shutdown_tx.send(true);
        match running.handle.await {
            Ok(metrics) => {
                tracing::info!("Price service stopped");
                Some(metrics.snapshot())
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduler task ended abnormally");
                Some(self.scheduler.metrics().snapshot())
            }
        }
    }

    pub fn scheduler_metrics(&self) -> SchedulerSnapshot {
        self.scheduler.metrics().snapshot()
    }

    // ========================================================================
    // QUERY SURFACE
    // ========================================================================

    /// Price history for `isbn` in ascending date order.
    ///
    /// Zero-sentinel rows are included; an empty result means nothing has
    /// been recorded yet.
    pub async fn get_series(
        &self,
        isbn: &Isbn,
        retailer: Option<Retailer>,
    ) -> BokprisResult<Vec<PriceRecord>> {
        let ledger = self.ledger.clone();
        let isbn = isbn.clone();
        blocking(move || ledger.read(&isbn, retailer)).await
    }

    /// Latest recorded day per identifier.
    pub async fn latest_update_map(&self) -> BokprisResult<BTreeMap<Isbn, Day>> {
        let registry = self.registry.clone();
        blocking(move || registry.latest_update_map()).await
    }

    /// Watched identifiers with their last update.
    pub async fn watch_entries(&self) -> BokprisResult<Vec<WatchEntry>> {
        let registry = self.registry.clone();
        blocking(move || registry.entries()).await
    }

    /// Start monitoring `isbn`. Returns whether it was newly added.
    pub async fn watch(&self, isbn: &Isbn) -> BokprisResult<bool> {
        let registry = self.registry.clone();
        let isbn = isbn.clone();
        blocking(move || registry.watch(&isbn)).await
    }

    /// Add `isbn` to the watchlist and refresh it now.
    ///
    /// A watchlist failure is logged and does not prevent the refresh.
    pub async fn trigger_refresh(&self, isbn: &Isbn) -> RefreshReport {
        if let Err(e) = self.watch(isbn).await {
            tracing::warn!(isbn = %isbn, error = %e, "Could not add to watchlist");
        }
        self.orchestrator.refresh(isbn).await
    }

    /// Chart payload for `isbn`, served from the cache while fresh.
    pub async fn chart(&self, isbn: &Isbn, view: ViewKind) -> BokprisResult<CacheRead<ChartPayload>> {
        let cache = self.cache.clone();
        let ledger = self.ledger.clone();
        let key = CacheKey::new(isbn.clone(), view);
        blocking(move || {
            cache.get_or_insert_with(key.clone(), || {
                let rows = ledger.read(&key.isbn, None)?;
                Ok(ChartPayload::build(key.view, &rows))
            })
        })
        .await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Run blocking storage work off the async executor.
async fn blocking<T, F>(work: F) -> BokprisResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PersistenceError::Join {
            reason: e.to_string(),
        })??;
    Ok(result)
}

impl std::fmt::Debug for PriceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceService")
            .field("ledger_path", &self.config.ledger_path)
            .field("orchestrator", &self.orchestrator)
            .field("cache", &self.cache)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bokpris_core::{ManualClock, PriceStatus};
    use bokpris_storage::InMemoryLedger;
    use bokpris_stores::{ScriptedAdapter, StaticPageFetcher};
    use bokpris_test_utils::assertions::assert_config_error;
    use bokpris_test_utils::{clock_at, day, sample_isbn};
    use std::time::Duration;

    fn service(dir: &tempfile::TempDir) -> (Arc<ManualClock>, Arc<InMemoryLedger>, PriceService) {
        let config = BokprisConfig::default_config(dir.path());
        let clock = clock_at(2025, 5, 2);
        let ledger = Arc::new(InMemoryLedger::new());
        let mut adapters = AdapterSet::new();
        adapters.register(Arc::new(ScriptedAdapter::quoting(
            Retailer::Bokus,
            Some("Makroekonomi"),
            Some("300 kr"),
        )));
        adapters.register(Arc::new(ScriptedAdapter::quoting(
            Retailer::Studentapan,
            None,
            Some("191 kr"),
        )));
        let service =
            PriceService::with_components(config, ledger.clone(), adapters, clock.clone()).unwrap();
        (clock, ledger, service)
    }

    #[tokio::test]
    async fn test_trigger_refresh_watches_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let (_clock, _ledger, service) = service(&dir);

        let report = service.trigger_refresh(&sample_isbn()).await;
        assert_eq!(
            report.outcome(Retailer::Bokus).unwrap().status,
            PriceStatus::Available(300.0)
        );

        let entries = service.watch_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].last_update, Some(day(2025, 5, 2)));

        let series = service.get_series(&sample_isbn(), Some(Retailer::Bokus)).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].price, 300.0);
    }

    #[tokio::test]
    async fn test_empty_series_means_no_data_yet() {
        let dir = tempfile::tempdir().unwrap();
        let (_clock, _ledger, service) = service(&dir);
        assert!(service.get_series(&sample_isbn(), None).await.unwrap().is_empty());
        assert!(service.latest_update_map().await.unwrap().is_empty());
        let chart = service.chart(&sample_isbn(), ViewKind::Purchase).await.unwrap();
        assert!(chart.value().is_empty());
    }

    #[tokio::test]
    async fn test_chart_is_cached_until_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, _ledger, service) = service(&dir);
        service.trigger_refresh(&sample_isbn()).await;

        let first = service.chart(&sample_isbn(), ViewKind::Resale).await.unwrap();
        assert!(!first.was_cache_hit());
        assert_eq!(first.value().series["studentapan"].prices, vec![100.0]);

        clock.advance(chrono::Duration::days(1));
        service.trigger_refresh(&sample_isbn()).await;
        clock.advance(chrono::Duration::seconds(-86_400 + 60));

        let second = service.chart(&sample_isbn(), ViewKind::Resale).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.value().series["studentapan"].len(), 1);

        clock.advance(chrono::Duration::seconds(1800));
        let third = service.chart(&sample_isbn(), ViewKind::Resale).await.unwrap();
        assert!(!third.was_cache_hit());
        assert_eq!(third.value().series["studentapan"].len(), 2);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (_clock, _ledger, service) = service(&dir);
        let service = service.with_schedule(SweepSchedule::Every(Duration::from_secs(3600)));

        assert!(service.start());
        assert!(!service.start());
        assert!(service.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = service.stop().await.unwrap();
        assert_eq!(snapshot.sweeps, 1);
        assert!(!service.is_running());
        assert!(service.stop().await.is_none());

        assert!(service.start());
        assert!(service.stop().await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BokprisConfig::default_config(dir.path());
        config.refresh.max_concurrent_refreshes = 0;
        let result = PriceService::with_components(
            config,
            Arc::new(InMemoryLedger::new()),
            AdapterSet::new(),
            Arc::new(SystemClock),
        );
        assert_config_error(&result);
    }

    #[test]
    fn test_new_wires_every_retailer() {
        let dir = tempfile::tempdir().unwrap();
        let config = BokprisConfig::default_config(dir.path());
        let service = PriceService::new(config, Arc::new(StaticPageFetcher::new())).unwrap();

        assert_eq!(service.orchestrator.adapters().retailers(), Retailer::ALL.to_vec());
        assert!(!service.is_running());

        let mut bad = BokprisConfig::default_config(dir.path());
        bad.refresh.max_rendered_sessions = bad.refresh.max_static_sessions;
        assert_config_error(&PriceService::new(bad, Arc::new(StaticPageFetcher::new())));
    }
}

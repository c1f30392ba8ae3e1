//! Daily Refresh Sweep
//!
//! Once a day the scheduler asks the watchlist registry which identifiers
//! are stale and refreshes them, a bounded number at a time. Shutdown is a
//! `watch` channel: once it flips to `true` no new refresh is launched,
//! refreshes already running finish, and the task returns its metrics.

use crate::RefreshOrchestrator;
use bokpris_core::{BokprisError, BokprisResult, Clock, Day, Isbn, PersistenceError, RefreshConfig};
use bokpris_storage::WatchListRegistry;
use chrono::{NaiveDateTime, NaiveTime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// SCHEDULE
// ============================================================================

/// When sweeps run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepSchedule {
    /// Every day at this local time.
    DailyAt(NaiveTime),
    /// At a fixed period, starting immediately.
    Every(Duration),
}

impl SweepSchedule {
    /// Daily schedule from the refresh configuration.
    ///
    /// An out-of-range hour or minute falls back to 00:01.
    pub fn from_config(config: &RefreshConfig) -> Self {
        let at = NaiveTime::from_hms_opt(config.sweep_hour, config.sweep_minute, 0)
            .or_else(|| NaiveTime::from_hms_opt(0, 1, 0))
            .unwrap_or(NaiveTime::MIN);
        SweepSchedule::DailyAt(at)
    }
}

/// First occurrence of `at` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        return today;
    }
    now.date()
        .succ_opt()
        .map(|tomorrow| tomorrow.and_time(at))
        .unwrap_or(today)
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for scheduler activity since startup.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Sweeps completed
    pub sweeps: AtomicU64,

    /// Identifier refreshes finished
    pub refreshes: AtomicU64,

    /// Retailer outcomes without an error
    pub retailer_successes: AtomicU64,

    /// Retailer outcomes carrying an error
    pub retailer_failures: AtomicU64,

    /// Stale identifiers not launched because of shutdown
    pub skipped_on_shutdown: AtomicU64,

    /// Sweeps that could not read the stale set
    pub sweep_errors: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            retailer_successes: self.retailer_successes.load(Ordering::Relaxed),
            retailer_failures: self.retailer_failures.load(Ordering::Relaxed),
            skipped_on_shutdown: self.skipped_on_shutdown.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, summary: &SweepSummary) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.refreshes
            .fetch_add(summary.refreshed.len() as u64, Ordering::Relaxed);
        self.retailer_successes
            .fetch_add(summary.succeeded_retailers as u64, Ordering::Relaxed);
        self.retailer_failures
            .fetch_add(summary.failed_retailers as u64, Ordering::Relaxed);
        self.skipped_on_shutdown
            .fetch_add(summary.skipped as u64, Ordering::Relaxed);
    }
}

/// Snapshot of scheduler metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub sweeps: u64,
    pub refreshes: u64,
    pub retailer_successes: u64,
    pub retailer_failures: u64,
    pub skipped_on_shutdown: u64,
    pub sweep_errors: u64,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Refreshes started.
    pub launched: usize,
    /// Identifiers whose refresh ran to completion.
    pub refreshed: Vec<Isbn>,
    pub succeeded_retailers: usize,
    pub failed_retailers: usize,
    /// Stale identifiers left for the next sweep because of shutdown.
    pub skipped: usize,
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Drives stale-identifier sweeps on a schedule.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    registry: WatchListRegistry,
    clock: Arc<dyn Clock>,
    schedule: SweepSchedule,
    max_concurrent: usize,
    metrics: Arc<SchedulerMetrics>,
}

impl RefreshScheduler {
    /// Create a scheduler.
    ///
    /// # Arguments
    /// * `orchestrator` - Runs each identifier's refresh
    /// * `registry` - Source of stale identifiers
    /// * `clock` - Source of the day passed to the stale check
    /// * `config` - Sweep time and concurrency bound
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        registry: WatchListRegistry,
        clock: Arc<dyn Clock>,
        config: &RefreshConfig,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            clock,
            schedule: SweepSchedule::from_config(config),
            max_concurrent: config.max_concurrent_refreshes.max(1),
            metrics: Arc::new(SchedulerMetrics::new()),
        }
    }

    pub fn with_schedule(mut self, schedule: SweepSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn schedule(&self) -> SweepSchedule {
        self.schedule
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    /// Refresh every identifier stale on `today`.
    ///
    /// At most `max_concurrent_refreshes` refreshes run at once. Once
    /// `shutdown` reads `true` no further refresh is launched; launched ones
    /// are awaited.
    ///
    /// # Errors
    /// Fails only when the stale set cannot be read.
    pub async fn sweep(
        &self,
        today: Day,
        shutdown: &watch::Receiver<bool>,
    ) -> BokprisResult<SweepSummary> {
        let mut shutdown = shutdown.clone();
        let registry = self.registry.clone();
        let stale = tokio::task::spawn_blocking(move || registry.stale_identifiers(today))
            .await
            .map_err(|e| PersistenceError::Join {
                reason: e.to_string(),
            })??;

        let total = stale.len();
        tracing::info!(today = %today, stale = total, "Sweep started");

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut summary = SweepSummary::default();
        let mut handles = Vec::with_capacity(total);

        for (idx, isbn) in stale.into_iter().enumerate() {
            if *shutdown.borrow() {
                summary.skipped = total - idx;
                break;
            }
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        summary.skipped = total - idx;
                        break;
                    }
                },
                _ = shutdown_signalled(&mut shutdown) => {
                    summary.skipped = total - idx;
                    break;
                }
            };

            let orchestrator = self.orchestrator.clone();
            summary.launched += 1;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                orchestrator.refresh(&isbn).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(report) => {
                    summary.succeeded_retailers += report.successes().count();
                    summary.failed_retailers += report.failures().count();
                    summary.refreshed.push(report.isbn);
                }
                Err(e) => tracing::error!(error = %e, "Refresh task aborted"),
            }
        }

        if summary.skipped > 0 {
            tracing::info!(skipped = summary.skipped, "Sweep stopped early for shutdown");
        }
        tracing::info!(
            launched = summary.launched,
            succeeded_retailers = summary.succeeded_retailers,
            failed_retailers = summary.failed_retailers,
            "Sweep completed"
        );
        self.metrics.record(&summary);
        Ok(summary)
    }

    /// Sweep on schedule until shutdown.
    ///
    /// # Returns
    ///
    /// Metrics collected during the task's lifetime
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> Arc<SchedulerMetrics> {
        tracing::info!(schedule = ?self.schedule, max_concurrent = self.max_concurrent, "Refresh scheduler started");

        match self.schedule {
            SweepSchedule::Every(period) => {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown_signalled(&mut shutdown_rx) => break,
                        _ = ticker.tick() => self.sweep_once(&shutdown_rx).await,
                    }
                }
            }
            SweepSchedule::DailyAt(at) => loop {
                let now = self.clock.local_now();
                let wait = (next_run_after(now, at) - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tracing::debug!(wait_secs = wait.as_secs(), "Next sweep scheduled");

                tokio::select! {
                    _ = shutdown_signalled(&mut shutdown_rx) => break,
                    _ = tokio::time::sleep(wait) => self.sweep_once(&shutdown_rx).await,
                }
            },
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sweeps = snapshot.sweeps,
            refreshes = snapshot.refreshes,
            retailer_failures = snapshot.retailer_failures,
            skipped_on_shutdown = snapshot.skipped_on_shutdown,
            sweep_errors = snapshot.sweep_errors,
            "Refresh scheduler stopped"
        );
        self.metrics.clone()
    }

    async fn sweep_once(&self, shutdown_rx: &watch::Receiver<bool>) {
        let today = self.clock.today();
        if let Err(e) = self.sweep(today, shutdown_rx).await {
            self.metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            log_sweep_error(&e);
        }
    }
}

fn log_sweep_error(error: &BokprisError) {
    tracing::error!(error = %error, "Sweep failed");
}

/// Resolves once the channel reads `true`. Never resolves if the sender is gone.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("schedule", &self.schedule)
            .field("max_concurrent", &self.max_concurrent)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bokpris_core::{DiscountEngine, ManualClock, PriceRecord, Retailer};
    use bokpris_storage::{InMemoryLedger, TimeSeriesLedger, WatchlistFile};
    use bokpris_stores::{AdapterSet, ScriptedAdapter};
    use bokpris_test_utils::{clock_at, sample_isbns};
    use std::sync::atomic::AtomicUsize;

    fn day(d: u32) -> Day {
        bokpris_test_utils::day(2025, 5, d)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<InMemoryLedger>,
        adapter: Arc<ScriptedAdapter>,
        clock: Arc<ManualClock>,
        scheduler: RefreshScheduler,
    }

    fn fixture(max_concurrent: usize, delay: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let watchlist = Arc::new(WatchlistFile::new(dir.path().join("bevakade_isbn.txt")));
        let registry = WatchListRegistry::new(ledger.clone(), watchlist);
        let clock = clock_at(2025, 5, 10);

        let adapter = Arc::new(
            ScriptedAdapter::quoting(Retailer::Bokus, Some("Bok"), Some("199 kr")).with_delay(delay),
        );
        let mut adapters = AdapterSet::new();
        adapters.register(adapter.clone());

        let orchestrator = Arc::new(RefreshOrchestrator::new(
            adapters,
            ledger.clone(),
            Arc::new(DiscountEngine::default()),
            clock.clone(),
        ));
        let config = RefreshConfig {
            max_concurrent_refreshes: max_concurrent,
            ..RefreshConfig::default()
        };
        let scheduler = RefreshScheduler::new(orchestrator, registry, clock.clone(), &config);
        Fixture {
            _dir: dir,
            ledger,
            adapter,
            clock,
            scheduler,
        }
    }

    /// Record the first `count` sample identifiers yesterday.
    fn seed_stale(ledger: &InMemoryLedger, count: usize) {
        for isbn in sample_isbns().into_iter().take(count) {
            ledger
                .write(&PriceRecord::new(day(9), isbn, Retailer::Bokus, 100.0))
                .unwrap();
        }
    }

    #[test]
    fn test_next_run_after() {
        let at = NaiveTime::from_hms_opt(0, 1, 0).unwrap();
        let before = day(10).and_hms_opt(0, 0, 30).unwrap();
        assert_eq!(next_run_after(before, at), day(10).and_time(at));

        let exactly = day(10).and_time(at);
        assert_eq!(next_run_after(exactly, at), day(11).and_time(at));

        let evening = day(10).and_hms_opt(23, 59, 0).unwrap();
        assert_eq!(next_run_after(evening, at), day(11).and_time(at));
    }

    #[test]
    fn test_schedule_from_config() {
        assert_eq!(
            SweepSchedule::from_config(&RefreshConfig::default()),
            SweepSchedule::DailyAt(NaiveTime::from_hms_opt(0, 1, 0).unwrap())
        );
        let bad = RefreshConfig {
            sweep_hour: 25,
            ..RefreshConfig::default()
        };
        assert_eq!(
            SweepSchedule::from_config(&bad),
            SweepSchedule::DailyAt(NaiveTime::from_hms_opt(0, 1, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_sweep_refreshes_stale_only() {
        let f = fixture(2, Duration::ZERO);
        seed_stale(&f.ledger, 2);
        f.ledger
            .write(&PriceRecord::new(day(10), sample_isbns()[2].clone(), Retailer::Bokus, 1.0))
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let summary = f.scheduler.sweep(day(10), &rx).await.unwrap();

        assert_eq!(summary.launched, 2);
        assert_eq!(summary.refreshed.len(), 2);
        assert_eq!(summary.succeeded_retailers, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(f.adapter.calls(), 2);

        let again = f.scheduler.sweep(day(10), &rx).await.unwrap();
        assert_eq!(again.launched, 0);

        let snapshot = f.scheduler.metrics().snapshot();
        assert_eq!(snapshot.sweeps, 2);
        assert_eq!(snapshot.refreshes, 2);
    }

    #[tokio::test]
    async fn test_sweep_respects_concurrency_bound() {
        let f = fixture(2, Duration::from_millis(100));
        seed_stale(&f.ledger, 4);

        let (_tx, rx) = watch::channel(false);
        let started = std::time::Instant::now();
        let summary = f.scheduler.sweep(day(10), &rx).await.unwrap();

        assert_eq!(summary.refreshed.len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_sweep_launches_nothing_after_shutdown() {
        let f = fixture(1, Duration::ZERO);
        seed_stale(&f.ledger, 2);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let summary = f.scheduler.sweep(day(10), &rx).await.unwrap();

        assert_eq!(summary.launched, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(f.adapter.calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_mid_sweep_lets_running_refresh_finish() {
        let f = fixture(1, Duration::from_millis(200));
        seed_stale(&f.ledger, 3);
        let scheduler = Arc::new(f.scheduler);

        let (tx, rx) = watch::channel(false);
        let sweeping = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.sweep(day(10), &rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let summary = sweeping.await.unwrap().unwrap();
        assert_eq!(summary.launched, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.refreshed.len(), 1);
        assert_eq!(
            f.ledger.rows().iter().filter(|r| r.date == day(10)).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_sweeps_until_shutdown() {
        let f = fixture(2, Duration::ZERO);
        seed_stale(&f.ledger, 1);
        let scheduler =
            Arc::new(f.scheduler.with_schedule(SweepSchedule::Every(Duration::from_millis(20))));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.clone().run(rx));
        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();

        let metrics = task.await.unwrap();
        let snapshot = metrics.snapshot();
        assert!(snapshot.sweeps >= 2);
        assert_eq!(snapshot.refreshes, 1);
        assert_eq!(f.adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_daily_schedule_reads_injected_clock() {
        let f = fixture(1, Duration::ZERO);
        seed_stale(&f.ledger, 1);
        let at = NaiveTime::from_hms_opt(0, 1, 0).unwrap();

        // Midday: the next 00:01 is almost a day away.
        let scheduler = Arc::new(f.scheduler.with_schedule(SweepSchedule::DailyAt(at)));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.clone().run(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        assert_eq!(task.await.unwrap().snapshot().sweeps, 0);
        assert_eq!(f.adapter.calls(), 0);

        // 50ms before 00:01.
        f.clock
            .set((day(10).and_time(at) - chrono::Duration::milliseconds(50)).and_utc());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.clone().run(rx));
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        let snapshot = task.await.unwrap().snapshot();
        assert!(snapshot.sweeps >= 1);
        assert_eq!(snapshot.refreshes, 1);
        assert_eq!(f.adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_ignores_false_updates() {
        let (tx, mut rx) = watch::channel(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let hits = hits.clone();
            tokio::spawn(async move {
                shutdown_signalled(&mut rx).await;
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tx.send(true).unwrap();
        waiter.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

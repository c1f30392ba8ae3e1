//! Configuration types
//!
//! Loaded once at startup from TOML, optionally adjusted from `BOKPRIS_*`
//! environment variables, then validated. Policies and promotions are
//! immutable after load.

use crate::{
    BokprisError, BokprisResult, ConfigError, Day, Promotion, Retailer, RetailerPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifetime of a cached chart payload (30 minutes). Not configurable.
pub const CACHE_TTL_SECS: u64 = 1800;

/// Per-step network/render timeout.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 8_000;

/// Overall budget for one identifier's refresh.
pub const DEFAULT_REFRESH_DEADLINE_MS: u64 = 60_000;

/// Shipping fee charged below the free-shipping threshold (kr).
pub const DEFAULT_SHIPPING_COST: f64 = 29.0;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Retry configuration for fetches and ledger writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Base URL per retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreEndpoints {
    pub adlibris_campus: String,
    pub studentapan: String,
    pub bokus: String,
    pub akademibokhandeln: String,
}

impl StoreEndpoints {
    pub fn base_url(&self, retailer: Retailer) -> &str {
        match retailer {
            Retailer::AdlibrisCampus => &self.adlibris_campus,
            Retailer::Studentapan => &self.studentapan,
            Retailer::Bokus => &self.bokus,
            Retailer::Akademibokhandeln => &self.akademibokhandeln,
        }
    }
}

impl Default for StoreEndpoints {
    fn default() -> Self {
        Self {
            adlibris_campus: "https://adlibriscampus.com".to_string(),
            studentapan: "https://www.studentapan.se".to_string(),
            bokus: "https://www.bokus.com".to_string(),
            akademibokhandeln: "https://www.akademibokhandeln.se".to_string(),
        }
    }
}

/// Outbound HTTP settings shared by all adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    pub step_timeout_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
    pub endpoints: StoreEndpoints,
}

impl FetchConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "sv-SE,sv;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
            endpoints: StoreEndpoints::default(),
        }
    }
}

/// Refresh orchestration and scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Overall budget for one identifier's fan-out.
    pub deadline_ms: u64,
    /// Identifiers refreshed concurrently during a sweep.
    pub max_concurrent_refreshes: usize,
    /// Concurrent sessions against static-HTML retailers.
    pub max_static_sessions: usize,
    /// Concurrent sessions against the rendered storefront. Keep this small.
    pub max_rendered_sessions: usize,
    /// Local time of the daily sweep.
    pub sweep_hour: u32,
    pub sweep_minute: u32,
}

impl RefreshConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_REFRESH_DEADLINE_MS,
            max_concurrent_refreshes: 4,
            max_static_sessions: 8,
            max_rendered_sessions: 2,
            sweep_hour: 0,
            sweep_minute: 1,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BokprisConfig {
    pub ledger_path: PathBuf,
    pub watchlist_path: PathBuf,
    pub fetch: FetchConfig,
    pub refresh: RefreshConfig,
    pub retry: RetryConfig,
    pub policies: Vec<RetailerPolicy>,
    #[serde(default)]
    pub promotions: Vec<Promotion>,
}

impl BokprisConfig {
    /// Production defaults with the ledger and watchlist under `data_dir`.
    pub fn default_config(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            ledger_path: data_dir.join("prishistorik.csv"),
            watchlist_path: data_dir.join("bevakade_isbn.txt"),
            fetch: FetchConfig::default(),
            refresh: RefreshConfig::default(),
            retry: RetryConfig::default(),
            policies: vec![
                RetailerPolicy {
                    retailer: Retailer::Bokus,
                    standing_discount_rate: 0.05,
                    shipping_cost: DEFAULT_SHIPPING_COST,
                    free_shipping_threshold: 249.0,
                },
                RetailerPolicy {
                    retailer: Retailer::Akademibokhandeln,
                    standing_discount_rate: 0.10,
                    shipping_cost: DEFAULT_SHIPPING_COST,
                    free_shipping_threshold: 300.0,
                },
            ],
            promotions: vec![Promotion {
                retailer: Retailer::Bokus,
                name: "APRIL25".to_string(),
                discount_rate: 0.10,
                start_date: Day::from_ymd_opt(2025, 4, 1).unwrap_or_default(),
                end_date: Day::from_ymd_opt(2025, 4, 30).unwrap_or_default(),
            }],
        }
    }

    pub fn from_toml_str(contents: &str) -> BokprisResult<Self> {
        toml::from_str(contents).map_err(|e| {
            BokprisError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    pub fn from_path(path: &Path) -> BokprisResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(CACHE_TTL_SECS)
    }

    /// Apply overrides from the process environment.
    ///
    /// Environment variables:
    /// - `BOKPRIS_LEDGER_PATH`
    /// - `BOKPRIS_WATCHLIST_PATH`
    /// - `BOKPRIS_STEP_TIMEOUT_MS`
    /// - `BOKPRIS_REFRESH_DEADLINE_MS`
    /// - `BOKPRIS_MAX_CONCURRENT_REFRESHES`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an explicit lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("BOKPRIS_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("BOKPRIS_WATCHLIST_PATH") {
            self.watchlist_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("BOKPRIS_STEP_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.fetch.step_timeout_ms = ms;
        }
        if let Some(ms) = lookup("BOKPRIS_REFRESH_DEADLINE_MS").and_then(|s| s.parse().ok()) {
            self.refresh.deadline_ms = ms;
        }
        if let Some(n) = lookup("BOKPRIS_MAX_CONCURRENT_REFRESHES").and_then(|s| s.parse().ok()) {
            self.refresh.max_concurrent_refreshes = n;
        }
        self
    }

    /// Promotions that will be ignored because their range is inverted.
    pub fn invalid_promotions(&self) -> Vec<ConfigError> {
        self.promotions
            .iter()
            .filter_map(|p| p.validate().err())
            .collect()
    }

    /// Validate the configuration.
    ///
    /// Inverted promotion ranges are not rejected here; they are reported by
    /// [`invalid_promotions`](Self::invalid_promotions) and never activate.
    pub fn validate(&self) -> BokprisResult<()> {
        if self.ledger_path.as_os_str().is_empty() {
            return Err(invalid("ledger_path", "", "must not be empty"));
        }
        if self.watchlist_path.as_os_str().is_empty() {
            return Err(invalid("watchlist_path", "", "must not be empty"));
        }
        if self.fetch.step_timeout_ms == 0 {
            return Err(invalid("fetch.step_timeout_ms", "0", "must be positive"));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(invalid("fetch.user_agent", "", "must not be empty"));
        }
        for retailer in Retailer::ALL {
            let url = self.fetch.endpoints.base_url(retailer);
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    &format!("fetch.endpoints.{}", retailer.slug()),
                    url,
                    "must be an http(s) URL",
                ));
            }
        }
        if self.refresh.deadline_ms == 0 {
            return Err(invalid("refresh.deadline_ms", "0", "must be positive"));
        }
        if self.refresh.max_concurrent_refreshes == 0 {
            return Err(invalid("refresh.max_concurrent_refreshes", "0", "must be positive"));
        }
        if self.refresh.max_static_sessions == 0 || self.refresh.max_rendered_sessions == 0 {
            return Err(invalid(
                "refresh.max_*_sessions",
                "0",
                "session pools must be positive",
            ));
        }
        if self.refresh.max_rendered_sessions >= self.refresh.max_static_sessions {
            return Err(invalid(
                "refresh.max_rendered_sessions",
                &self.refresh.max_rendered_sessions.to_string(),
                "rendered sessions must be fewer than static sessions",
            ));
        }
        if self.refresh.sweep_hour > 23 || self.refresh.sweep_minute > 59 {
            return Err(invalid(
                "refresh.sweep_hour/sweep_minute",
                &format!("{}:{}", self.refresh.sweep_hour, self.refresh.sweep_minute),
                "must be a valid time of day",
            ));
        }
        if self.retry.max_retries < 1 {
            return Err(invalid(
                "retry.max_retries",
                &self.retry.max_retries.to_string(),
                "at least one retry is required",
            ));
        }
        if self.retry.backoff_multiplier <= 0.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                &self.retry.backoff_multiplier.to_string(),
                "must be positive",
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(invalid(
                "retry.max_backoff_ms",
                &self.retry.max_backoff_ms.to_string(),
                "must be >= initial_backoff_ms",
            ));
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            let field = format!("policies.{}", policy.retailer.slug());
            if !seen.insert(policy.retailer) {
                return Err(invalid(&field, "", "duplicate policy"));
            }
            if !(0.0..1.0).contains(&policy.standing_discount_rate) {
                return Err(invalid(
                    &field,
                    &policy.standing_discount_rate.to_string(),
                    "discount rate must be in [0, 1)",
                ));
            }
            if policy.shipping_cost < 0.0 || policy.free_shipping_threshold < 0.0 {
                return Err(invalid(&field, "", "shipping figures must be non-negative"));
            }
        }
        for promotion in &self.promotions {
            if !(0.0..1.0).contains(&promotion.discount_rate) {
                return Err(invalid(
                    &format!("promotions.{}", promotion.name),
                    &promotion.discount_rate.to_string(),
                    "discount rate must be in [0, 1)",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> BokprisError {
    BokprisError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

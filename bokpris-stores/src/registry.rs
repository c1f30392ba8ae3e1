//! The set of adapters a refresh fans out to

use crate::{CampusAdapter, HttpPageFetcher, PageFetcher, StoreAdapter, StoreProfile, StorefrontAdapter};
use bokpris_core::{BokprisConfig, BokprisResult, Retailer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Adapters keyed by retailer. Adapters must be registered explicitly.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<Retailer, Arc<dyn StoreAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four production adapters. The static retailers go over HTTP.
    ///
    /// Campus is client-rendered, so the host supplies the `renderer` that
    /// returns rendered markup (usually backed by a headless browser). A
    /// plain [`HttpPageFetcher`] here only sees the unrendered shell.
    pub fn standard(config: &BokprisConfig, renderer: Arc<dyn PageFetcher>) -> BokprisResult<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(&config.fetch)?);
        Ok(Self::with_fetchers(config, fetcher, renderer))
    }

    /// All four adapters over the given transports.
    ///
    /// # Arguments
    /// * `config` - Endpoints, timeouts, retry and pool sizes
    /// * `fetcher` - Transport for the static-HTML retailers
    /// * `renderer` - Transport for the rendered Campus storefront
    pub fn with_fetchers(
        config: &BokprisConfig,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Arc<dyn PageFetcher>,
    ) -> Self {
        let step_timeout = config.fetch.step_timeout();
        let endpoints = &config.fetch.endpoints;
        let static_sessions = Arc::new(Semaphore::new(config.refresh.max_static_sessions));
        let rendered_sessions = Arc::new(Semaphore::new(config.refresh.max_rendered_sessions));

        let mut set = Self::new();
        for retailer in Retailer::ALL {
            if let Some(profile) = StoreProfile::builtin(retailer) {
                set.register(Arc::new(
                    StorefrontAdapter::new(
                        profile,
                        endpoints.base_url(retailer),
                        fetcher.clone(),
                        static_sessions.clone(),
                    )
                    .with_step_timeout(step_timeout)
                    .with_retry(config.retry.clone()),
                ));
            }
        }
        set.register(Arc::new(
            CampusAdapter::new(
                endpoints.base_url(Retailer::AdlibrisCampus),
                renderer,
                rendered_sessions,
            )
            .with_step_timeout(step_timeout)
            .with_retry(config.retry.clone()),
        ));
        set
    }

    /// Register an adapter, replacing any previous one for its retailer.
    pub fn register(&mut self, adapter: Arc<dyn StoreAdapter>) {
        self.adapters.insert(adapter.retailer(), adapter);
    }

    pub fn get(&self, retailer: Retailer) -> Option<Arc<dyn StoreAdapter>> {
        self.adapters.get(&retailer).cloned()
    }

    pub fn retailers(&self) -> Vec<Retailer> {
        self.adapters.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Retailer, &Arc<dyn StoreAdapter>)> {
        self.adapters.iter().map(|(r, a)| (*r, a))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("retailers", &self.retailers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScriptedAdapter, StaticPageFetcher};
    use bokpris_core::{FetchError, Isbn, RetryConfig};

    #[test]
    fn test_standard_set_has_every_retailer() {
        let config = BokprisConfig::default_config("/tmp/bokpris");
        let set = AdapterSet::standard(&config, Arc::new(StaticPageFetcher::new())).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.retailers(), Retailer::ALL.to_vec());
        assert_eq!(
            set.get(Retailer::Akademibokhandeln).unwrap().retailer(),
            Retailer::Akademibokhandeln
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut set = AdapterSet::new();
        assert!(set.is_empty());
        set.register(Arc::new(ScriptedAdapter::quoting(Retailer::Bokus, None, None)));
        set.register(Arc::new(ScriptedAdapter::quoting(Retailer::Bokus, Some("x"), None)));
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_standard_routes_campus_through_renderer() {
        let mut config = BokprisConfig::default_config("/tmp/bokpris");
        config.retry = RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
        };
        let landing = format!("{}/", config.fetch.endpoints.base_url(Retailer::AdlibrisCampus));
        let renderer = StaticPageFetcher::new().with_status(&landing, 403);
        let set = AdapterSet::standard(&config, Arc::new(renderer)).unwrap();

        let campus = set.get(Retailer::AdlibrisCampus).unwrap();
        let result = campus.fetch(&Isbn::parse("9789144156798").unwrap()).await;
        assert!(matches!(result, Err(FetchError::Blocked { status: 403, .. })));
    }
}

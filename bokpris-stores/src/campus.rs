//! Adlibris Campus: rendered storefront with a consent banner
//!
//! The storefront is a client-rendered application, so the fetcher passed in
//! is expected to return rendered markup (a headless-browser backed
//! [`PageFetcher`] in production). Rendering is expensive; the adapter's
//! session pool is kept smaller than the static retailers' pool.

use crate::fetcher::{PageFetcher, Step};
use crate::storefront::{follow_search, quote_from_page};
use crate::{html, join_path, StoreAdapter};
use async_trait::async_trait;
use bokpris_core::config::DEFAULT_STEP_TIMEOUT_MS;
use bokpris_core::{FetchError, Isbn, Quote, Retailer, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const SEARCH_PATH: &str = "/search?q={isbn}";
const PRODUCT_MARKER: &str = "/b/";
const TITLE_CLASSES: &[&str] = &["heading-default-styling"];
const PRICE_CLASSES: &[&str] = &["text-xl", "font-bold", "leading-tight", "text-content-sale"];
const CONSENT_BUTTONS: [&str; 2] = ["Godkänn samtliga cookies", "didomi-notice-agree-button"];

/// Campus adapter.
pub struct CampusAdapter {
    base_url: String,
    renderer: Arc<dyn PageFetcher>,
    sessions: Arc<Semaphore>,
    step_timeout: Duration,
    retry: RetryConfig,
}

impl CampusAdapter {
    /// Create an adapter.
    ///
    /// # Arguments
    /// * `base_url` - Storefront origin
    /// * `renderer` - Fetcher returning rendered markup
    /// * `sessions` - Dedicated pool for rendered sessions
    pub fn new(
        base_url: impl Into<String>,
        renderer: Arc<dyn PageFetcher>,
        sessions: Arc<Semaphore>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            renderer,
            sessions,
            step_timeout: Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Load the landing page and note the consent banner.
    ///
    /// The banner is only observed; a missing banner is normal for returning
    /// sessions and never fails the fetch.
    async fn visit_landing(&self, isbn: &Isbn) -> Result<bool, FetchError> {
        let landing_url = join_path(&self.base_url, "/");
        let landing = Step {
            retailer: Retailer::AdlibrisCampus,
            name: "landing",
            url: &landing_url,
            isbn: isbn.as_str(),
            not_found_is_no_result: false,
        }
        .run(self.renderer.as_ref(), self.step_timeout, &self.retry)
        .await?;

        let consent = CONSENT_BUTTONS
            .iter()
            .any(|needle| html::has_button(&landing.body, needle));
        if consent {
            tracing::debug!(isbn = %isbn, "Consent banner present");
        } else {
            tracing::info!(isbn = %isbn, "No consent banner on landing page");
        }
        Ok(consent)
    }
}

#[async_trait]
impl StoreAdapter for CampusAdapter {
    fn retailer(&self) -> Retailer {
        Retailer::AdlibrisCampus
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<Quote, FetchError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|e| FetchError::Network {
                retailer: Retailer::AdlibrisCampus,
                reason: format!("Session pool closed: {}", e),
            })?;

        self.visit_landing(isbn).await?;

        let search_url = join_path(&self.base_url, &SEARCH_PATH.replace("{isbn}", isbn.as_str()));
        let page = follow_search(
            self.renderer.as_ref(),
            Retailer::AdlibrisCampus,
            isbn,
            &search_url,
            PRODUCT_MARKER,
            self.step_timeout,
            &self.retry,
        )
        .await?;

        let title = html::find_element_text(&page.body, "h1", TITLE_CLASSES);
        let price = html::find_element_text(&page.body, "div", PRICE_CLASSES);
        Ok(quote_from_page(Retailer::AdlibrisCampus, isbn, &page, title, price))
    }
}

impl std::fmt::Debug for CampusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampusAdapter")
            .field("base_url", &self.base_url)
            .field("step_timeout", &self.step_timeout)
            .field("available_sessions", &self.sessions.available_permits())
            .finish()
    }
}

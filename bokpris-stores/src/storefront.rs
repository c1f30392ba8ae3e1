//! Profile-driven adapter for the static-HTML retailers

use crate::fetcher::{Page, PageFetcher, Step};
use crate::profile::{extract_first, ResolveStrategy, StoreProfile};
use crate::{absolute_url, html, join_path, StoreAdapter};
use async_trait::async_trait;
use bokpris_core::config::DEFAULT_STEP_TIMEOUT_MS;
use bokpris_core::{FetchError, Isbn, Quote, Retailer, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Adapter for any retailer describable by a [`StoreProfile`].
pub struct StorefrontAdapter {
    profile: StoreProfile,
    base_url: String,
    fetcher: Arc<dyn PageFetcher>,
    sessions: Arc<Semaphore>,
    step_timeout: Duration,
    retry: RetryConfig,
}

impl StorefrontAdapter {
    /// Create an adapter.
    ///
    /// # Arguments
    /// * `profile` - Resolution strategy and selectors
    /// * `base_url` - Retailer origin, e.g. `https://www.bokus.com`
    /// * `fetcher` - Transport, shared between adapters
    /// * `sessions` - Pool bounding concurrent page loads
    pub fn new(
        profile: StoreProfile,
        base_url: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
        sessions: Arc<Semaphore>,
    ) -> Self {
        Self {
            profile,
            base_url: base_url.into(),
            fetcher,
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

    pub fn profile(&self) -> &StoreProfile {
        &self.profile
    }

    async fn resolve(&self, isbn: &Isbn) -> Result<Page, FetchError> {
        let retailer = self.profile.retailer;
        let entry_url = join_path(&self.base_url, &self.profile.strategy.entry_path(isbn));

        match self.profile.strategy {
            ResolveStrategy::Direct { .. } => {
                Step {
                    retailer,
                    name: "product",
                    url: &entry_url,
                    isbn: isbn.as_str(),
                    not_found_is_no_result: true,
                }
                .run(self.fetcher.as_ref(), self.step_timeout, &self.retry)
                .await
            }
            ResolveStrategy::Search { product_marker, .. } => {
                follow_search(
                    self.fetcher.as_ref(),
                    retailer,
                    isbn,
                    &entry_url,
                    product_marker,
                    self.step_timeout,
                    &self.retry,
                )
                .await
            }
        }
    }
}

/// Load a search page and return the product page it leads to.
///
/// A search that lands directly on a product page (a redirect for an exact
/// identifier match) is used as is. Otherwise the first link containing
/// `product_marker` is followed; no such link is `NoResult`.
pub(crate) async fn follow_search(
    fetcher: &dyn PageFetcher,
    retailer: Retailer,
    isbn: &Isbn,
    search_url: &str,
    product_marker: &str,
    step_timeout: Duration,
    retry: &RetryConfig,
) -> Result<Page, FetchError> {
    let results = Step {
        retailer,
        name: "search",
        url: search_url,
        isbn: isbn.as_str(),
        not_found_is_no_result: false,
    }
    .run(fetcher, step_timeout, retry)
    .await?;

    if results.url.contains(product_marker) && results.url.contains(isbn.as_str()) {
        return Ok(results);
    }

    let no_result = || FetchError::NoResult {
        retailer,
        isbn: isbn.to_string(),
    };
    let product_url = html::find_links(&results.body, product_marker)
        .into_iter()
        .find_map(|href| absolute_url(&results.url, &href))
        .ok_or_else(no_result)?;

    tracing::debug!(retailer = %retailer, isbn = %isbn, url = %product_url, "Following first search result");

    Step {
        retailer,
        name: "product",
        url: &product_url,
        isbn: isbn.as_str(),
        not_found_is_no_result: true,
    }
    .run(fetcher, step_timeout, retry)
    .await
}

/// Build a quote from a product page, logging absent fields.
pub(crate) fn quote_from_page(
    retailer: Retailer,
    isbn: &Isbn,
    page: &Page,
    title: Option<String>,
    price: Option<String>,
) -> Quote {
    if title.is_none() {
        tracing::debug!(retailer = %retailer, isbn = %isbn, "Title element missing");
    }
    if price.is_none() {
        tracing::info!(retailer = %retailer, isbn = %isbn, url = %page.url, "Price element missing");
    }

    let mut quote = Quote::new(isbn.clone(), retailer, page.url.clone());
    quote.title = title;
    quote.raw_price = price;
    quote
}

#[async_trait]
impl StoreAdapter for StorefrontAdapter {
    fn retailer(&self) -> Retailer {
        self.profile.retailer
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<Quote, FetchError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|e| FetchError::Network {
                retailer: self.profile.retailer,
                reason: format!("Session pool closed: {}", e),
            })?;

        let page = self.resolve(isbn).await?;
        let title = extract_first(&self.profile.title, &page.body);
        let price = extract_first(&self.profile.price, &page.body);
        Ok(quote_from_page(self.profile.retailer, isbn, &page, title, price))
    }
}

impl std::fmt::Debug for StorefrontAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontAdapter")
            .field("retailer", &self.profile.retailer)
            .field("base_url", &self.base_url)
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StaticPageFetcher;

    const ISBN: &str = "9789144156798";

    fn isbn() -> Isbn {
        Isbn::parse(ISBN).unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
        }
    }

    fn adapter(profile: StoreProfile, base: &str, fetcher: StaticPageFetcher) -> StorefrontAdapter {
        StorefrontAdapter::new(profile, base, Arc::new(fetcher), Arc::new(Semaphore::new(2)))
            .with_step_timeout(Duration::from_millis(200))
            .with_retry(fast_retry())
    }

    #[tokio::test]
    async fn test_direct_strategy_reads_meta_price() {
        let url = format!("https://ab.test/bok/isbn/{}", ISBN);
        let fetcher = StaticPageFetcher::new().with_page(
            &url,
            r#"<meta property="og:title" content="Makroekonomi"><meta property="product:price:amount" content="349.00">"#,
        );
        let quote = adapter(StoreProfile::akademibokhandeln(), "https://ab.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap();

        assert_eq!(quote.title.as_deref(), Some("Makroekonomi"));
        assert_eq!(quote.raw_price.as_deref(), Some("349.00"));
        assert_eq!(quote.product_url, url);
    }

    #[tokio::test]
    async fn test_direct_strategy_404_is_no_result() {
        let fetcher = StaticPageFetcher::new();
        let err = adapter(StoreProfile::akademibokhandeln(), "https://ab.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoResult { .. }));
    }

    #[tokio::test]
    async fn test_search_follows_first_product_link() {
        let search = format!(
            "https://bokus.test/cgi-bin/product_search.cgi?ac_used=no&search_word={}",
            ISBN
        );
        let product = format!("https://bokus.test/bok/{}/makro", ISBN);
        let fetcher = StaticPageFetcher::new()
            .with_page(
                &search,
                &format!(r#"<a href="/konto">x</a><a href="/bok/{}/makro">Makro</a>"#, ISBN),
            )
            .with_page(
                &product,
                r#"<h1>Makroekonomi</h1><span class="pricing__price">299,00&nbsp;kr</span>"#,
            );
        let quote = adapter(StoreProfile::bokus(), "https://bokus.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap();

        assert_eq!(quote.product_url, product);
        assert_eq!(quote.raw_price.as_deref(), Some("299,00\u{a0}kr"));
    }

    #[tokio::test]
    async fn test_search_redirect_to_product_is_used_directly() {
        let search = format!(
            "https://bokus.test/cgi-bin/product_search.cgi?ac_used=no&search_word={}",
            ISBN
        );
        let product = format!("https://bokus.test/bok/{}/makro", ISBN);
        let fetcher = StaticPageFetcher::new().with_redirect(
            &search,
            &product,
            r#"<h1>Makroekonomi</h1><span class="pricing__price">279 kr</span>"#,
        );
        let quote = adapter(StoreProfile::bokus(), "https://bokus.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap();

        assert_eq!(quote.product_url, product);
        assert_eq!(quote.raw_price.as_deref(), Some("279 kr"));
    }

    #[tokio::test]
    async fn test_search_without_match_is_no_result() {
        let search = format!("https://sa.test/sok?q={}", ISBN);
        let fetcher = StaticPageFetcher::new().with_page(&search, "<p>Inga träffar</p>");
        let err = adapter(StoreProfile::studentapan(), "https://sa.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::NoResult {
                retailer: Retailer::Studentapan,
                isbn: ISBN.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_price_keeps_title() {
        let url = format!("https://ab.test/bok/isbn/{}", ISBN);
        let fetcher = StaticPageFetcher::new().with_page(&url, "<h1>Makroekonomi</h1>");
        let quote = adapter(StoreProfile::akademibokhandeln(), "https://ab.test", fetcher)
            .fetch(&isbn())
            .await
            .unwrap();

        assert_eq!(quote.title.as_deref(), Some("Makroekonomi"));
        assert_eq!(quote.raw_price, None);
    }

    #[tokio::test]
    async fn test_slow_page_times_out() {
        let url = format!("https://ab.test/bok/isbn/{}", ISBN);
        let fetcher = StaticPageFetcher::new()
            .with_page(&url, "<h1>x</h1>")
            .with_latency(Duration::from_millis(500));
        let adapter = StorefrontAdapter::new(
            StoreProfile::akademibokhandeln(),
            "https://ab.test",
            Arc::new(fetcher),
            Arc::new(Semaphore::new(1)),
        )
        .with_step_timeout(Duration::from_millis(20))
        .with_retry(fast_retry());

        let err = adapter.fetch(&isbn()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { ref step, .. } if step == "product"));
    }
}

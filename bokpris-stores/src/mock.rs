//! Test doubles for fetchers and adapters

use crate::fetcher::{Page, PageFetcher};
use crate::StoreAdapter;
use async_trait::async_trait;
use bokpris_core::{FetchError, Isbn, Quote, Retailer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// STATIC PAGE FETCHER
// ============================================================================

/// Serves canned pages keyed by request URL.
///
/// Unknown URLs answer with an empty 404 page.
#[derive(Debug, Default)]
pub struct StaticPageFetcher {
    pages: HashMap<String, Page>,
    failures: HashMap<String, String>,
    latency: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl StaticPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `url`.
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), Page::new(url, 200, body));
        self
    }

    /// Serve `body` at `url`, reporting `final_url` as the post-redirect URL.
    pub fn with_redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), Page::new(final_url, 200, body));
        self
    }

    /// Answer `url` with an empty page carrying `status`.
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Page::new(url, status, ""));
        self
    }

    /// Fail `url` at the transport level.
    pub fn with_network_failure(mut self, url: &str, reason: &str) -> Self {
        self.failures.insert(url.to_string(), reason.to_string());
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn get(&self, retailer: Retailer, url: &str) -> Result<Page, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = self.failures.get(url) {
            return Err(FetchError::Network {
                retailer,
                reason: reason.clone(),
            });
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| Page::new(url, 404, "")))
    }
}

// ============================================================================
// SCRIPTED ADAPTER
// ============================================================================

#[derive(Debug, Clone)]
enum Script {
    Quote {
        title: Option<String>,
        raw_price: Option<String>,
    },
    Fail(FetchError),
}

/// Adapter answering every identifier with a fixed script.
#[derive(Debug)]
pub struct ScriptedAdapter {
    retailer: Retailer,
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Return a quote with the given fields.
    ///
    /// # Arguments
    /// * `retailer` - Retailer the adapter reports
    /// * `title` - Title on the quote, `None` for a missing element
    /// * `raw_price` - Price text on the quote, `None` for a missing element
    pub fn quoting(retailer: Retailer, title: Option<&str>, raw_price: Option<&str>) -> Self {
        Self {
            retailer,
            script: Script::Quote {
                title: title.map(str::to_string),
                raw_price: raw_price.map(str::to_string),
            },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every fetch with `error`.
    pub fn failing(retailer: Retailer, error: FetchError) -> Self {
        Self {
            retailer,
            script: Script::Fail(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Product URL the scripted quote reports for `isbn`.
    pub fn product_url(retailer: Retailer, isbn: &Isbn) -> String {
        format!("https://{}.test/product/{}", retailer.slug(), isbn)
    }
}

#[async_trait]
impl StoreAdapter for ScriptedAdapter {
    fn retailer(&self) -> Retailer {
        self.retailer
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<Quote, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Quote { title, raw_price } => {
                let mut quote = Quote::new(
                    isbn.clone(),
                    self.retailer,
                    Self::product_url(self.retailer, isbn),
                );
                quote.title = title.clone();
                quote.raw_price = raw_price.clone();
                Ok(quote)
            }
            Script::Fail(error) => Err(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_records_requests() {
        let fetcher = StaticPageFetcher::new()
            .with_page("https://a.test/x", "body")
            .with_network_failure("https://a.test/down", "reset");

        let page = fetcher.get(Retailer::Bokus, "https://a.test/x").await.unwrap();
        assert_eq!(page.status, 200);
        let missing = fetcher.get(Retailer::Bokus, "https://a.test/y").await.unwrap();
        assert_eq!(missing.status, 404);
        assert!(fetcher.get(Retailer::Bokus, "https://a.test/down").await.is_err());

        assert_eq!(fetcher.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_adapter_counts_calls() {
        let isbn = Isbn::parse("9789144156798").unwrap();
        let adapter = ScriptedAdapter::quoting(Retailer::Bokus, Some("Makro"), Some("299 kr"));
        let quote = adapter.fetch(&isbn).await.unwrap();
        assert_eq!(quote.raw_price.as_deref(), Some("299 kr"));
        assert_eq!(quote.product_url, ScriptedAdapter::product_url(Retailer::Bokus, &isbn));
        adapter.fetch(&isbn).await.unwrap();
        assert_eq!(adapter.calls(), 2);

        let failing = ScriptedAdapter::failing(
            Retailer::Studentapan,
            FetchError::DeadlineExceeded {
                retailer: Retailer::Studentapan,
            },
        );
        assert!(failing.fetch(&isbn).await.is_err());
    }
}

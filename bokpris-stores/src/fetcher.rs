//! Page retrieval over HTTP with per-step timeouts

use async_trait::async_trait;
use bokpris_core::{
    retry_async, BokprisError, BokprisResult, ConfigError, FetchConfig, FetchError, Retailer,
    RetryConfig,
};
use reqwest::{header, Client};
use std::time::Duration;

/// A fetched document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Markers of an interstitial bot check served with a 200.
const CHALLENGE_MARKERS: [&str; 3] = ["cf-chl-", "captcha-delivery", "<title>just a moment"];

/// Transport used by adapters to load one URL.
///
/// Implementations return the page for any HTTP status; classifying the
/// status is up to the caller. Only transport failures are errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, retailer: Retailer, url: &str) -> Result<Page, FetchError>;
}

/// `reqwest`-backed fetcher shared by every adapter.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    step_timeout: Duration,
}

impl HttpPageFetcher {
    /// Build a client sending a browser-like `User-Agent` and Swedish
    /// `Accept-Language`, with the request timeout set to the step timeout.
    pub fn new(config: &FetchConfig) -> BokprisResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        let language = header::HeaderValue::from_str(&config.accept_language)
            .map_err(|e| invalid_fetch_config("fetch.accept_language", &config.accept_language, e))?;
        headers.insert(header::ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.step_timeout())
            .build()
            .map_err(|e| invalid_fetch_config("fetch", "client", e))?;

        Ok(Self {
            client,
            step_timeout: config.step_timeout(),
        })
    }
}

fn invalid_fetch_config(field: &str, value: &str, err: impl std::fmt::Display) -> BokprisError {
    BokprisError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, retailer: Retailer, url: &str) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(retailer, &e, self.step_timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(retailer, &e, self.step_timeout))?;

        Ok(Page::new(final_url, status, body))
    }
}

fn transport_error(retailer: Retailer, err: &reqwest::Error, step_timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            retailer,
            step: "http".to_string(),
            after_ms: step_timeout.as_millis() as u64,
        }
    } else {
        FetchError::Network {
            retailer,
            reason: err.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpPageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPageFetcher")
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

/// Reject bot walls and error statuses.
///
/// 403, 429 and challenge pages are `Blocked`. Other non-2xx statuses are
/// `HttpStatus`, except 404 when `not_found_is_no_result` is set, which
/// means the identifier is unknown to the retailer.
pub fn screen_page(
    retailer: Retailer,
    page: Page,
    isbn: &str,
    not_found_is_no_result: bool,
) -> Result<Page, FetchError> {
    if page.status == 403 || page.status == 429 {
        return Err(FetchError::Blocked {
            retailer,
            status: page.status,
        });
    }
    if page.status == 404 && not_found_is_no_result {
        return Err(FetchError::NoResult {
            retailer,
            isbn: isbn.to_string(),
        });
    }
    if !page.is_success() {
        return Err(FetchError::HttpStatus {
            retailer,
            status: page.status,
            url: page.url,
        });
    }
    let head = page
        .body
        .get(..page.body.len().min(4096))
        .unwrap_or(&page.body)
        .to_ascii_lowercase();
    if CHALLENGE_MARKERS.iter().any(|m| head.contains(m)) {
        return Err(FetchError::Blocked {
            retailer,
            status: page.status,
        });
    }
    Ok(page)
}

/// One bounded, retried page load.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub retailer: Retailer,
    /// Short name used in logs and timeout errors, e.g. `"search"`.
    pub name: &'a str,
    pub url: &'a str,
    pub isbn: &'a str,
    pub not_found_is_no_result: bool,
}

impl Step<'_> {
    /// Load the page, bounded by `step_timeout` per attempt and retried on
    /// transient failures.
    pub async fn run(
        self,
        fetcher: &dyn PageFetcher,
        step_timeout: Duration,
        retry: &RetryConfig,
    ) -> Result<Page, FetchError> {
        let result = retry_async(retry, self.name, FetchError::is_transient, move || async move {
            match tokio::time::timeout(step_timeout, fetcher.get(self.retailer, self.url)).await {
                Ok(loaded) => loaded.and_then(|page| {
                    screen_page(self.retailer, page, self.isbn, self.not_found_is_no_result)
                }),
                Err(_) => Err(FetchError::Timeout {
                    retailer: self.retailer,
                    step: self.name.to_string(),
                    after_ms: step_timeout.as_millis() as u64,
                }),
            }
        })
        .await;

        if let Err(e) = &result {
            tracing::warn!(
                retailer = %self.retailer,
                step = self.name,
                url = self.url,
                error = %e,
                "Page load failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISBN: &str = "9789144156798";

    #[test]
    fn test_screen_page_statuses() {
        let ok = screen_page(Retailer::Bokus, Page::new("u", 200, "<html></html>"), ISBN, false);
        assert!(ok.is_ok());

        let blocked = screen_page(Retailer::Bokus, Page::new("u", 403, ""), ISBN, false);
        assert_eq!(
            blocked,
            Err(FetchError::Blocked {
                retailer: Retailer::Bokus,
                status: 403
            })
        );

        let missing = screen_page(Retailer::Akademibokhandeln, Page::new("u", 404, ""), ISBN, true);
        assert!(matches!(missing, Err(FetchError::NoResult { .. })));

        let missing_search = screen_page(Retailer::Bokus, Page::new("u", 404, ""), ISBN, false);
        assert!(matches!(
            missing_search,
            Err(FetchError::HttpStatus { status: 404, .. })
        ));
    }

    #[test]
    fn test_screen_page_detects_challenge() {
        let page = Page::new("u", 200, "<html><head><title>Just a moment...</title>");
        assert!(matches!(
            screen_page(Retailer::Studentapan, page, ISBN, false),
            Err(FetchError::Blocked { status: 200, .. })
        ));
    }

    #[test]
    fn test_http_fetcher_builds_from_default_config() {
        let fetcher = HttpPageFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.step_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_http_fetcher_rejects_bad_header() {
        let config = FetchConfig {
            accept_language: "sv\nSE".to_string(),
            ..FetchConfig::default()
        };
        assert!(HttpPageFetcher::new(&config).is_err());
    }
}

//! Bokpris Stores - Retailer Adapters
//!
//! Every retailer is reached through the [`StoreAdapter`] capability. The
//! static-HTML retailers share one [`StorefrontAdapter`] driven by a
//! [`StoreProfile`]; the rendered Adlibris Campus storefront has its own
//! [`CampusAdapter`] with a landing/consent step and a smaller session pool.
//!
//! Adapters are read-only against the retailer: they load pages and never
//! submit forms, add to carts or sign in. The resolved product URL is part of
//! the returned [`Quote`], never adapter state.

pub mod campus;
pub mod fetcher;
pub mod html;
pub mod mock;
pub mod profile;
pub mod registry;
pub mod storefront;

pub use campus::CampusAdapter;
pub use fetcher::{screen_page, HttpPageFetcher, Page, PageFetcher, Step};
pub use mock::{ScriptedAdapter, StaticPageFetcher};
pub use profile::{ResolveStrategy, Selector, StoreProfile};
pub use registry::AdapterSet;
pub use storefront::StorefrontAdapter;

use async_trait::async_trait;
use bokpris_core::{FetchError, Isbn, Quote, Retailer};

// ============================================================================
// STORE ADAPTER TRAIT
// ============================================================================

/// Retrieves a title, raw price text and canonical product URL for one
/// identifier from one retailer.
///
/// A missing title or price is not an error: the quote carries `None` for
/// that field. Failing to resolve the identifier, a timeout, or a blocked
/// request is a [`FetchError`].
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    fn retailer(&self) -> Retailer;

    async fn fetch(&self, isbn: &Isbn) -> Result<Quote, FetchError>;
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolve `href` against the page it was found on.
pub(crate) fn absolute_url(page_url: &str, href: &str) -> Option<String> {
    let base = reqwest::Url::parse(page_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

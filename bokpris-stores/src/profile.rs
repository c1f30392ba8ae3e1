//! Per-retailer configuration for the shared adapter control flow
//!
//! A [`StoreProfile`] says how to turn an identifier into a product page and
//! where the title and price live on that page. Adding a retailer with the
//! same control flow means adding a profile, not an adapter.

use crate::html;
use bokpris_core::{Isbn, Retailer};

/// Where a field lives on a product page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Text of the first `tag` element carrying all `classes`.
    ClassText {
        tag: &'static str,
        classes: &'static [&'static str],
    },
    /// `content` of `<meta property=...>`.
    MetaContent { property: &'static str },
    /// Text of the first `<h1>`.
    Heading,
}

impl Selector {
    pub fn extract(&self, page: &str) -> Option<String> {
        match self {
            Selector::ClassText { tag, classes } => html::find_element_text(page, tag, classes),
            Selector::MetaContent { property } => html::find_meta_content(page, property),
            Selector::Heading => html::find_element_text(page, "h1", &[]),
        }
    }
}

/// First selector that yields a value.
pub fn extract_first(selectors: &[Selector], page: &str) -> Option<String> {
    selectors.iter().find_map(|s| s.extract(page))
}

/// How an identifier becomes a product page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// The product path is built from the identifier.
    Direct { path_template: &'static str },
    /// A search page is loaded and the first product link is followed.
    Search {
        path_template: &'static str,
        /// Substring identifying product URLs, e.g. `"/bok/"`.
        product_marker: &'static str,
    },
}

impl ResolveStrategy {
    /// Path (relative to the retailer's base URL) of the first page to load.
    pub fn entry_path(&self, isbn: &Isbn) -> String {
        let template = match self {
            ResolveStrategy::Direct { path_template }
            | ResolveStrategy::Search { path_template, .. } => path_template,
        };
        template.replace("{isbn}", isbn.as_str())
    }
}

/// Everything retailer-specific about fetching one quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreProfile {
    pub retailer: Retailer,
    pub strategy: ResolveStrategy,
    /// Tried in order.
    pub title: Vec<Selector>,
    /// Tried in order.
    pub price: Vec<Selector>,
}

impl StoreProfile {
    /// Built-in profile for a static-HTML retailer.
    ///
    /// `None` for the rendered storefront, which has its own adapter.
    pub fn builtin(retailer: Retailer) -> Option<Self> {
        match retailer {
            Retailer::Studentapan => Some(Self::studentapan()),
            Retailer::Bokus => Some(Self::bokus()),
            Retailer::Akademibokhandeln => Some(Self::akademibokhandeln()),
            Retailer::AdlibrisCampus => None,
        }
    }

    pub fn studentapan() -> Self {
        Self {
            retailer: Retailer::Studentapan,
            strategy: ResolveStrategy::Search {
                path_template: "/sok?q={isbn}",
                product_marker: "/kurslitteratur/",
            },
            title: vec![
                Selector::Heading,
                Selector::MetaContent {
                    property: "og:title",
                },
            ],
            price: vec![Selector::ClassText {
                tag: "div",
                classes: &["Sidebar_conditionValue__Dmogn"],
            }],
        }
    }

    pub fn bokus() -> Self {
        Self {
            retailer: Retailer::Bokus,
            strategy: ResolveStrategy::Search {
                path_template: "/cgi-bin/product_search.cgi?ac_used=no&search_word={isbn}",
                product_marker: "/bok/",
            },
            title: vec![
                Selector::Heading,
                Selector::MetaContent {
                    property: "og:title",
                },
            ],
            price: vec![Selector::ClassText {
                tag: "span",
                classes: &["pricing__price"],
            }],
        }
    }

    pub fn akademibokhandeln() -> Self {
        Self {
            retailer: Retailer::Akademibokhandeln,
            strategy: ResolveStrategy::Direct {
                path_template: "/bok/isbn/{isbn}",
            },
            title: vec![
                Selector::MetaContent {
                    property: "og:title",
                },
                Selector::Heading,
            ],
            price: vec![Selector::MetaContent {
                property: "product:price:amount",
            }],
        }
    }
}

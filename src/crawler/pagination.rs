//! Pagination resolver
//!
//! Forum and thread listings show a localized "page 1 of N" marker inside
//! `vbmenu_control` cells. The resolver reads N and expands the listing URL
//! into one URL per page. The same resolver serves forum and thread listings.

use crate::crawler::{fetch_page, Page, Session};
use regex::Regex;
use scraper::{Node, Selector};
use url::Url;

/// Page count a marker may claim before it is clamped
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// The localized "page 1 of N" template
#[derive(Debug, Clone)]
pub struct PageMarker {
    pattern: Regex,
    max_pages: u32,
}

impl PageMarker {
    /// Builds a marker from the text preceding the page count,
    /// e.g. `"Pagina 1 de"` for "Pagina 1 de 3"
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"^{}\s+([0-9]+)$", regex::escape(prefix.trim())))?;
        Ok(Self {
            pattern,
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Sets the largest page count [`page_count`] reports
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Returns the page count if `text` is exactly a marker
    pub fn page_count(&self, text: &str) -> Option<u32> {
        self.pattern
            .captures(text.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|count| count.as_str().parse().ok())
    }
}

/// Reads the total page count from the first marker on the page
///
/// Only direct text children of `vbmenu_control` elements are considered.
/// `None` means no marker was found, which is not an error: the listing has a
/// single page. Counts above the marker's `max_pages` are clamped to it.
pub fn page_count(page: &Page, marker: &PageMarker) -> Option<u32> {
    let selector = Selector::parse(".vbmenu_control").ok()?;

    let count = page
        .document()
        .select(&selector)
        .flat_map(|cell| cell.children())
        .filter_map(|child| match child.value() {
            Node::Text(text) => marker.page_count(text),
            _ => None,
        })
        .next()?;

    if count > marker.max_pages() {
        tracing::warn!(
            "{} claims {} pages, keeping the first {}",
            page.url(),
            count,
            marker.max_pages()
        );
        return Some(marker.max_pages());
    }

    Some(count)
}

/// Expands a listing URL into its page URLs
///
/// With `Some(n)` (n >= 1) returns n URLs carrying `page=1..=n` in ascending
/// order; otherwise returns the listing URL unmodified.
pub fn expand_pages(listing: &Url, count: Option<u32>) -> Vec<Url> {
    match count {
        Some(n) if n >= 1 => (1..=n)
            .map(|k| {
                let mut url = listing.clone();
                url.query_pairs_mut().append_pair("page", &k.to_string());
                url
            })
            .collect(),
        _ => vec![listing.clone()],
    }
}

/// Resolves the page URLs of a listing
///
/// A listing that cannot be fetched degrades to the listing URL alone.
pub async fn resolve_pages(session: &Session, listing: &Url, marker: &PageMarker) -> Vec<Url> {
    let count = match fetch_page(session, listing).await {
        Ok(page) => page_count(&page, marker),
        Err(e) => {
            tracing::warn!("skipping {}: {}", listing, e);
            return vec![listing.clone()];
        }
    };

    tracing::debug!("{} has {} page(s)", listing, count.unwrap_or(1));
    expand_pages(listing, count)
}

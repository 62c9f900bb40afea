//! Pagination Driver
//!
//! TigerStyle: One explicit accumulating loop for every provider.
//!
//! A provider exposes its listing as a [`PageSource`]; [`collect_pages`]
//! keeps asking for the next page until there is no locator left or the row
//! cap is reached, then trims any overshoot.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{BackendError, BackendResult};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Upper bound on pages followed for one listing
pub const PAGES_COUNT_MAX: usize = 10_000;

// =============================================================================
// Types
// =============================================================================

/// One page of raw rows.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw rows in provider order
    pub rows: Vec<Value>,
    /// Total rows the provider reports for the whole listing, if it does
    pub total: Option<usize>,
    /// Locator for the following page
    pub next: Option<String>,
}

/// Something that can deliver a listing page by page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `locator`, or the first page when `None`.
    async fn fetch_page(&self, locator: Option<&str>) -> BackendResult<Page>;
}

// =============================================================================
// Driver
// =============================================================================

/// Fetch pages until exhaustion or `cap` rows, returning exactly at most `cap`.
///
/// A listing still pointing at another page after [`PAGES_COUNT_MAX`] pages
/// is an error, never a shortened result.
pub async fn collect_pages<S>(source: &S, cap: Option<usize>) -> BackendResult<Vec<Value>>
where
    S: PageSource + ?Sized,
{
    let mut rows: Vec<Value> = Vec::new();
    let mut locator: Option<String> = None;

    for page_number in 0..PAGES_COUNT_MAX {
        let page = source.fetch_page(locator.as_deref()).await?;
        tracing::debug!(
            page = page_number,
            rows = page.rows.len(),
            total = ?page.total,
            "fetched page"
        );

        if rows.is_empty() {
            if let Some(total) = page.total {
                rows.reserve(cap.map_or(total, |c| c.min(total)));
            }
        }
        rows.extend(page.rows);

        if let Some(cap) = cap {
            if rows.len() >= cap {
                rows.truncate(cap);
                return Ok(rows);
            }
        }
        match page.next {
            Some(next) => locator = Some(next),
            None => return Ok(rows),
        }
    }

    tracing::warn!(
        pages = PAGES_COUNT_MAX,
        rows = rows.len(),
        "listing still has more pages, giving up"
    );
    Err(BackendError::decode(format!(
        "pagination did not terminate after {PAGES_COUNT_MAX} pages"
    )))
}

/// Reduce an absolute next-page URL to a path plus query relative to the
/// service root.
///
/// `root_path` is the path the service is mounted under (empty when it sits
/// at the host root) and is stripped from the front. Relative locators come
/// back unchanged.
#[must_use]
pub fn relative_locator(locator: &str, root_path: &str) -> String {
    let Ok(url) = Url::parse(locator) else {
        return locator.to_string();
    };

    let root = root_path.trim_end_matches('/');
    let path = url.path();
    let path = match path.strip_prefix(root) {
        Some(rest) if !root.is_empty() && rest.starts_with('/') => rest,
        _ => path,
    };

    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

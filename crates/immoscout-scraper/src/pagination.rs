//! Discovery of result pages.
//!
//! Page 1 is requested first; its counts decide how many pages the run visits.
//! Later pages are requested one at a time by the orchestrator.

use crate::api::ApiClient;
use crate::error::ScrapeError;
use crate::extract::{parse_page, PageResult};
use std::num::NonZeroU32;
use tracing::info;

/// Number of pages a run visits
///
/// Page 1 is always visited, even when the search reports no pages.
pub fn pages_to_scrape(total_pages: u32, max_pages: Option<NonZeroU32>) -> u32 {
    let cap = max_pages.map_or(u32::MAX, NonZeroU32::get);
    total_pages.min(cap).max(1)
}

/// Result of the discovery request
#[derive(Debug, Clone)]
pub struct Discovery {
    pub first_page: PageResult,
    pub pages_to_scrape: u32,
}

/// Drives page requests for one search
pub struct PaginationDriver {
    client: ApiClient,
    search_url: String,
    max_pages: Option<NonZeroU32>,
}

impl PaginationDriver {
    pub fn new(client: ApiClient, search_url: impl Into<String>, max_pages: Option<NonZeroU32>) -> Self {
        Self {
            client,
            search_url: search_url.into(),
            max_pages,
        }
    }

    /// Fetch page 1 and work out how many pages to visit
    pub async fn discover(&self) -> Result<Discovery, ScrapeError> {
        let first_page = self.fetch_page(1).await?;
        let pages_to_scrape = pages_to_scrape(first_page.total_pages, self.max_pages);

        info!(
            total_results = first_page.total_results,
            results_per_page = first_page.page_size,
            total_pages = first_page.total_pages,
            pages_to_scrape,
            "Discovered search results"
        );

        if pages_to_scrape < first_page.total_pages {
            info!(
                skipped_pages = first_page.total_pages - pages_to_scrape,
                "Page limit reached, remaining pages will not be requested"
            );
        }

        Ok(Discovery {
            first_page,
            pages_to_scrape,
        })
    }

    /// Fetch and parse one page
    pub async fn fetch_page(&self, page: u32) -> Result<PageResult, ScrapeError> {
        let value = self.client.fetch_page(&self.search_url, page).await?;
        parse_page(page, value)
    }
}

//! Main scraper orchestrator.
//!
//! Turns a search into a stream of raw listings: discover the result pages,
//! then for each page pick out listings not seen before, fetch their details
//! concurrently and hand each one over as soon as it arrives.

use crate::api::{ApiClient, RateLimiter, RetryPolicy, Transport, UrlBuilder};
use crate::error::ScrapeError;
use crate::fetcher::DetailFetcher;
use crate::pagination::PaginationDriver;
use async_stream::stream;
use futures::Stream;
use shared::{ListingId, RawListing};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default request budget per second
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 16;

/// Settings for one run, validated on construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub max_requests_per_second: NonZeroU32,
    /// None means every page the search reports
    pub max_pages: Option<NonZeroU32>,
    pub retry: RetryPolicy,
}

impl ScrapeConfig {
    pub fn new(max_requests_per_second: u32, max_pages: Option<u32>) -> Result<Self, ScrapeError> {
        let max_requests_per_second = NonZeroU32::new(max_requests_per_second).ok_or_else(|| {
            ScrapeError::InvalidConfig("max_requests_per_second must be at least 1".to_string())
        })?;

        let max_pages = match max_pages {
            None => None,
            Some(pages) => Some(NonZeroU32::new(pages).ok_or_else(|| {
                ScrapeError::InvalidConfig("max_pages must be at least 1".to_string())
            })?),
        };

        Ok(Self {
            max_requests_per_second,
            max_pages,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: NonZeroU32::new(DEFAULT_MAX_REQUESTS_PER_SECOND)
                .unwrap_or(NonZeroU32::MIN),
            max_pages: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts gathered over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Result pages whose listings were handed out
    pub pages_scraped: u32,
    /// Listing ids found on those pages
    pub listings_found: usize,
    /// Ids skipped because an earlier run stored them
    pub already_scraped: usize,
    /// Ids skipped because an earlier page of this run listed them
    pub duplicates: usize,
    pub listings_fetched: usize,
    pub listing_failures: usize,
    pub failed_listing_ids: Vec<ListingId>,
}

impl ScrapeStats {
    pub fn record(&mut self, item: &Result<RawListing, ScrapeError>) {
        match item {
            Ok(_) => self.listings_fetched += 1,
            Err(err) => {
                if let Some(listing_id) = err.listing_id() {
                    self.listing_failures += 1;
                    self.failed_listing_ids.push(listing_id);
                }
            }
        }
    }
}

/// Live view of the counts of a running scrape
///
/// Updated by the stream before each item is handed out, so a snapshot taken
/// after the stream ends is complete.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<Mutex<ScrapeStats>>,
}

impl StatsHandle {
    pub fn snapshot(&self) -> ScrapeStats {
        self.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ScrapeStats)) {
        f(&mut self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, ScrapeStats> {
        // Counts stay usable even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One-shot scraper for a single search
pub struct ListingScraper {
    client: ApiClient,
    already_scraped: HashSet<ListingId>,
    config: ScrapeConfig,
    stats: StatsHandle,
}

impl ListingScraper {
    /// Create a scraper
    ///
    /// `already_scraped` holds listings stored by earlier runs; they are never
    /// requested again.
    pub fn new(
        transport: Arc<dyn Transport>,
        urls: Arc<dyn UrlBuilder>,
        already_scraped: HashSet<ListingId>,
        config: ScrapeConfig,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.max_requests_per_second.get()));
        let client = ApiClient::new(
            transport,
            urls,
            rate_limiter,
            config.retry.clone(),
            CancellationToken::new(),
        );

        Self {
            client,
            already_scraped,
            config,
            stats: StatsHandle::default(),
        }
    }

    /// Counts of the run, shared with the stream returned by [`Self::scrape`]
    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.client.cancellation_token().clone()
    }

    /// Scrape every page of `search_url`
    ///
    /// Per-listing failures arrive as `Err` items and the stream continues.
    /// A fatal error (see [`ScrapeError::is_fatal`]) is always the last item;
    /// listings yielded before it remain valid. Pages are handled strictly in
    /// order and the next page is only requested once the caller has drained
    /// the current one. Dropping the stream aborts all in-flight requests.
    pub fn scrape(
        self,
        search_url: impl Into<String>,
    ) -> impl Stream<Item = Result<RawListing, ScrapeError>> + Send + 'static {
        let ListingScraper {
            client,
            already_scraped,
            config,
            stats,
        } = self;
        let cancel = client.cancellation_token().clone();
        let driver = PaginationDriver::new(client.clone(), search_url, config.max_pages);
        let fetcher = DetailFetcher::new(client);

        stream! {
            let discovery = match driver.discover().await {
                Ok(discovery) => discovery,
                Err(err) => {
                    error!(error = %err, "Failed to fetch first result page");
                    yield Err(err);
                    return;
                }
            };

            let pages_to_scrape = discovery.pages_to_scrape;
            let mut pending_page = Some(discovery.first_page);
            let mut seen: HashSet<ListingId> = HashSet::new();

            for page in 1..=pages_to_scrape {
                if cancel.is_cancelled() {
                    yield Err(ScrapeError::Cancelled);
                    return;
                }

                let page_result = match pending_page.take() {
                    Some(first_page) => first_page,
                    None => match driver.fetch_page(page).await {
                        Ok(page_result) => page_result,
                        Err(err) => {
                            error!(page, error = %err, "Failed to fetch result page");
                            yield Err(err);
                            return;
                        }
                    },
                };

                let found = page_result.listing_ids.len();
                let mut stored = 0usize;
                let mut repeated = 0usize;
                let mut new_ids: Vec<ListingId> = Vec::with_capacity(found);
                for id in page_result.listing_ids {
                    if already_scraped.contains(&id) {
                        stored += 1;
                    } else if !seen.insert(id) {
                        repeated += 1;
                    } else {
                        new_ids.push(id);
                    }
                }

                stats.update(|stats| {
                    stats.pages_scraped += 1;
                    stats.listings_found += found;
                    stats.already_scraped += stored;
                    stats.duplicates += repeated;
                });

                info!(
                    page,
                    pages = pages_to_scrape,
                    found,
                    already_scraped = stored,
                    duplicates = repeated,
                    new = new_ids.len(),
                    "Found new listings on page"
                );

                let mut fetches = fetcher.spawn_all(new_ids);
                let mut fetched = 0usize;
                let mut failed = 0usize;

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Next::Cancelled,
                        outcome = fetches.next() => match outcome {
                            Some(Err(ScrapeError::Cancelled)) => Next::Cancelled,
                            Some(outcome) => Next::Outcome(outcome),
                            None => Next::PageDone,
                        },
                    };

                    match next {
                        Next::Outcome(outcome) => {
                            stats.update(|stats| stats.record(&outcome));
                            match &outcome {
                                Ok(_) => fetched += 1,
                                Err(err) => {
                                    failed += 1;
                                    warn!(page, error = %err, "Failed to fetch listing");
                                }
                            }
                            yield outcome;
                        }
                        Next::PageDone => break,
                        Next::Cancelled => {
                            fetches.abort_all();
                            info!(page, "Scrape cancelled");
                            yield Err(ScrapeError::Cancelled);
                            return;
                        }
                    }
                }

                if failed > 0 {
                    warn!(page, fetched, failed, "Page completed with partial failures");
                } else {
                    info!(page, fetched, "Page completed");
                }
            }

            info!(pages = pages_to_scrape, listings = seen.len(), "Scrape complete");
        }
    }
}

enum Next {
    Outcome(Result<RawListing, ScrapeError>),
    PageDone,
    Cancelled,
}

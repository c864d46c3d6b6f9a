//! Concurrent retrieval of listing details.

use crate::api::ApiClient;
use crate::error::ScrapeError;
use crate::extract::parse_listing_details;
use futures::FutureExt;
use shared::{ListingId, RawListing};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Fetches detail records, one task per listing
///
/// Fan-out is not capped here; the shared rate limiter inside the client is
/// what bounds the request rate.
#[derive(Clone)]
pub struct DetailFetcher {
    client: ApiClient,
}

impl DetailFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch and parse the details of one listing
    pub async fn fetch(&self, listing_id: ListingId) -> Result<RawListing, ScrapeError> {
        let data = self.client.fetch_detail(listing_id).await?;
        parse_listing_details(listing_id, data)
    }

    /// Start one task per listing
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_all(&self, listing_ids: impl IntoIterator<Item = ListingId>) -> DetailFetches {
        let mut tasks = JoinSet::new();
        let mut pending = HashSet::new();

        for listing_id in listing_ids {
            let fetcher = self.clone();
            pending.insert(listing_id);
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(fetcher.fetch(listing_id))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ScrapeError::DetailTask {
                            listing_id,
                            message: "task panicked".to_string(),
                        })
                    });
                (listing_id, outcome)
            });
        }

        debug!(tasks = tasks.len(), "Spawned detail fetches");
        DetailFetches { tasks, pending }
    }
}

type Finished = (ListingId, Result<RawListing, ScrapeError>);

/// In-flight detail fetches of one page
///
/// Dropping it aborts whatever is still running.
pub struct DetailFetches {
    tasks: JoinSet<Finished>,
    /// Listings that have not produced an outcome yet
    pending: HashSet<ListingId>,
}

impl DetailFetches {
    /// Next finished fetch, in completion order
    ///
    /// A task that dies without reporting still yields a `DetailTask` error
    /// for its listing. Returns None once every listing has been accounted for.
    pub async fn next(&mut self) -> Option<Result<RawListing, ScrapeError>> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((listing_id, outcome)) => {
                    self.pending.remove(&listing_id);
                    return Some(outcome);
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    error!(error = %join_err, "Detail task failed to join");
                }
            }
        }

        let listing_id = self.pending.iter().next().copied()?;
        self.pending.remove(&listing_id);
        Some(Err(ScrapeError::DetailTask {
            listing_id,
            message: "task ended without a result".to_string(),
        }))
    }

    /// Abort every fetch still running
    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
        self.pending.clear();
    }
}

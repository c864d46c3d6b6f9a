//! ImmoScout24 API client with rate limiting and retry logic.

use super::rate_limiter::RateLimiter;
use super::retry::{RetryError, RetryPolicy};
use super::transport::Transport;
use super::types::page_request_body;
use super::urls::UrlBuilder;
use crate::error::{FetchTarget, ScrapeError, TransportError};
use serde_json::Value;
use shared::ListingId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client for the mobile API
///
/// Every request waits for one rate-limiter permit right before it is sent,
/// on every attempt, and is retried on its own according to the retry policy.
/// Cheap to clone; clones share the limiter and the cancellation token.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    urls: Arc<dyn UrlBuilder>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(
        transport: Arc<dyn Transport>,
        urls: Arc<dyn UrlBuilder>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            urls,
            rate_limiter,
            retry,
            cancel,
        }
    }

    /// Fetch one page of search results
    pub async fn fetch_page(&self, search_url: &str, page: u32) -> Result<Value, ScrapeError> {
        let url = self.urls.page_url(search_url, page);
        let body = page_request_body();
        let target = FetchTarget::Page(page);

        debug!(page, url = %url, "Fetching result page");

        self.send(target, |transport| {
            let url = url.clone();
            let body = body.clone();
            async move { transport.post_json(&url, &body).await }
        })
        .await
        .map_err(|err| match err {
            ScrapeError::Request {
                source: TransportError::Decode { message, .. },
                ..
            } => ScrapeError::MalformedPage { page, message },
            other => other,
        })
    }

    /// Fetch the detail record of one listing
    pub async fn fetch_detail(&self, listing_id: ListingId) -> Result<Value, ScrapeError> {
        let url = self.urls.detail_url(listing_id);
        let target = FetchTarget::Listing(listing_id);

        debug!(listing_id = %listing_id, url = %url, "Fetching listing details");

        self.send(target, |transport| {
            let url = url.clone();
            async move { transport.get_json(&url).await }
        })
        .await
        .map_err(|err| match err {
            ScrapeError::Request {
                source: TransportError::Decode { message, .. },
                ..
            } => ScrapeError::MalformedDetail { listing_id, message },
            other => other,
        })
    }

    async fn send<F, Fut>(&self, target: FetchTarget, request: F) -> Result<Value, ScrapeError>
    where
        F: Fn(Arc<dyn Transport>) -> Fut,
        Fut: std::future::Future<Output = Result<Value, TransportError>>,
    {
        let label = target.to_string();

        self.retry
            .run(&label, &self.cancel, |attempt| {
                let limiter = self.rate_limiter.clone();
                let request = request(self.transport.clone());
                let label = label.clone();
                async move {
                    limiter.acquire().await;
                    debug!(target_label = %label, attempt, "Sending request");
                    request.await
                }
            })
            .await
            .map_err(|err| match err {
                RetryError::Exhausted { attempts, last } => ScrapeError::FetchExhausted {
                    target,
                    attempts,
                    source: last,
                },
                RetryError::Permanent(source) => ScrapeError::Request { target, source },
                RetryError::Cancelled => ScrapeError::Cancelled,
            })
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

//! Error types for the scraping core.

use shared::ListingId;
use std::fmt;
use thiserror::Error;

/// Failure reported by the network layer for a single request
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl TransportError {
    /// Whether the same request is expected to succeed if tried again
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connection { .. } | TransportError::Timeout { .. } => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::Decode { .. } => false,
        }
    }
}

/// What a request was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Page(u32),
    Listing(ListingId),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Page(page) => write!(f, "page {}", page),
            FetchTarget::Listing(id) => write!(f, "listing {}", id),
        }
    }
}

/// Errors produced while scraping
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("{target} failed after {attempts} attempts: {source}")]
    FetchExhausted {
        target: FetchTarget,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("request for {target} failed: {source}")]
    Request {
        target: FetchTarget,
        #[source]
        source: TransportError,
    },

    #[error("malformed response for page {page}: {message}")]
    MalformedPage { page: u32, message: String },

    #[error("malformed response for listing {listing_id}: {message}")]
    MalformedDetail { listing_id: ListingId, message: String },

    #[error("detail task for listing {listing_id} did not finish: {message}")]
    DetailTask { listing_id: ListingId, message: String },

    #[error("scrape cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScrapeError {
    /// The listing this error belongs to, if it concerns a single listing
    pub fn listing_id(&self) -> Option<ListingId> {
        match self {
            ScrapeError::FetchExhausted { target: FetchTarget::Listing(id), .. }
            | ScrapeError::Request { target: FetchTarget::Listing(id), .. } => Some(*id),
            ScrapeError::MalformedDetail { listing_id, .. }
            | ScrapeError::DetailTask { listing_id, .. } => Some(*listing_id),
            _ => None,
        }
    }

    /// Whether the error ends the run
    ///
    /// Failures of a single listing are reported and the run continues;
    /// anything else terminates the output stream.
    pub fn is_fatal(&self) -> bool {
        self.listing_id().is_none()
    }
}

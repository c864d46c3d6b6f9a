//! ImmoScout24 mobile API access.
//!
//! This module provides a rate-limited, retry-enabled client on top of a
//! pluggable JSON transport.

pub mod client;
pub mod rate_limiter;
pub mod retry;
pub mod transport;
pub mod types;
pub mod urls;

pub use client::ApiClient;
pub use rate_limiter::RateLimiter;
pub use retry::{RetryError, RetryPolicy};
pub use transport::{ReqwestTransport, Transport};
pub use types::*;
pub use urls::{MobileApiUrls, UrlBuilder};

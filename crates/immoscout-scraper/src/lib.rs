//! Listing scraper for ImmoScout24 searches.
//!
//! Given a search, the scraper walks its result pages, skips listings stored
//! by earlier runs and streams the detail records of the rest while keeping
//! the overall request rate bounded.

pub mod api;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod pagination;
pub mod scraper;

pub use api::{ApiClient, MobileApiUrls, RateLimiter, ReqwestTransport, RetryPolicy, Transport, UrlBuilder};
pub use error::{FetchTarget, ScrapeError, TransportError};
pub use extract::PageResult;
pub use fetcher::DetailFetcher;
pub use pagination::PaginationDriver;
pub use scraper::{ListingScraper, ScrapeConfig, ScrapeStats, StatsHandle};

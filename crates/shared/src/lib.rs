//! Shared library for the ImmoScout24 listing scraper.
//!
//! This crate provides the functionality around the scraping core:
//! - Configuration management
//! - Listing models
//! - SQLite database and listing store
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use logging::LogConfig;
pub use models::*;
pub use store::ListingStore;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

//! ImmoScout24 scraper CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use immoscout_scraper::{ListingScraper, MobileApiUrls, ReqwestTransport, RetryPolicy, ScrapeConfig};
use shared::{Config, Database, ListingStore};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape rental properties from ImmoScout24", long_about = None)]
struct Args {
    /// Search URL of the mobile API to scrape
    #[arg(env = "IMMOSCOUT_SCRAPER_SEARCH_URL")]
    search_url: String,

    /// Path to the SQLite database file (falls back to `database.path`, ./properties.db)
    #[arg(short, long, env = "IMMOSCOUT_SCRAPER_OUTPUT_PATH")]
    output_path: Option<PathBuf>,

    /// Maximum number of requests per second
    #[arg(
        short = 'r',
        long,
        env = "IMMOSCOUT_SCRAPER_MAX_REQUESTS_PER_SECOND",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_requests_per_second: Option<u32>,

    /// Maximum number of result pages to scrape
    #[arg(
        short = 'm',
        long,
        env = "IMMOSCOUT_SCRAPER_MAX_PAGES",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_pages: Option<u32>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        shared::logging::parse_level(&config.logging.default_level)
    };

    let _log_guard = shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "immoscout-scraper".to_string(),
        default_level: log_level,
        console: config.logging.console,
        file: config.logging.file,
        json_format: config.logging.json_format,
    })?;

    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| config.database_path());
    let max_requests_per_second = args
        .max_requests_per_second
        .unwrap_or(config.scraper.max_requests_per_second);
    let max_pages = args.max_pages.or(config.scraper.max_pages);

    info!(
        search_url = %args.search_url,
        output_path = %output_path.display(),
        max_requests_per_second,
        max_pages = ?max_pages,
        "Starting scraper"
    );

    // Initialize database
    let database = Database::open(&output_path).context("Failed to open database")?;
    let mut store = ListingStore::new(database);
    let existing_ids = store
        .fetch_saved_listing_ids()
        .context("Failed to read saved listings")?;
    info!(already_scraped = existing_ids.len(), "Loaded saved listings");

    // Initialize scraper
    let retry = RetryPolicy::new(
        config.scraper.retry.max_attempts,
        Duration::from_millis(config.scraper.retry.min_delay_ms),
        Duration::from_millis(config.scraper.retry.max_delay_ms),
    );
    let scrape_config = ScrapeConfig::new(max_requests_per_second, max_pages)
        .context("Invalid scraper settings")?
        .with_retry(retry);

    let transport = ReqwestTransport::new(
        &config.scraper.user_agent,
        Duration::from_secs(config.scraper.request_timeout_secs),
    )?;
    let urls = MobileApiUrls::new(config.scraper.api_base_url.clone());

    let scraper = ListingScraper::new(Arc::new(transport), Arc::new(urls), existing_ids, scrape_config);

    let progress = scraper.stats();
    let cancel = scraper.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping scraper");
            cancel.cancel();
        }
    });

    // Run scraper, saving each listing as it arrives
    let mut saved = 0usize;
    let mut fatal = None;

    let mut listings = pin!(scraper.scrape(args.search_url.clone()));
    while let Some(item) = listings.next().await {
        match item {
            Ok(listing) => {
                if store.save_listing(&listing)? {
                    saved += 1;
                }
            }
            Err(err) if err.is_fatal() => {
                fatal = Some(err);
            }
            Err(err) => {
                error!(error = %err, "Listing could not be scraped");
            }
        }
    }

    let stats = progress.snapshot();
    info!("=== Scraping Complete ===");
    info!("Pages scraped: {}", stats.pages_scraped);
    info!("Listings found: {}", stats.listings_found);
    info!("Already in database: {}", stats.already_scraped);
    info!("Duplicates across pages: {}", stats.duplicates);
    info!("Listings fetched: {}", stats.listings_fetched);
    info!("Listings saved: {}", saved);
    info!("Listing failures: {}", stats.listing_failures);
    info!("Listings in database: {}", store.count()?);

    if !stats.failed_listing_ids.is_empty() {
        warn!(failed = ?stats.failed_listing_ids, "Some listings failed and will be retried next run");
    }

    if let Some(err) = fatal {
        error!(error = %err, "Scraper stopped early");
        bail!("Error during scraping: {}", err);
    }

    info!("Scraper finished successfully");
    Ok(())
}

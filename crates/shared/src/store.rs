//! Persistence of raw listings.
//!
//! The store is the scraper's memory between runs: it reports which listings
//! are already saved and accepts new ones one at a time or in batches.

use crate::models::{ListingId, RawListing};
use crate::Database;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;
use tracing::{debug, info};

/// Listing store backed by SQLite
pub struct ListingStore {
    db: Database,
}

impl ListingStore {
    /// Create a new listing store with the given database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ids of all listings saved by previous runs
    pub fn fetch_saved_listing_ids(&self) -> Result<HashSet<ListingId>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare("SELECT listing_id FROM raw_listings")
            .context("Failed to prepare listing id query")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .context("Failed to query listing ids")?
            .map(|row| row.map(ListingId))
            .collect::<rusqlite::Result<HashSet<_>>>()
            .context("Failed to read listing ids")?;

        debug!(count = ids.len(), "Fetched saved listing ids");
        Ok(ids)
    }

    /// Save a single listing
    ///
    /// Returns false if the listing was already stored.
    pub fn save_listing(&mut self, listing: &RawListing) -> Result<bool> {
        let data = serde_json::to_string(&listing.data)
            .context("Failed to serialize listing payload")?;

        let inserted = self
            .db
            .conn_mut()
            .execute(
                "INSERT OR IGNORE INTO raw_listings (listing_id, data, scraped_at)
                 VALUES (?1, ?2, ?3)",
                params![listing.listing_id.get(), data, Utc::now()],
            )
            .with_context(|| format!("Failed to save listing {}", listing.listing_id))?;

        if inserted == 0 {
            debug!(listing_id = %listing.listing_id, "Listing already stored");
        } else {
            debug!(listing_id = %listing.listing_id, "Saved listing");
        }

        Ok(inserted > 0)
    }

    /// Save a batch of listings in one transaction
    ///
    /// Returns the number of newly stored listings.
    pub fn save_listings(&mut self, listings: &[RawListing]) -> Result<usize> {
        let tx = self.db.conn_mut().transaction().context("Failed to begin transaction")?;
        let now = Utc::now();

        let mut saved = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO raw_listings (listing_id, data, scraped_at)
                 VALUES (?1, ?2, ?3)",
            )?;

            for listing in listings {
                let data = serde_json::to_string(&listing.data)
                    .context("Failed to serialize listing payload")?;
                saved += stmt
                    .execute(params![listing.listing_id.get(), data, now])
                    .with_context(|| format!("Failed to save listing {}", listing.listing_id))?;
            }
        }

        tx.commit().context("Failed to commit listings")?;

        info!(total = listings.len(), saved = saved, "Saved listing batch");
        Ok(saved)
    }

    /// Number of stored listings
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM raw_listings", [], |row| row.get(0))
            .context("Failed to count listings")?;
        Ok(count as usize)
    }
}

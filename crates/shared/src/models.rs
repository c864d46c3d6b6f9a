//! Data models for the project.
//!
//! Listings are kept as raw API payloads; interpreting their fields is left to
//! whoever reads the database later.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a single listing (an "expose") on ImmoScout24.
///
/// Used both as the deduplication key and as the storage primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub i64);

impl ListingId {
    pub fn get(self) -> i64 {
        self.0
    }

    /// Read an id from a JSON value. The API sends ids as strings in some
    /// places and as numbers in others.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(ListingId),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListingId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(ListingId)
    }
}

impl From<i64> for ListingId {
    fn from(value: i64) -> Self {
        ListingId(value)
    }
}

/// Unparsed detail response for one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub listing_id: ListingId,
    pub data: serde_json::Value,
}

impl RawListing {
    pub fn new(listing_id: ListingId, data: serde_json::Value) -> Self {
        Self { listing_id, data }
    }
}

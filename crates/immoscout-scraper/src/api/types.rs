//! Mobile API response types.
//!
//! Only the fields the scraper relies on are modelled; detail responses are
//! kept as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result list item type that marks a concrete listing
pub const EXPOSE_RESULT: &str = "EXPOSE_RESULT";

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPageResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub number_of_pages: u32,
    pub result_list_items: Vec<ResultListItem>,
}

/// Entry of a result list; only some entries are listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultListItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub item: Option<Value>,
}

/// Body posted with every search page request
pub fn page_request_body() -> Value {
    serde_json::json!({
        "supportedResultListType": [],
        "userData": {},
    })
}

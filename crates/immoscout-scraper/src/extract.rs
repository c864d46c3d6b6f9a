//! Parsing of page and detail responses.

use crate::api::types::{ListingPageResponse, EXPOSE_RESULT};
use crate::error::ScrapeError;
use serde_json::Value;
use shared::{ListingId, RawListing};
use std::collections::BTreeSet;

/// What one result page tells us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub total_results: u64,
    pub page_size: u32,
    pub total_pages: u32,
    pub listing_ids: BTreeSet<ListingId>,
}

/// Parse a raw page response
pub fn parse_page(page: u32, value: Value) -> Result<PageResult, ScrapeError> {
    let response: ListingPageResponse =
        serde_json::from_value(value).map_err(|e| ScrapeError::MalformedPage {
            page,
            message: e.to_string(),
        })?;

    let listing_ids = extract_listing_ids(page, &response)?;

    Ok(PageResult {
        total_results: response.total_results,
        page_size: response.page_size,
        total_pages: response.number_of_pages,
        listing_ids,
    })
}

/// Ids of all concrete listings on a page
///
/// Other result kinds (ads, grouped projects) are skipped. A listing entry
/// without a usable id makes the whole page malformed.
pub fn extract_listing_ids(
    page: u32,
    response: &ListingPageResponse,
) -> Result<BTreeSet<ListingId>, ScrapeError> {
    response
        .result_list_items
        .iter()
        .filter(|entry| entry.item_type == EXPOSE_RESULT)
        .map(|entry| {
            entry
                .item
                .as_ref()
                .and_then(|item| item.get("id"))
                .and_then(ListingId::from_json)
                .ok_or_else(|| ScrapeError::MalformedPage {
                    page,
                    message: format!("{} entry without a valid id", EXPOSE_RESULT),
                })
        })
        .collect()
}

/// Wrap a detail response, checking it belongs to the requested listing
pub fn parse_listing_details(listing_id: ListingId, data: Value) -> Result<RawListing, ScrapeError> {
    let header_id = data
        .get("header")
        .and_then(|header| header.get("id"))
        .ok_or_else(|| ScrapeError::MalformedDetail {
            listing_id,
            message: "missing header.id".to_string(),
        })?;

    match ListingId::from_json(header_id) {
        Some(id) if id == listing_id => Ok(RawListing::new(listing_id, data)),
        Some(id) => Err(ScrapeError::MalformedDetail {
            listing_id,
            message: format!("response is for listing {}", id),
        }),
        None => Err(ScrapeError::MalformedDetail {
            listing_id,
            message: format!("invalid header.id {}", header_id),
        }),
    }
}

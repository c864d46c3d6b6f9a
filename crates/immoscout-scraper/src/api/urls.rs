//! URL construction for the ImmoScout24 mobile API.

use reqwest::Url;
use shared::ListingId;

/// Query parameter the mobile search endpoint uses for paging
const PAGE_PARAM: &str = "pagenumber";

/// Builds request URLs; the scraper treats them as opaque strings
pub trait UrlBuilder: Send + Sync {
    /// URL of one result page of a search
    fn page_url(&self, search_url: &str, page: u32) -> String;

    /// URL of the detail record for one listing
    fn detail_url(&self, listing_id: ListingId) -> String;
}

/// URLs for the mobile app API
#[derive(Debug, Clone)]
pub struct MobileApiUrls {
    base_url: String,
}

impl MobileApiUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for MobileApiUrls {
    fn default() -> Self {
        Self::new("https://api.mobile.immobilienscout24.de")
    }
}

impl UrlBuilder for MobileApiUrls {
    fn page_url(&self, search_url: &str, page: u32) -> String {
        match Url::parse(search_url) {
            Ok(mut url) => {
                let params: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(key, _)| key != PAGE_PARAM)
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();

                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(params)
                    .append_pair(PAGE_PARAM, &page.to_string());
                url.to_string()
            }
            Err(_) => {
                let separator = if search_url.contains('?') { '&' } else { '?' };
                format!("{}{}{}={}", search_url, separator, PAGE_PARAM, page)
            }
        }
    }

    fn detail_url(&self, listing_id: ListingId) -> String {
        format!("{}/expose/{}", self.base_url, listing_id)
    }
}

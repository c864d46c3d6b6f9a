//! End-to-end behaviour of the scraping pipeline against a scripted transport.

use async_trait::async_trait;
use futures::StreamExt;
use immoscout_scraper::{
    FetchTarget, ListingScraper, MobileApiUrls, RetryPolicy, ScrapeConfig, ScrapeError, ScrapeStats,
    Transport, TransportError,
};
use serde_json::{json, Value};
use shared::{ListingId, RawListing};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SEARCH_URL: &str = "https://api.test/search/list?searchType=region";

#[derive(Debug, Clone)]
enum Call {
    Page(u32),
    Detail(i64),
}

/// Transport serving scripted pages and details, recording every call
#[derive(Default)]
struct FakeTransport {
    pages: HashMap<u32, Value>,
    /// Transient failures before a page succeeds; u32::MAX means never
    page_failures: Mutex<HashMap<u32, u32>>,
    /// Transient failures before a detail succeeds; u32::MAX means never
    detail_failures: Mutex<HashMap<i64, u32>>,
    detail_delays: HashMap<i64, Duration>,
    malformed_details: HashSet<i64>,
    calls: Mutex<Vec<(Call, Instant)>>,
    /// Details whose request ran to the end
    completed_details: Mutex<Vec<i64>>,
}

impl FakeTransport {
    fn with_page(mut self, page: u32, total_pages: u32, ids: &[i64]) -> Self {
        self.pages.insert(page, page_json(total_pages, ids));
        self
    }

    fn failing_page(self, page: u32, failures: u32) -> Self {
        self.page_failures.lock().unwrap().insert(page, failures);
        self
    }

    fn failing_detail(self, id: i64, failures: u32) -> Self {
        self.detail_failures.lock().unwrap().insert(id, failures);
        self
    }

    fn slow_detail(mut self, id: i64, delay: Duration) -> Self {
        self.detail_delays.insert(id, delay);
        self
    }

    fn malformed_detail(mut self, id: i64) -> Self {
        self.malformed_details.insert(id);
        self
    }

    fn page_calls(&self) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(call, _)| match call {
                Call::Page(page) => Some(*page),
                Call::Detail(_) => None,
            })
            .collect()
    }

    fn detail_calls(&self, id: i64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| matches!(call, Call::Detail(d) if *d == id))
            .count()
    }

    fn all_detail_calls(&self) -> Vec<i64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(call, _)| match call {
                Call::Detail(id) => Some(*id),
                Call::Page(_) => None,
            })
            .collect()
    }

    fn completed_details(&self) -> Vec<i64> {
        self.completed_details.lock().unwrap().clone()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    fn take_failure(map: &Mutex<HashMap<u32, u32>>, key: u32) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&key) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let id: i64 = url
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .expect("detail url ends with the listing id");
        self.calls.lock().unwrap().push((Call::Detail(id), Instant::now()));

        if let Some(delay) = self.detail_delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        self.completed_details.lock().unwrap().push(id);

        let failing = {
            let mut failures = self.detail_failures.lock().unwrap();
            match failures.get_mut(&id) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            }
        };
        if failing {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 503,
            });
        }

        if self.malformed_details.contains(&id) {
            return Err(TransportError::Decode {
                url: url.to_string(),
                message: "expected value at line 1 column 1".to_string(),
            });
        }

        Ok(json!({"header": {"id": id.to_string()}, "sections": []}))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        assert_eq!(body, &json!({"supportedResultListType": [], "userData": {}}));

        let page: u32 = url
            .split("pagenumber=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .and_then(|s| s.parse().ok())
            .expect("page url carries a page number");
        self.calls.lock().unwrap().push((Call::Page(page), Instant::now()));

        if Self::take_failure(&self.page_failures, page) {
            return Err(TransportError::Timeout { url: url.to_string() });
        }

        self.pages.get(&page).cloned().ok_or(TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn page_json(total_pages: u32, ids: &[i64]) -> Value {
    let mut items: Vec<Value> = ids
        .iter()
        .map(|id| json!({"type": "EXPOSE_RESULT", "item": {"id": id.to_string()}}))
        .collect();
    items.push(json!({"type": "ADVERTISEMENT", "item": {"id": "ad"}}));

    json!({
        "totalResults": ids.len() as u32 * total_pages,
        "pageSize": 20,
        "numberOfPages": total_pages,
        "resultListItems": items,
    })
}

fn fast_config(max_pages: Option<u32>) -> ScrapeConfig {
    ScrapeConfig::new(1000, max_pages)
        .unwrap()
        .with_retry(RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(4)))
}

fn scraper(transport: &Arc<FakeTransport>, already: &[i64], config: ScrapeConfig) -> ListingScraper {
    ListingScraper::new(
        transport.clone(),
        Arc::new(MobileApiUrls::new("https://api.test")),
        already.iter().copied().map(ListingId).collect(),
        config,
    )
}

async fn collect(scraper: ListingScraper) -> Vec<Result<RawListing, ScrapeError>> {
    scraper.scrape(SEARCH_URL).collect().await
}

fn ok_ids(items: &[Result<RawListing, ScrapeError>]) -> Vec<i64> {
    let mut ids: Vec<i64> = items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|listing| listing.listing_id.get())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn visits_every_page_below_the_cap() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 3, &[1, 2])
            .with_page(2, 3, &[3, 4])
            .with_page(3, 3, &[5]),
    );

    let items = collect(scraper(&transport, &[], fast_config(Some(10)))).await;

    assert_eq!(transport.page_calls(), vec![1, 2, 3]);
    assert_eq!(ok_ids(&items), vec![1, 2, 3, 4, 5]);
    assert!(items.iter().all(|item| item.is_ok()));
}

#[tokio::test]
async fn page_cap_truncates_the_run() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 3, &[1, 2])
            .with_page(2, 3, &[3, 4])
            .with_page(3, 3, &[5]),
    );

    let items = collect(scraper(&transport, &[], fast_config(Some(1)))).await;

    assert_eq!(transport.page_calls(), vec![1]);
    assert_eq!(ok_ids(&items), vec![1, 2]);
}

#[tokio::test]
async fn already_scraped_listings_are_not_requested() {
    let transport = Arc::new(FakeTransport::default().with_page(1, 1, &[101, 102, 103]));

    let items = collect(scraper(&transport, &[101, 102], fast_config(None))).await;

    assert_eq!(transport.all_detail_calls(), vec![103]);
    assert_eq!(ok_ids(&items), vec![103]);
}

#[tokio::test]
async fn transient_detail_failures_are_retried() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 1, &[55, 56])
            .failing_detail(55, 2),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![55, 56]);
    assert_eq!(transport.detail_calls(55), 3);
    assert_eq!(transport.detail_calls(56), 1);
}

#[tokio::test]
async fn exhausted_detail_is_reported_without_stopping_siblings() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[7, 8, 9])
            .with_page(2, 2, &[10])
            .failing_detail(7, u32::MAX)
            .slow_detail(8, Duration::from_millis(30)),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![8, 9, 10]);
    assert_eq!(transport.detail_calls(7), 5);
    assert_eq!(transport.page_calls(), vec![1, 2]);

    let errors: Vec<&ScrapeError> = items.iter().filter_map(|item| item.as_ref().err()).collect();
    assert_eq!(errors.len(), 1);
    match errors[0] {
        ScrapeError::FetchExhausted {
            target,
            attempts,
            source,
        } => {
            assert_eq!(*target, FetchTarget::Listing(ListingId(7)));
            assert_eq!(*attempts, 5);
            assert!(matches!(source, TransportError::Status { status: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!errors[0].is_fatal());
}

#[tokio::test]
async fn malformed_detail_is_not_retried() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 1, &[1, 2])
            .malformed_detail(2),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![1]);
    assert_eq!(transport.detail_calls(2), 1);
    assert!(items.iter().any(|item| matches!(
        item,
        Err(ScrapeError::MalformedDetail { listing_id: ListingId(2), .. })
    )));
}

#[tokio::test]
async fn listings_arrive_in_completion_order() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 1, &[1, 2, 3])
            .slow_detail(1, Duration::from_millis(300))
            .slow_detail(2, Duration::from_millis(150)),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    let order: Vec<i64> = items
        .iter()
        .map(|item| item.as_ref().unwrap().listing_id.get())
        .collect();
    assert_eq!(order, vec![3, 2, 1]);
}

#[tokio::test]
async fn pages_are_delivered_in_order() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1, 2])
            .with_page(2, 2, &[3])
            .slow_detail(2, Duration::from_millis(100)),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    let order: Vec<i64> = items
        .iter()
        .map(|item| item.as_ref().unwrap().listing_id.get())
        .collect();
    // Page 2 is only requested once page 1 is drained
    assert_eq!(order.last(), Some(&3));
    assert_eq!(order.len(), 3);
}

#[tokio::test]
async fn duplicate_ids_across_pages_are_fetched_once() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1, 2])
            .with_page(2, 2, &[2, 3]),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![1, 2, 3]);
    assert_eq!(transport.detail_calls(2), 1);
}

#[tokio::test]
async fn transient_page_failures_are_retried() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1])
            .with_page(2, 2, &[2])
            .failing_page(2, 3),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![1, 2]);
    assert_eq!(transport.page_calls(), vec![1, 2, 2, 2, 2]);
}

#[tokio::test]
async fn page_failure_ends_the_run_after_earlier_results() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 3, &[1, 2])
            .with_page(2, 3, &[3])
            .with_page(3, 3, &[4])
            .failing_page(2, u32::MAX),
    );

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(ok_ids(&items), vec![1, 2]);
    let last = items.last().unwrap();
    let err = last.as_ref().unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::FetchExhausted {
            target: FetchTarget::Page(2),
            ..
        }
    ));
    assert!(err.is_fatal());
    assert!(!transport.page_calls().contains(&3));
}

#[tokio::test]
async fn first_page_failure_yields_only_the_error() {
    let transport = Arc::new(FakeTransport::default());

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(items.len(), 1);
    assert!(matches!(
        &items[0],
        Err(ScrapeError::Request {
            target: FetchTarget::Page(1),
            source: TransportError::Status { status: 404, .. },
        })
    ));
    assert_eq!(transport.page_calls(), vec![1]);
}

#[tokio::test]
async fn malformed_first_page_is_fatal() {
    let mut transport = FakeTransport::default();
    transport.pages.insert(1, json!({"totalResults": 3}));
    let transport = Arc::new(transport);

    let items = collect(scraper(&transport, &[], fast_config(None))).await;

    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(ScrapeError::MalformedPage { page: 1, .. })));
}

#[tokio::test]
async fn request_rate_stays_within_limit() {
    let ids: Vec<i64> = (1..=11).collect();
    let transport = Arc::new(FakeTransport::default().with_page(1, 1, &ids));
    let config = ScrapeConfig::new(4, None)
        .unwrap()
        .with_retry(RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)));

    let items = collect(scraper(&transport, &[], config)).await;
    assert_eq!(ok_ids(&items), ids);

    // 12 requests in total; any 5 consecutive ones must span a full second
    let mut times = transport.call_times();
    times.sort();
    assert_eq!(times.len(), 12);
    for window in times.windows(5) {
        assert!(window[4].duration_since(window[0]) >= Duration::from_millis(990));
    }
}

#[tokio::test]
async fn cancellation_stops_the_run_promptly() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1, 2])
            .with_page(2, 2, &[3])
            .slow_detail(2, Duration::from_secs(30)),
    );

    let scraper = scraper(&transport, &[], fast_config(None));
    let cancel = scraper.cancellation_token();
    let mut stream = Box::pin(scraper.scrape(SEARCH_URL));

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.listing_id, ListingId(1));

    let started = Instant::now();
    cancel.cancel();

    let rest: Vec<_> = stream.collect().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(rest.len(), 1);
    assert!(matches!(rest[0], Err(ScrapeError::Cancelled)));
    assert_eq!(transport.page_calls(), vec![1]);
}

#[tokio::test]
async fn dropping_the_stream_aborts_in_flight_fetches() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 1, &[1, 2])
            .slow_detail(2, Duration::from_millis(300)),
    );

    let mut stream = Box::pin(scraper(&transport, &[], fast_config(None)).scrape(SEARCH_URL));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.listing_id, ListingId(1));
    drop(stream);

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(transport.detail_calls(2), 1);
    assert_eq!(transport.completed_details(), vec![1]);
}

#[tokio::test]
async fn next_page_waits_until_the_caller_drains_the_current_one() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1, 2])
            .with_page(2, 2, &[3]),
    );

    let mut stream = Box::pin(scraper(&transport, &[], fast_config(None)).scrape(SEARCH_URL));
    let mut first_page = vec![
        stream.next().await.unwrap().unwrap().listing_id.get(),
        stream.next().await.unwrap().unwrap().listing_id.get(),
    ];
    first_page.sort();
    assert_eq!(first_page, vec![1, 2]);

    // Nobody polls the stream, so page 2 must not be requested
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.page_calls(), vec![1]);

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(ok_ids(&rest), vec![3]);
    assert_eq!(transport.page_calls(), vec![1, 2]);
}

#[tokio::test]
async fn run_counts_are_available_after_the_stream_ends() {
    let transport = Arc::new(
        FakeTransport::default()
            .with_page(1, 2, &[1, 2, 3])
            .with_page(2, 2, &[3, 4, 5])
            .failing_detail(5, u32::MAX),
    );

    let scraper = scraper(&transport, &[2], fast_config(None));
    let progress = scraper.stats();
    let items = collect(scraper).await;
    assert_eq!(ok_ids(&items), vec![1, 3, 4]);

    assert_eq!(
        progress.snapshot(),
        ScrapeStats {
            pages_scraped: 2,
            listings_found: 6,
            already_scraped: 1,
            duplicates: 1,
            listings_fetched: 3,
            listing_failures: 1,
            failed_listing_ids: vec![ListingId(5)],
        }
    );
}

//! Process-wide request rate limiter.
//!
//! Keeps the timestamps of recent grants and only hands out a new one while
//! fewer than `max_per_second` grants fall inside the trailing one-second
//! window, so no sliding window of one second ever sees more requests.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Rate limiter shared by every request of a run
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per window
    max_per_second: usize,
    /// Grant timestamps inside the current window, oldest first
    recent_requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_per_second: u32) -> Self {
        let max_per_second = max_per_second.max(1) as usize;
        Self {
            max_per_second,
            recent_requests: Mutex::new(VecDeque::with_capacity(max_per_second)),
        }
    }

    /// Wait until a request can be made, then consume one permit
    ///
    /// Cancel-safe: dropping the future before it resolves consumes nothing.
    pub async fn acquire(&self) {
        loop {
            let wait_time = {
                let mut recent = self.recent_requests.lock().await;
                let now = Instant::now();

                while recent
                    .front()
                    .is_some_and(|&oldest| now.duration_since(oldest) >= WINDOW)
                {
                    recent.pop_front();
                }

                if recent.len() < self.max_per_second {
                    recent.push_back(now);
                    return;
                }

                match recent.front() {
                    Some(&oldest) => WINDOW - now.duration_since(oldest),
                    None => Duration::ZERO,
                }
            };

            tracing::trace!(
                wait_ms = wait_time.as_millis(),
                "Rate limit: waiting for per-second limit"
            );
            sleep(wait_time).await;
        }
    }

}

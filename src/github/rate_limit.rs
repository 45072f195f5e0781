//! Quota back-off driven by GitHub's `X-RateLimit-*` response headers.

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::warn;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate-limit metadata carried by a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests left in the current window.
    pub remaining: u64,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at: i64,
}

impl RateLimit {
    /// Read the quota headers. A missing or garbled remaining count is
    /// treated as 1 so the response never looks exhausted by accident.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let remaining = header_int(headers, REMAINING_HEADER).unwrap_or(1);
        let reset_at = header_int(headers, RESET_HEADER).unwrap_or(0);
        RateLimit { remaining, reset_at }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

fn header_int<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Seconds since the Unix epoch.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Pauses the caller until an exhausted quota window has reset.
///
/// The reset time reported by the API is trusted exactly: no jitter, no
/// exponential backoff, no `Retry-After`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitGovernor {
    clock: Clock,
}

impl Default for RateLimitGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitGovernor {
    pub fn new() -> Self {
        Self::with_clock(system_clock)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// How long to wait before retrying, or `None` if quota remains.
    pub fn wait_for(&self, limit: &RateLimit) -> Option<Duration> {
        if !limit.is_exhausted() {
            return None;
        }
        let seconds = (limit.reset_at - (self.clock)()).max(0);
        Some(Duration::from_secs(seconds as u64))
    }

    /// Sleep until the window described by `limit` resets.
    pub async fn pause(&self, limit: &RateLimit) {
        if let Some(wait) = self.wait_for(limit) {
            warn!(
                wait_secs = wait.as_secs(),
                reset_at = limit.reset_at,
                "rate limit exceeded, sleeping until reset"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

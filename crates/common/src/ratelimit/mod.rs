//! Sliding-window rate limiting backed by the persistent store
//!
//! Counting limiter, not a token bucket: delete expired entries, count the
//! rest, then insert. The three operations are not wrapped in a
//! transaction, so bursts exactly at a window boundary can momentarily
//! admit up to twice the limit across two adjacent windows. That is the
//! accepted baseline behavior, not a defect.

use crate::db::RateWindowStore;
use crate::errors::Result;
use crate::metrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// When the oldest in-window request falls out of the window
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window limiter over a [`RateWindowStore`]
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateWindowStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateWindowStore>) -> Self {
        Self { store }
    }

    /// Check and record one request for the given key and endpoint.
    ///
    /// Over-limit is a normal outcome reported through the decision, never
    /// an error; errors surface only for store-level failures, which
    /// callers should treat as fail-open.
    pub async fn check(
        &self,
        client_key: &str,
        endpoint: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let now = Utc::now();
        let window_chrono = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::seconds(60));
        let cutoff = now - window_chrono;

        let purged = self
            .store
            .purge_entries_before(client_key, endpoint, cutoff)
            .await?;
        if purged > 0 {
            debug!(client_key, endpoint, purged, "Expired rate-limit entries removed");
        }

        let (count, oldest) = self.store.window_usage(client_key, endpoint).await?;

        if count >= limit as u64 {
            let window_start = oldest.unwrap_or(now);
            metrics::record_rate_limit_rejection(endpoint);
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: window_start + window_chrono,
            });
        }

        self.store.record_request(client_key, endpoint, now).await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: limit - count as u32 - 1,
            reset_at: oldest.unwrap_or(now) + window_chrono,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    const ENDPOINT: &str = "/v1/ask";

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SlidingWindowLimiter::new(store);

        for expected_remaining in (0..10).rev() {
            let decision = limiter
                .check("client-a", ENDPOINT, 10, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
    }

    #[tokio::test]
    async fn test_eleventh_request_rejected() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SlidingWindowLimiter::new(store);

        for _ in 0..10 {
            let decision = limiter
                .check("client-a", ENDPOINT, 10, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(decision.allowed);
        }

        let decision = limiter
            .check("client-a", ENDPOINT, 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_at > Utc::now());
    }

    #[tokio::test]
    async fn test_window_elapse_readmits() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SlidingWindowLimiter::new(store.clone());

        // Fill the window with entries that are already stale.
        let stale = Utc::now() - ChronoDuration::seconds(61);
        for _ in 0..10 {
            store
                .record_request("client-a", ENDPOINT, stale)
                .await
                .unwrap();
        }

        let decision = limiter
            .check("client-a", ENDPOINT, 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SlidingWindowLimiter::new(store);

        for _ in 0..3 {
            limiter
                .check("client-a", ENDPOINT, 3, Duration::from_secs(60))
                .await
                .unwrap();
        }

        let blocked = limiter
            .check("client-a", ENDPOINT, 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!blocked.allowed);

        let other = limiter
            .check("client-b", ENDPOINT, 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(other.allowed);
    }
}

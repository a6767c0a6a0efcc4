//! The rate limiter: `admit` for the gate, `peek` for response headers.

use chrono::{DateTime, Utc};
use llmgate_config::RateLimitConfig;
use llmgate_core::{KeyValueStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::identifier::ClientIdentifier;
use crate::window::{RateWindow, ceil_secs};

/// Quota parameters for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Upper bound on each store call.
    pub store_timeout: Duration,
    /// Prepended to the client identifier to form the store key.
    pub key_prefix: String,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    fn window_secs(&self) -> u64 {
        ceil_secs(self.window_ms())
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

/// The outcome of [`RateLimiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_secs: u64 },
    Rejected { reset_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn reset_secs(&self) -> u64 {
        match self {
            Decision::Allowed { reset_secs, .. } | Decision::Rejected { reset_secs } => *reset_secs,
        }
    }
}

/// Header figures reported by [`RateLimiter::peek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

/// Fixed-window limiter over a shared [`KeyValueStore`].
///
/// Read-modify-write against the store is two independent operations.
/// Concurrent requests from one client may both read the same count and
/// overshoot the quota slightly; that is accepted.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn limit(&self) -> u32 {
        self.policy.max_requests
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn key(&self, id: &ClientIdentifier) -> String {
        format!("{}{}", self.policy.key_prefix, id)
    }

    fn timeout_error(&self) -> StoreError {
        StoreError::Timeout {
            timeout_ms: u64::try_from(self.policy.store_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn read_window(&self, key: &str) -> Result<Option<RateWindow>, StoreError> {
        let raw = tokio::time::timeout(self.policy.store_timeout, self.store.get(key))
            .await
            .map_err(|_| self.timeout_error())??;

        raw.map(|json| {
            serde_json::from_str::<RateWindow>(&json).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn write_window(
        &self,
        key: &str,
        window: &RateWindow,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(window).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        tokio::time::timeout(
            self.policy.store_timeout,
            self.store.put(key, &json, window.ttl(now_ms)),
        )
        .await
        .map_err(|_| self.timeout_error())?
    }

    /// Full quota, full window: what we report when nothing is known.
    fn open_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests,
            reset_secs: self.policy.window_secs(),
        }
    }

    /// Count one request from `id` at `now` and decide whether it may proceed.
    ///
    /// Rejected attempts are not written back. Store failures fail open.
    pub async fn admit(&self, id: &ClientIdentifier, now: DateTime<Utc>) -> Decision {
        let key = self.key(id);
        let now_ms = now.timestamp_millis();

        let existing = match self.read_window(&key).await {
            Ok(existing) => existing,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!(client = %id.redacted(), error = %e, "Discarding unreadable rate-limit window");
                None
            }
            Err(e) => {
                warn!(client = %id.redacted(), error = %e, "Rate limit check failed, allowing request");
                let open = self.open_status();
                return Decision::Allowed {
                    remaining: open.remaining,
                    reset_secs: open.reset_secs,
                };
            }
        };

        let window = RateWindow::advance(existing, now_ms, self.policy.window_ms());
        let reset_secs = window.reset_secs(now_ms);

        if window.requests > self.policy.max_requests {
            debug!(client = %id.redacted(), requests = window.requests, "Rate limit exceeded");
            return Decision::Rejected { reset_secs };
        }

        if let Err(e) = self.write_window(&key, &window, now_ms).await {
            warn!(client = %id.redacted(), error = %e, "Failed to persist rate-limit window, allowing request");
        }

        Decision::Allowed {
            remaining: self.policy.max_requests.saturating_sub(window.requests),
            reset_secs,
        }
    }

    /// Report the current figures for `id` without changing anything.
    ///
    /// Store failures report the full quota as remaining.
    pub async fn peek(&self, id: &ClientIdentifier, now: DateTime<Utc>) -> RateLimitStatus {
        let key = self.key(id);
        let now_ms = now.timestamp_millis();

        match self.read_window(&key).await {
            Ok(Some(window)) if !window.is_expired(now_ms) => RateLimitStatus {
                limit: self.policy.max_requests,
                remaining: self.policy.max_requests.saturating_sub(window.requests),
                reset_secs: window.reset_secs(now_ms),
            },
            Ok(_) => self.open_status(),
            Err(e) => {
                warn!(client = %id.redacted(), error = %e, "Failed to get rate limit info");
                self.open_status()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use llmgate_store::InMemoryStore;

    /// A store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Read {
                key: key.into(),
                reason: "connection refused".into(),
            })
        }
        async fn put(&self, key: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Write {
                key: key.into(),
                reason: "connection refused".into(),
            })
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }
    }

    /// A store that reads fine but never accepts writes.
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        fn name(&self) -> &str {
            "read_only"
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Write {
                key: key.into(),
                reason: "read-only replica".into(),
            })
        }
        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.0.delete(key).await
        }
    }

    /// A store that hangs far longer than any sane timeout.
    struct StalledStore;

    #[async_trait]
    impl KeyValueStore for StalledStore {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
        async fn put(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn policy(max_requests: u32, window_secs: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests,
            window: Duration::from_secs(window_secs),
            ..RateLimitPolicy::default()
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn client(name: &str) -> ClientIdentifier {
        ClientIdentifier::from(name)
    }

    #[tokio::test]
    async fn rejects_after_quota_within_window() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(100, 3600));
        let id = client("token:abcdefgh");

        for i in 0..100 {
            let decision = limiter.admit(&id, at(i)).await;
            assert!(decision.is_allowed(), "request {} should be admitted", i + 1);
        }

        let decision = limiter.admit(&id, at(100)).await;
        assert!(matches!(decision, Decision::Rejected { reset_secs } if reset_secs > 0));
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(3, 60));
        let id = client("c");

        assert_eq!(
            limiter.admit(&id, at(0)).await,
            Decision::Allowed { remaining: 2, reset_secs: 60 }
        );
        assert_eq!(
            limiter.admit(&id, at(1_500)).await,
            Decision::Allowed { remaining: 1, reset_secs: 59 }
        );
        assert_eq!(
            limiter.admit(&id, at(2_000)).await,
            Decision::Allowed { remaining: 0, reset_secs: 58 }
        );
        assert_eq!(
            limiter.admit(&id, at(30_000)).await,
            Decision::Rejected { reset_secs: 30 }
        );
    }

    #[tokio::test]
    async fn rejection_is_not_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store.clone(), policy(2, 60));
        let id = client("c");

        limiter.admit(&id, at(0)).await;
        limiter.admit(&id, at(1)).await;
        for i in 2..10 {
            assert!(!limiter.admit(&id, at(i)).await.is_allowed());
        }

        let raw = store.get("rate_limit:c").await.unwrap().unwrap();
        let window: RateWindow = serde_json::from_str(&raw).unwrap();
        assert_eq!(window.requests, 2);
    }

    #[tokio::test]
    async fn new_window_after_window_end() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(1, 60));
        let id = client("c");

        assert!(limiter.admit(&id, at(0)).await.is_allowed());
        assert!(!limiter.admit(&id, at(59_999)).await.is_allowed());

        // Exactly at window_end: half-open boundary starts a fresh window.
        assert_eq!(
            limiter.admit(&id, at(60_000)).await,
            Decision::Allowed { remaining: 0, reset_secs: 60 }
        );
    }

    #[tokio::test]
    async fn clients_are_partitioned() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(1, 60));

        assert!(limiter.admit(&client("a"), at(0)).await.is_allowed());
        assert!(limiter.admit(&client("b"), at(0)).await.is_allowed());
        assert!(!limiter.admit(&client("a"), at(1)).await.is_allowed());
    }

    #[tokio::test]
    async fn limiters_sharing_a_store_share_quota() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let first = RateLimiter::new(store.clone(), policy(2, 60));
        let second = RateLimiter::new(store, policy(2, 60));
        let id = client("shared");

        assert!(first.admit(&id, at(0)).await.is_allowed());
        assert!(second.admit(&id, at(1)).await.is_allowed());
        assert!(!first.admit(&id, at(2)).await.is_allowed());
    }

    #[tokio::test]
    async fn store_read_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), policy(1, 60));
        let id = client("c");

        for i in 0..5 {
            assert!(limiter.admit(&id, at(i)).await.is_allowed());
        }
    }

    #[tokio::test]
    async fn store_write_failure_still_admits() {
        let limiter = RateLimiter::new(
            Arc::new(ReadOnlyStore(InMemoryStore::new())),
            policy(5, 60),
        );
        assert_eq!(
            limiter.admit(&client("c"), at(0)).await,
            Decision::Allowed { remaining: 4, reset_secs: 60 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_and_fails_open() {
        let limiter = RateLimiter::new(Arc::new(StalledStore), policy(1, 60));
        let id = client("c");

        assert!(limiter.admit(&id, at(0)).await.is_allowed());
        let status = limiter.peek(&id, at(0)).await;
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test]
    async fn corrupt_window_restarts_count() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("rate_limit:c", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let limiter = RateLimiter::new(store.clone(), policy(3, 60));

        assert_eq!(
            limiter.admit(&client("c"), at(0)).await,
            Decision::Allowed { remaining: 2, reset_secs: 60 }
        );
        let raw = store.get("rate_limit:c").await.unwrap().unwrap();
        assert!(serde_json::from_str::<RateWindow>(&raw).is_ok());
    }

    #[tokio::test]
    async fn peek_does_not_mutate() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(10, 60));
        let id = client("c");

        limiter.admit(&id, at(0)).await;
        limiter.admit(&id, at(0)).await;

        let first = limiter.peek(&id, at(1_000)).await;
        let second = limiter.peek(&id, at(1_000)).await;
        assert_eq!(first, second);
        assert_eq!(
            first,
            RateLimitStatus { limit: 10, remaining: 8, reset_secs: 59 }
        );
    }

    #[tokio::test]
    async fn peek_without_window_reports_full_quota() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(10, 60));
        let status = limiter.peek(&client("fresh"), at(0)).await;
        assert_eq!(
            status,
            RateLimitStatus { limit: 10, remaining: 10, reset_secs: 60 }
        );
    }

    #[tokio::test]
    async fn peek_after_window_end_reports_full_quota() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), policy(10, 60));
        let id = client("c");
        limiter.admit(&id, at(0)).await;

        assert_eq!(limiter.peek(&id, at(60_000)).await.remaining, 10);
    }

    #[tokio::test]
    async fn peek_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), policy(7, 60));
        assert_eq!(
            limiter.peek(&client("c"), at(0)).await,
            RateLimitStatus { limit: 7, remaining: 7, reset_secs: 60 }
        );
    }
}

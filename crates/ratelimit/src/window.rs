//! The stored per-client counter and its window arithmetic.
//!
//! All timestamps are epoch milliseconds. Windows are half-open:
//! a request at exactly `window_end` belongs to the next window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One client's request count for the current window.
///
/// Invariant: `window_end == window_start + window length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    /// Requests counted in this window.
    pub requests: u32,
    pub window_start: i64,
    pub window_end: i64,
}

impl RateWindow {
    /// A new window opened by a request at `now_ms`.
    pub fn fresh(now_ms: i64, window_ms: i64) -> Self {
        Self {
            requests: 1,
            window_start: now_ms,
            window_end: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether `now_ms` falls outside `[window_start, window_end)`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.window_end
    }

    /// The window that results from one more request at `now_ms`.
    ///
    /// Absent or expired windows restart at a count of 1; live windows
    /// are incremented.
    pub fn advance(existing: Option<Self>, now_ms: i64, window_ms: i64) -> Self {
        match existing {
            Some(window) if !window.is_expired(now_ms) => Self {
                requests: window.requests.saturating_add(1),
                ..window
            },
            _ => Self::fresh(now_ms, window_ms),
        }
    }

    /// Milliseconds left in the window (never negative).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.window_end - now_ms).max(0)
    }

    /// Seconds until the window resets, rounded up.
    pub fn reset_secs(&self, now_ms: i64) -> u64 {
        ceil_secs(self.remaining_ms(now_ms))
    }

    /// Store TTL for a write at `now_ms`: the remaining window length in
    /// whole seconds, at least one.
    pub fn ttl(&self, now_ms: i64) -> Duration {
        Duration::from_secs(self.reset_secs(now_ms).max(1))
    }
}

/// `ceil(ms / 1000)` for non-negative `ms`.
pub(crate) fn ceil_secs(ms: i64) -> u64 {
    let ms = u64::try_from(ms).unwrap_or(0);
    ms.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn fresh_window_spans_configured_length() {
        let w = RateWindow::fresh(1_000, HOUR_MS);
        assert_eq!(w.requests, 1);
        assert_eq!(w.window_end - w.window_start, HOUR_MS);
    }

    #[test]
    fn advance_increments_live_window() {
        let w = RateWindow::fresh(0, HOUR_MS);
        let next = RateWindow::advance(Some(w), 10, HOUR_MS);
        assert_eq!(next.requests, 2);
        assert_eq!(next.window_start, 0);
        assert_eq!(next.window_end, HOUR_MS);
    }

    #[test]
    fn boundary_is_half_open() {
        let w = RateWindow {
            requests: 100,
            window_start: 0,
            window_end: HOUR_MS,
        };
        assert!(!w.is_expired(HOUR_MS - 1));
        assert!(w.is_expired(HOUR_MS));

        let next = RateWindow::advance(Some(w), HOUR_MS, HOUR_MS);
        assert_eq!(next.requests, 1);
        assert_eq!(next.window_start, HOUR_MS);
    }

    #[test]
    fn absent_window_starts_fresh() {
        let next = RateWindow::advance(None, 42, HOUR_MS);
        assert_eq!(next, RateWindow::fresh(42, HOUR_MS));
    }

    #[test]
    fn reset_rounds_up_partial_seconds() {
        let w = RateWindow::fresh(0, 10_000);
        assert_eq!(w.reset_secs(0), 10);
        assert_eq!(w.reset_secs(1), 10);
        assert_eq!(w.reset_secs(9_001), 1);
        assert_eq!(w.reset_secs(10_000), 0);
        assert_eq!(w.reset_secs(20_000), 0);
    }

    #[test]
    fn ttl_never_zero() {
        let w = RateWindow::fresh(0, 10_000);
        assert_eq!(w.ttl(0), Duration::from_secs(10));
        assert_eq!(w.ttl(9_999), Duration::from_secs(1));
        assert_eq!(w.ttl(10_000), Duration::from_secs(1));
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let w = RateWindow {
            requests: 3,
            window_start: 5,
            window_end: 10,
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"requests":3,"windowStart":5,"windowEnd":10}"#);
    }
}

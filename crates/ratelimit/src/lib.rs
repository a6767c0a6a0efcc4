//! Distributed fixed-window rate limiting for llmgate.
//!
//! Each client gets one [`RateWindow`] record in the shared
//! [`llmgate_core::KeyValueStore`]. The limiter itself is stateless, so any
//! number of gateway processes can enforce the same quota.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`ClientIdentifier`] | Partition key derived from request metadata |
//! | [`RateWindow`] | Stored counter with half-open `[start, end)` bounds |
//! | [`RateLimiter`] | `admit` (mutating) and `peek` (read-only) |
//!
//! Store failures never block traffic: the limiter fails open and logs.

pub mod identifier;
pub mod limiter;
pub mod window;

pub use identifier::ClientIdentifier;
pub use limiter::{Decision, RateLimitPolicy, RateLimitStatus, RateLimiter};
pub use window::RateWindow;

//! KeyValueStore trait: the abstraction over shared counter storage.
//!
//! The rate limiter keeps no state of its own. Every counter lives in a
//! store behind this narrow get/put-with-TTL interface, so gateway
//! processes can scale horizontally while sharing quotas.
//!
//! Implementations: in-memory map (tests, single node), SQLite, PostgreSQL.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// An eventually-consistent, TTL-capable key-value store.
///
/// No transactional primitive is offered: a read followed by a write is two
/// independent operations and concurrent writers may interleave.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Read a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a value. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Physically remove expired entries and return how many went.
    ///
    /// Stores that expire entries on their own can keep the default.
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

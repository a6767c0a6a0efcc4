//! Key-value store backends for llmgate.
//!
//! All backends implement [`llmgate_core::KeyValueStore`]. The rate limiter
//! only ever sees the trait object returned by [`build_from_config`].

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use std::sync::Arc;

use llmgate_config::{StoreBackendKind, StoreConfig};
use llmgate_core::{KeyValueStore, StoreError};

/// Build the configured store backend.
pub async fn build_from_config(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        StoreBackendKind::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackendKind::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let url = required_url(config)?;
                Ok(Arc::new(SqliteStore::new(url).await?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                Err(StoreError::Connection(
                    "sqlite backend requested but the `sqlite` feature is disabled".into(),
                ))
            }
        }
        StoreBackendKind::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let url = required_url(config)?;
                let store = PostgresStore::connect(url).await?;
                store.migrate().await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "postgres"))]
            {
                Err(StoreError::Connection(
                    "postgres backend requested but the `postgres` feature is disabled".into(),
                ))
            }
        }
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn required_url(config: &StoreConfig) -> Result<&str, StoreError> {
    config
        .url
        .as_deref()
        .ok_or_else(|| StoreError::Connection("store.url is not set".into()))
}

/// Milliseconds since the Unix epoch at which an entry written now with
/// `ttl` expires.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn expiry_millis(ttl: std::time::Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp_millis().saturating_add(ttl_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_store() {
        let store = build_from_config(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }

    #[tokio::test]
    async fn missing_url_is_a_connection_error() {
        let config = StoreConfig {
            backend: StoreBackendKind::Sqlite,
            url: None,
            ..StoreConfig::default()
        };
        assert!(build_from_config(&config).await.is_err());
    }
}

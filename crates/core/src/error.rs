//! Error types for the llmgate domain.
//!
//! Each external collaborator has its own `thiserror` enum. The gateway maps
//! them onto HTTP responses; nothing above it needs a unified error type.

use thiserror::Error;

/// Failures of the shared key-value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store read failed for {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Store write failed for {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Store operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Corrupt value under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures of the remote inference call itself (transport level).
///
/// A call that completes but yields no usable text is not an error; it is
/// reported as [`crate::InferenceOutcome::Unusable`].
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Inference API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Inference authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Inference backend not configured: {0}")]
    NotConfigured(String),

    #[error("Inference request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed inference response: {0}")]
    InvalidResponse(String),
}

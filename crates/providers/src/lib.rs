//! Inference backends for llmgate.
//!
//! All backends implement the `llmgate_core::InferenceBackend` trait.
//! [`build_from_config`] picks the one described by configuration.

pub mod workers_ai;

pub use workers_ai::WorkersAiBackend;

use llmgate_config::InferenceConfig;
use llmgate_core::{InferenceBackend, InferenceError};
use std::sync::Arc;

/// Build the configured inference backend.
pub fn build_from_config(
    config: &InferenceConfig,
) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
    Ok(Arc::new(WorkersAiBackend::from_config(config)?))
}

//! # llmgate Core
//!
//! Domain types, traits, and error definitions for the llmgate inference
//! gateway. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates:
//! - [`KeyValueStore`]: shared counter storage (`llmgate-store`)
//! - [`InferenceBackend`]: the remote model call (`llmgate-providers`)
//!
//! Tests swap in in-memory stores and scripted backends without touching
//! the gateway or the rate limiter.

pub mod error;
pub mod inference;
pub mod message;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{InferenceError, StoreError};
pub use inference::{
    CachePolicy, InferenceBackend, InferenceInput, InferenceOutcome, InferenceParams, PromptInput,
    Reasoning, ReasoningEffort, Usage,
};
pub use message::{ConversationMessage, Role};
pub use store::KeyValueStore;

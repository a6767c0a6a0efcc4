//! Character-budgeted conversation context for llmgate.
//!
//! Keeps multi-turn history inside a model's window without exact
//! tokenization, then folds what survives into a single instruction
//! string for the inference call.
//!
//! # Pipeline
//!
//! | Step | Module | Output |
//! |------|--------|--------|
//! | 1. Budget | [`budget`] | Character budget for the requested model |
//! | 2. Truncate | [`truncate`] | Most recent suffix that fits, plus a marker if anything was dropped |
//! | 3. Assemble | [`prompt`] | Transcript block followed by the base instructions |
//!
//! Every step is pure: identical inputs give byte-identical outputs.

pub mod budget;
pub mod prompt;
pub mod token;
pub mod truncate;

pub use budget::CharacterBudgets;
pub use prompt::{DEFAULT_INSTRUCTIONS, build_instructions};
pub use truncate::{TRUNCATION_MARKER, TruncationOutcome, truncate};

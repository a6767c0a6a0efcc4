//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. The gateway
//! reports these figures as usage when the backend does not.

/// Characters assumed per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}

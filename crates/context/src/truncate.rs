//! History truncation against a character budget.
//!
//! Walks from the most recent message backward and keeps messages while
//! the running character total stays within budget. The walk stops at the
//! first message that does not fit; it never skips ahead to smaller,
//! older messages.

use llmgate_core::{ConversationMessage, Role};
use serde::Serialize;

/// Content of the synthetic system message that replaces dropped history.
pub const TRUNCATION_MARKER: &str = "[Earlier conversation history was truncated due to length]";

/// The result of [`truncate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncationOutcome {
    /// Retained suffix in chronological order, led by the marker when
    /// anything was dropped.
    pub retained_messages: Vec<ConversationMessage>,
    pub was_truncated: bool,
    pub original_count: usize,
    /// Length of `retained_messages`, marker included.
    pub retained_count: usize,
}

impl TruncationOutcome {
    fn empty() -> Self {
        Self {
            retained_messages: Vec::new(),
            was_truncated: false,
            original_count: 0,
            retained_count: 0,
        }
    }

    /// Number of original messages dropped from the front.
    pub fn dropped_count(&self) -> usize {
        let kept = self.retained_count - usize::from(self.was_truncated);
        self.original_count - kept
    }
}

/// Keep the longest suffix of `history` whose total content length is at
/// most `max_chars`.
pub fn truncate(history: &[ConversationMessage], max_chars: usize) -> TruncationOutcome {
    if history.is_empty() {
        return TruncationOutcome::empty();
    }

    let mut total = 0usize;
    let mut first_kept = history.len();
    for (index, message) in history.iter().enumerate().rev() {
        let next = total.saturating_add(message.char_len());
        if next > max_chars {
            break;
        }
        total = next;
        first_kept = index;
    }

    let was_truncated = first_kept > 0;
    let mut retained_messages = Vec::with_capacity(history.len() - first_kept + 1);
    if was_truncated {
        retained_messages.push(ConversationMessage::new(Role::System, TRUNCATION_MARKER));
    }
    retained_messages.extend_from_slice(&history[first_kept..]);

    TruncationOutcome {
        retained_count: retained_messages.len(),
        retained_messages,
        was_truncated,
        original_count: history.len(),
    }
}

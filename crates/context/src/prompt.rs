//! Prompt assembly: retained history rendered as a transcript, followed
//! by the base instructions.

use llmgate_core::{ConversationMessage, Role};

/// Base instructions used when the caller supplies none.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI assistant.";

const HISTORY_HEADER: [&str; 5] = [
    "=== CONVERSATION HISTORY ===",
    "IMPORTANT: You MUST remember and refer to the following conversation history.",
    "The user expects you to maintain context from previous messages.",
    "",
    "Previous messages in this conversation:",
];

const HISTORY_FOOTER: [&str; 9] = [
    "\n=== END OF HISTORY ===",
    "",
    "CRITICAL INSTRUCTIONS:",
    "1. You MUST consider the above conversation history when responding",
    "2. If the user asks about something mentioned earlier, refer to it",
    "3. Maintain consistency with your previous responses",
    "4. If asked about previous messages, reference them accurately",
    "5. Remember any names, preferences, or facts shared by the user",
    "",
];

/// Transcript lines plus the number the next user turn will get.
struct Transcript {
    lines: Vec<String>,
    next_user_turn: usize,
}

impl Transcript {
    fn start() -> Self {
        Self {
            lines: HISTORY_HEADER.iter().map(|l| l.to_string()).collect(),
            next_user_turn: 1,
        }
    }

    fn push(mut self, message: &ConversationMessage) -> Self {
        match message.role {
            Role::User => {
                self.lines
                    .push(format!("\n[Message {} - User]:", self.next_user_turn));
                self.lines.push(message.content.clone());
                self.next_user_turn += 1;
            }
            Role::Assistant => {
                self.lines.push("[Your Previous Response]:".to_string());
                self.lines.push(message.content.clone());
            }
            Role::System => self.lines.push(message.content.clone()),
        }
        self
    }

    fn finish(mut self) -> String {
        self.lines.extend(HISTORY_FOOTER.iter().map(|l| l.to_string()));
        self.lines.join("\n")
    }
}

/// Render `retained` as a transcript block.
///
/// Returns an empty string for an empty slice.
pub fn render_history(retained: &[ConversationMessage]) -> String {
    if retained.is_empty() {
        return String::new();
    }
    retained
        .iter()
        .fold(Transcript::start(), Transcript::push)
        .finish()
}

/// Combine retained history and base instructions into one instruction
/// string.
///
/// With no history the base instructions are returned unchanged.
pub fn build_instructions(base: Option<&str>, retained: &[ConversationMessage]) -> String {
    let base = base.unwrap_or(DEFAULT_INSTRUCTIONS);
    if retained.is_empty() {
        return base.to_string();
    }
    format!(
        "{}\n\nSystem Instructions: {base}",
        render_history(retained)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truncate::{TRUNCATION_MARKER, truncate};

    #[test]
    fn empty_history_returns_base_unchanged() {
        assert_eq!(build_instructions(Some("Be concise."), &[]), "Be concise.");
    }

    #[test]
    fn empty_history_without_base_uses_default() {
        assert_eq!(build_instructions(None, &[]), DEFAULT_INSTRUCTIONS);
    }

    #[test]
    fn renders_exact_transcript() {
        let history = vec![
            ConversationMessage::user("My name is Ada."),
            ConversationMessage::assistant("Hello Ada!"),
            ConversationMessage::user("What is my name?"),
        ];
        let expected = "=== CONVERSATION HISTORY ===\n\
IMPORTANT: You MUST remember and refer to the following conversation history.\n\
The user expects you to maintain context from previous messages.\n\
\n\
Previous messages in this conversation:\n\
\n\
[Message 1 - User]:\n\
My name is Ada.\n\
[Your Previous Response]:\n\
Hello Ada!\n\
\n\
[Message 2 - User]:\n\
What is my name?\n\
\n\
=== END OF HISTORY ===\n\
\n\
CRITICAL INSTRUCTIONS:\n\
1. You MUST consider the above conversation history when responding\n\
2. If the user asks about something mentioned earlier, refer to it\n\
3. Maintain consistency with your previous responses\n\
4. If asked about previous messages, reference them accurately\n\
5. Remember any names, preferences, or facts shared by the user\n\
\n\
\n\
System Instructions: Be concise.";

        assert_eq!(build_instructions(Some("Be concise."), &history), expected);
    }

    #[test]
    fn system_lines_do_not_advance_numbering() {
        let history = vec![
            ConversationMessage::system(TRUNCATION_MARKER),
            ConversationMessage::user("first"),
            ConversationMessage::system("note"),
            ConversationMessage::user("second"),
        ];
        let rendered = render_history(&history);

        assert!(rendered.contains(&format!("conversation:\n{TRUNCATION_MARKER}\n")));
        assert!(rendered.contains("[Message 1 - User]:\nfirst\nnote\n"));
        assert!(rendered.contains("[Message 2 - User]:\nsecond"));
        assert!(!rendered.contains("[Message 3"));
    }

    #[test]
    fn default_base_follows_history() {
        let history = vec![ConversationMessage::user("hi")];
        let out = build_instructions(None, &history);
        assert!(out.ends_with("\n\nSystem Instructions: You are a helpful AI assistant."));
        assert!(out.starts_with("=== CONVERSATION HISTORY ==="));
    }

    #[test]
    fn deterministic() {
        let history = vec![
            ConversationMessage::user("a"),
            ConversationMessage::assistant("b"),
            ConversationMessage::system("c"),
        ];
        assert_eq!(
            build_instructions(Some("x"), &history),
            build_instructions(Some("x"), &history)
        );
    }

    #[test]
    fn assembles_truncated_history_with_marker_first() {
        let history: Vec<_> = (0..5)
            .map(|i| ConversationMessage::user(format!("turn {i}")))
            .collect();
        let outcome = truncate(&history, 12);
        let out = build_instructions(None, &outcome.retained_messages);

        let marker_at = out.find(TRUNCATION_MARKER).unwrap();
        let first_turn_at = out.find("[Message 1 - User]:\nturn 3").unwrap();
        assert!(marker_at < first_turn_at);
        assert!(out.contains("[Message 2 - User]:\nturn 4"));
        assert!(!out.contains("turn 2"));
    }
}

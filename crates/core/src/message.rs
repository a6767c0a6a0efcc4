//! Conversation message domain types.
//!
//! A conversation is an ordered sequence of [`ConversationMessage`]s in
//! chronological order. The gateway never persists them; they live for the
//! duration of a single request.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions or synthetic notices
    System,
}

impl Role {
    /// Parse a wire role name. Returns `None` for anything unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Length of the content in characters (Unicode scalar values).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = ConversationMessage::user("Hello, gateway!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, gateway!");
    }

    #[test]
    fn roles_use_lowercase_wire_names() {
        let msg = ConversationMessage::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed: Result<ConversationMessage, _> =
            serde_json::from_str(r#"{"role":"developer","content":"x"}"#);
        assert!(parsed.is_err());
        assert_eq!(Role::parse("developer"), None);
        assert_eq!(Role::parse("system"), Some(Role::System));
    }

    #[test]
    fn char_len_counts_scalars_not_bytes() {
        let msg = ConversationMessage::user("héllo");
        assert_eq!(msg.char_len(), 5);
        assert_eq!(msg.content.len(), 6);
    }
}

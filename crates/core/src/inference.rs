//! Inference backend trait: the abstraction over the remote model call.
//!
//! The gateway hands an [`InferenceParams`] to a backend and gets back an
//! [`InferenceOutcome`]. The model's internal behaviour is opaque; all the
//! gateway cares about is whether usable text came back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::message::ConversationMessage;

/// How hard a reasoning model should think.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Reasoning options forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reasoning {
    pub effort: ReasoningEffort,
}

impl Reasoning {
    pub fn new(effort: ReasoningEffort) -> Self {
        Self { effort }
    }
}

/// The prompt payload under the `input` key: plain text or a turn list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Text(String),
    Turns(Vec<ConversationMessage>),
}

impl PromptInput {
    /// Total characters carried by this input.
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Turns(turns) => turns.iter().map(ConversationMessage::char_len).sum(),
        }
    }
}

/// Which wire field carries the prompt.
///
/// Serialized flattened into [`InferenceParams`], producing either an
/// `"input"` or a `"messages"` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceInput {
    /// Responses-style `input` with separate `instructions`.
    Input(PromptInput),
    /// Chat-style `messages` list.
    Messages(Vec<ConversationMessage>),
}

/// Edge cache settings for one call, honoured when the backend routes
/// through a caching gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub skip_cache: bool,
    pub ttl_secs: u64,
}

impl CachePolicy {
    pub fn new(skip_cache: bool, ttl_secs: u64) -> Self {
        Self {
            skip_cache,
            ttl_secs,
        }
    }
}

/// Parameters for a single inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    #[serde(flatten)]
    pub input: InferenceInput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Transport-level option; never part of the request body.
    #[serde(skip)]
    pub cache: Option<CachePolicy>,
}

impl InferenceParams {
    /// Responses-style call: `input` plus assembled `instructions`.
    pub fn responses(input: PromptInput, instructions: impl Into<String>) -> Self {
        Self {
            input: InferenceInput::Input(input),
            instructions: Some(instructions.into()),
            reasoning: None,
            max_tokens: None,
            temperature: None,
            cache: None,
        }
    }

    /// Chat-style call with a `messages` list.
    pub fn chat(messages: Vec<ConversationMessage>) -> Self {
        Self {
            input: InferenceInput::Messages(messages),
            instructions: None,
            reasoning: None,
            max_tokens: None,
            temperature: None,
            cache: None,
        }
    }

    /// Bare text prompt with no instructions.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            input: InferenceInput::Input(PromptInput::Text(prompt.into())),
            instructions: None,
            reasoning: None,
            max_tokens: None,
            temperature: None,
            cache: None,
        }
    }

    pub fn with_reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning = Some(Reasoning::new(effort));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Characters of prompt text sent to the model (input + instructions).
    pub fn prompt_chars(&self) -> usize {
        let input = match &self.input {
            InferenceInput::Input(input) => input.char_len(),
            InferenceInput::Messages(messages) => {
                messages.iter().map(ConversationMessage::char_len).sum()
            }
        };
        input + self.instructions.as_deref().map_or(0, |i| i.chars().count())
    }
}

/// Token usage information reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// The result of an inference call that reached the model.
///
/// Forces callers to handle the "no usable text" case explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// The model produced text.
    Completed { text: String, usage: Option<Usage> },
    /// The call returned, but without anything the gateway can deliver.
    Unusable { reason: String },
}

impl InferenceOutcome {
    /// Classify a raw response field: absent or empty text is unusable.
    pub fn from_response(response: Option<String>, usage: Option<Usage>) -> Self {
        match response {
            Some(text) if !text.is_empty() => Self::Completed { text, usage },
            Some(_) => Self::Unusable {
                reason: "model returned an empty response".into(),
            },
            None => Self::Unusable {
                reason: "response field missing from model output".into(),
            },
        }
    }
}

/// The core inference trait.
///
/// Every remote model endpoint implements this trait. The gateway calls
/// `run()` without knowing which backend is in use.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "workers_ai").
    fn name(&self) -> &str;

    /// Run the model once. No retries are attempted.
    async fn run(
        &self,
        model: &str,
        params: InferenceParams,
    ) -> Result<InferenceOutcome, InferenceError>;

    /// Embed each text with an embedding model, one vector per input.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        let _ = texts;
        Err(InferenceError::NotConfigured(format!(
            "{} cannot run embedding model {model}",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_params_serialize_input_and_instructions() {
        let params = InferenceParams::responses(
            PromptInput::Text("What is Rust?".into()),
            "Be concise.",
        )
        .with_reasoning(ReasoningEffort::Medium);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["input"], "What is Rust?");
        assert_eq!(json["instructions"], "Be concise.");
        assert_eq!(json["reasoning"]["effort"], "medium");
        assert!(json.get("messages").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn cache_policy_stays_out_of_the_body() {
        let params = InferenceParams::text("hi").with_cache(CachePolicy::new(true, 300));
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("cache").is_none());
        assert_eq!(params.cache, Some(CachePolicy::new(true, 300)));
    }

    #[test]
    fn chat_params_serialize_messages() {
        let params = InferenceParams::chat(vec![
            ConversationMessage::system("You are helpful."),
            ConversationMessage::user("Hi"),
        ])
        .with_max_tokens(512)
        .with_temperature(0.7);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 512);
        assert!(json.get("input").is_none());
        assert!(json.get("instructions").is_none());
    }

    #[test]
    fn prompt_chars_counts_input_and_instructions() {
        let params = InferenceParams::responses(PromptInput::Text("abcd".into()), "efgh");
        assert_eq!(params.prompt_chars(), 8);
    }

    #[test]
    fn outcome_classifies_missing_and_empty_text() {
        assert_eq!(
            InferenceOutcome::from_response(Some("ok".into()), None),
            InferenceOutcome::Completed {
                text: "ok".into(),
                usage: None
            }
        );
        assert!(matches!(
            InferenceOutcome::from_response(Some(String::new()), None),
            InferenceOutcome::Unusable { .. }
        ));
        assert!(matches!(
            InferenceOutcome::from_response(None, None),
            InferenceOutcome::Unusable { .. }
        ));
    }

    #[test]
    fn reasoning_effort_parse() {
        assert_eq!(ReasoningEffort::parse("high"), Some(ReasoningEffort::High));
        assert_eq!(ReasoningEffort::parse("extreme"), None);
        assert_eq!(ReasoningEffort::default(), ReasoningEffort::Medium);
    }
}

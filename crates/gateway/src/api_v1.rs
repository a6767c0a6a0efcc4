//! HTTP API v1: inference routes behind the gatekeeper.
//!
//! Endpoints:
//!
//! - `GET  /api/v1/models`           : Configured models
//! - `POST /api/v1/chat`             : Responses format with conversation history
//! - `POST /api/v1/chat/completions` : OpenAI-compatible chat completions
//! - `POST /api/v1/completions`      : Plain text completion
//! - `POST /api/v1/chatbot`          : Single-turn chatbot
//! - `POST /api/v1/code`             : Responses format with high reasoning
//! - `POST /api/v1/embeddings`       : Vector embeddings for up to 100 inputs
//! - `POST /api/v1/normalize-survey-question` : Survey question rewriting

use axum::{
    Router,
    extract::{FromRequest, State},
    response::Json,
    routing::{get, post},
};
use chrono::Utc;
use llmgate_context::token::estimate_tokens;
use llmgate_context::{TruncationOutcome, build_instructions, truncate};
use llmgate_core::{
    CachePolicy, ConversationMessage, InferenceOutcome, InferenceParams, PromptInput,
    ReasoningEffort, Role, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::SharedState;
use crate::error::ApiError;

/// Longest message or prompt accepted, in characters.
const MAX_CONTENT_CHARS: usize = 32_000;
/// Longest chatbot message accepted, in characters.
const MAX_CHATBOT_CHARS: usize = 4_000;
const MAX_TOKENS_LIMIT: i64 = 4_096;

const DEFAULT_MAX_TOKENS: u32 = 1_024;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const CHATBOT_MAX_TOKENS: u32 = 512;

/// Edge cache lifetime for chat style routes.
const CHAT_CACHE_TTL_SECS: u64 = 3_600;
/// Edge cache lifetime for `/code`.
const CODE_CACHE_TTL_SECS: u64 = 300;

const MAX_EMBED_INPUTS: usize = 100;
const MAX_EMBED_CHARS: usize = 8_192;

const MAX_QUESTION_CHARS: usize = 1_000;
const MAX_CATEGORY_CHARS: usize = 100;
const MAX_CONTEXT_CHARS: usize = 500;
const NORMALIZE_MAX_TOKENS: u32 = 1_024;
const NORMALIZE_TEMPERATURE: f32 = 0.3;

const CHATBOT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Please provide clear, accurate, and helpful responses.";
const CODE_INSTRUCTIONS: &str = "You are a helpful AI assistant with code interpreter capabilities. Use code execution when needed to solve mathematical problems, data analysis, or programming tasks.";

const NORMALIZE_SYSTEM_PROMPT: &str = r#"You are a survey question normalization expert. Your task is to standardize survey questions to improve consistency and reduce ambiguity.

Guidelines:
1. Normalize questions to use clear, professional language
2. Remove bias, leading language, and ambiguous terms
3. Ensure questions are specific and measurable
4. Maintain the original intent while improving clarity
5. Use standardized formats for common question types

Response format (JSON):
{
  "normalized_question": "The standardized version of the question",
  "confidence_score": 0.95,
  "category": "determined_category",
  "suggestions": [
    {
      "question": "The standardized version of the question",
      "confidence": 0.95,
      "reasoning": "Explanation of why this normalization was chosen"
    }
  ]
}"#;

/// Build the v1 router. The caller applies the gatekeeper and state.
pub fn v1_router() -> Router<SharedState> {
    Router::new()
        .route("/models", get(models_handler))
        .route("/chat", post(responses_handler))
        .route("/chat/completions", post(chat_completions_handler))
        .route("/completions", post(completions_handler))
        .route("/chatbot", post(chatbot_handler))
        .route("/code", post(code_handler))
        .route("/embeddings", post(embeddings_handler))
        .route("/normalize-survey-question", post(normalize_survey_handler))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// JSON body extractor whose rejections render as validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

// ── Request types ─────────────────────────────────────────────────────────

/// A message as sent by the client, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// Per-request AI gateway cache options.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOptions {
    #[serde(default)]
    pub skip_cache: Option<bool>,
    #[serde(default)]
    pub cache_ttl: Option<u64>,
}

impl GatewayOptions {
    fn policy(options: Option<&Self>, default_ttl: u64) -> CachePolicy {
        CachePolicy::new(
            options.and_then(|o| o.skip_cache).unwrap_or(false),
            options.and_then(|o| o.cache_ttl).unwrap_or(default_ttl),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasoningRequest {
    #[serde(default)]
    pub effort: Option<String>,
}

/// Responses-format request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesRequest {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub reasoning: Option<ReasoningRequest>,
    #[serde(default)]
    pub conversation_history: Option<Vec<RawMessage>>,
    #[serde(default)]
    pub gateway: Option<GatewayOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<RawMessage>>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub gateway: Option<GatewayOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotRequest {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingRequest {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SurveyRequest {
    #[serde(default)]
    pub question: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub context: Option<Value>,
}

// ── Response types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub owned_by: String,
    pub context_window: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct HistorySummary {
    pub original_count: usize,
    pub retained_count: usize,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub output_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub history: HistorySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatbotResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct Embedding {
    pub object: &'static str,
    pub embedding: Vec<f32>,
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingList {
    pub object: &'static str,
    pub data: Vec<Embedding>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

/// One candidate rewrite of a survey question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSuggestion {
    pub question: String,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Serialize)]
pub struct SurveyNormalizationResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub original_question: String,
    pub normalized_question: String,
    pub confidence_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub suggestions: Vec<NormalizationSuggestion>,
    pub usage: Usage,
}

// ── Validation ────────────────────────────────────────────────────────────

/// What a message's content must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentRule {
    /// Non-empty and at most `MAX_CONTENT_CHARS`.
    Bounded,
    /// Any string, empty included. Length is left to the truncator.
    Unbounded,
}

/// Validate client messages. `label` prefixes error messages.
fn validate_messages(
    label: &str,
    raw: &[RawMessage],
    rule: ContentRule,
) -> Result<Vec<ConversationMessage>, ApiError> {
    raw.iter()
        .enumerate()
        .map(|(index, message)| {
            let role = message.role.as_deref().filter(|r| !r.is_empty());
            let content = message.content.as_ref().filter(|c| {
                !c.is_null() && (rule == ContentRule::Unbounded || c.as_str() != Some(""))
            });
            let (Some(role), Some(content)) = (role, content) else {
                return Err(ApiError::Validation(format!(
                    "{label} at index {index} must have role and content fields"
                )));
            };

            let role = Role::parse(role).ok_or_else(|| {
                ApiError::Validation(format!("{label} at index {index} has invalid role: {role}"))
            })?;
            let content = content.as_str().ok_or_else(|| {
                ApiError::Validation(format!("{label} at index {index} content must be a string"))
            })?;
            if rule == ContentRule::Bounded && content.chars().count() > MAX_CONTENT_CHARS {
                return Err(ApiError::Validation(format!(
                    "{label} at index {index} content is too long (max {MAX_CONTENT_CHARS} characters)"
                )));
            }
            Ok(ConversationMessage::new(role, content))
        })
        .collect()
}

fn parse_input(input: Option<Value>) -> Result<PromptInput, ApiError> {
    let missing = || ApiError::Validation("Missing required field: input".into());
    match input {
        Some(Value::String(text)) if !text.is_empty() => Ok(PromptInput::Text(text)),
        Some(Value::Array(items)) if !items.is_empty() => {
            let raw: Vec<RawMessage> = serde_json::from_value(Value::Array(items))
                .map_err(|e| ApiError::Validation(format!("Invalid input messages: {e}")))?;
            Ok(PromptInput::Turns(validate_messages("Input message", &raw, ContentRule::Bounded)?))
        }
        None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Array(_)) => Err(missing()),
        Some(_) => Err(ApiError::Validation(
            "input must be a string or an array of messages".into(),
        )),
    }
}

fn parse_effort(effort: Option<&str>) -> Result<Option<ReasoningEffort>, ApiError> {
    effort
        .map(|e| {
            ReasoningEffort::parse(e).ok_or_else(|| {
                ApiError::Validation("reasoning_effort must be one of: low, medium, high".into())
            })
        })
        .transpose()
}

fn validate_max_tokens(max_tokens: Option<i64>) -> Result<u32, ApiError> {
    match max_tokens {
        None => Ok(DEFAULT_MAX_TOKENS),
        Some(n) if (1..=MAX_TOKENS_LIMIT).contains(&n) => {
            u32::try_from(n).map_err(|e| ApiError::Internal(e.to_string()))
        }
        Some(_) => Err(ApiError::Validation(format!(
            "max_tokens must be between 1 and {MAX_TOKENS_LIMIT}"
        ))),
    }
}

fn validate_temperature(temperature: Option<f64>) -> Result<f32, ApiError> {
    match temperature {
        None => Ok(DEFAULT_TEMPERATURE),
        Some(t) if (0.0..=2.0).contains(&t) => Ok(t as f32),
        Some(_) => Err(ApiError::Validation(
            "temperature must be between 0 and 2".into(),
        )),
    }
}

/// Required, non-empty string field no longer than `max_chars`.
fn required_text(
    value: Option<Value>,
    field: &str,
    max_chars: usize,
) -> Result<String, ApiError> {
    let text = match value {
        None | Some(Value::Null) => {
            return Err(ApiError::Validation(format!("{field} field is required")));
        }
        Some(Value::String(text)) => text,
        Some(_) => return Err(ApiError::Validation(format!("{field} must be a string"))),
    };
    if text.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} cannot be empty")));
    }
    if text.chars().count() > max_chars {
        return Err(ApiError::Validation(format!(
            "{field} is too long (max {max_chars} characters)"
        )));
    }
    Ok(text)
}

/// Optional string field no longer than `max_chars`. Empty reads as absent.
fn optional_text(
    value: Option<Value>,
    field: &str,
    max_chars: usize,
) -> Result<Option<String>, ApiError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) if text.is_empty() => return Ok(None),
        Some(Value::String(text)) => text,
        Some(_) => return Err(ApiError::Validation(format!("{field} must be a string"))),
    };
    if text.chars().count() > max_chars {
        return Err(ApiError::Validation(format!(
            "{field} is too long (max {max_chars} characters)"
        )));
    }
    Ok(Some(text))
}

/// A single string or an array of strings, each non-empty and bounded.
fn embedding_inputs(input: Option<Value>) -> Result<Vec<String>, ApiError> {
    let items = match input {
        None | Some(Value::Null) => {
            return Err(ApiError::Validation("input field is required".into()));
        }
        Some(Value::String(text)) if text.is_empty() => {
            return Err(ApiError::Validation("input field is required".into()));
        }
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };
    if items.is_empty() {
        return Err(ApiError::Validation("input cannot be empty".into()));
    }
    if items.len() > MAX_EMBED_INPUTS {
        return Err(ApiError::Validation(format!(
            "Cannot process more than {MAX_EMBED_INPUTS} inputs at once"
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::String(text) = item else {
                return Err(ApiError::Validation(format!(
                    "Input at index {index} must be a string"
                )));
            };
            if text.is_empty() {
                return Err(ApiError::Validation(format!(
                    "Input at index {index} cannot be empty"
                )));
            }
            if text.chars().count() > MAX_EMBED_CHARS {
                return Err(ApiError::Validation(format!(
                    "Input at index {index} is too long (max {MAX_EMBED_CHARS} characters)"
                )));
            }
            Ok(text)
        })
        .collect()
}

/// Split chat-completion messages into base instructions, history and prompt.
///
/// The first system message is the base. A trailing user message is the
/// prompt and everything before it is history; otherwise the final message
/// is the prompt, whatever its role.
fn split_conversation(
    messages: &[ConversationMessage],
) -> (Option<&str>, Vec<ConversationMessage>, String) {
    let prompt_at = messages.len().saturating_sub(1);
    let earlier = &messages[..prompt_at];
    let system_at = earlier.iter().position(|m| m.role == Role::System);

    let history = earlier
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != system_at)
        .map(|(_, m)| m.clone())
        .collect();
    let base = system_at.map(|i| earlier[i].content.as_str());
    let prompt = messages
        .get(prompt_at)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    (base, history, prompt)
}

/// Pull the JSON object out of a model reply and check its shape.
fn parse_normalization(reply: &str) -> Option<ParsedNormalization> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply,
    };
    let parsed: ParsedNormalization = serde_json::from_str(json).ok()?;

    let in_unit = |x: f64| (0.0..=1.0).contains(&x);
    let valid = !parsed.normalized_question.is_empty()
        && in_unit(parsed.confidence_score)
        && parsed
            .suggestions
            .iter()
            .all(|s| !s.question.is_empty() && !s.reasoning.is_empty() && in_unit(s.confidence));
    valid.then_some(parsed)
}

#[derive(Debug, Deserialize)]
struct ParsedNormalization {
    normalized_question: String,
    confidence_score: f64,
    #[serde(default)]
    category: Option<String>,
    suggestions: Vec<NormalizationSuggestion>,
}

fn normalization_prompt(category: Option<&str>, context: Option<&str>) -> String {
    let mut prompt = NORMALIZE_SYSTEM_PROMPT.to_string();
    if let Some(category) = category {
        prompt.push_str(&format!(
            "\n\nCategory context: This question is for {category} surveys."
        ));
    }
    if let Some(context) = context {
        prompt.push_str(&format!("\n\nAdditional context: {context}"));
    }
    prompt
}

// ── Shared steps ──────────────────────────────────────────────────────────

/// Truncate `history` for `model` and fold it into `base` instructions.
fn assemble(
    state: &SharedState,
    model: &str,
    base: Option<&str>,
    history: &[ConversationMessage],
) -> (String, TruncationOutcome) {
    let budget = state.budgets.for_model(model);
    let outcome = truncate(history, budget);
    let instructions = build_instructions(base, &outcome.retained_messages);

    if outcome.was_truncated {
        info!(
            model = %model,
            budget,
            original = outcome.original_count,
            retained = outcome.retained_count,
            instructions_chars = instructions.chars().count(),
            "Conversation history truncated"
        );
    }
    (instructions, outcome)
}

fn truncation_warning(outcome: &TruncationOutcome) -> Option<String> {
    outcome.was_truncated.then(|| {
        format!(
            "Conversation history was truncated to fit the model context: kept {} of {} messages",
            outcome.original_count - outcome.dropped_count(),
            outcome.original_count
        )
    })
}

async fn run_inference(
    state: &SharedState,
    model: &str,
    params: InferenceParams,
) -> Result<(String, Option<Usage>), ApiError> {
    match state.backend.run(model, params).await? {
        InferenceOutcome::Completed { text, usage } => Ok((text, usage)),
        InferenceOutcome::Unusable { reason } => {
            warn!(model = %model, reason = %reason, "Inference returned no usable response");
            Err(ApiError::Upstream(
                "Failed to generate response from AI model".into(),
            ))
        }
    }
}

fn estimated_usage(prompt: &str, completion: &str) -> Usage {
    let prompt_tokens = estimate_tokens(prompt);
    let completion_tokens = estimate_tokens(completion);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn models_handler(State(state): State<SharedState>) -> Json<ModelList> {
    let data = state
        .config
        .models
        .table
        .iter()
        .map(|entry| ModelInfo {
            id: entry.id.clone(),
            object: "model",
            owned_by: entry.owned_by.clone(),
            context_window: entry.context_tokens,
        })
        .collect();
    Json(ModelList {
        object: "list",
        data,
    })
}

async fn responses_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<ResponsesRequest>,
) -> Result<Json<ResponsesResponse>, ApiError> {
    let input = parse_input(payload.input)?;
    let effort = parse_effort(payload.reasoning.as_ref().and_then(|r| r.effort.as_deref()))?
        .unwrap_or_default();
    let history = validate_messages(
        "History message",
        payload.conversation_history.as_deref().unwrap_or_default(),
        ContentRule::Unbounded,
    )?;
    let model = state.resolve_model(payload.model)?;
    let cache = GatewayOptions::policy(payload.gateway.as_ref(), CHAT_CACHE_TTL_SECS);

    info!(model = %model, history = history.len(), "v1/chat request");

    let base = payload.instructions.as_deref().filter(|i| !i.is_empty());
    let (instructions, outcome) = assemble(&state, &model, base, &history);
    let params = InferenceParams::responses(input, instructions)
        .with_reasoning(effort)
        .with_cache(cache);
    let (text, usage) = run_inference(&state, &model, params).await?;

    Ok(Json(ResponsesResponse {
        id: new_id("resp-"),
        object: "response",
        created: Utc::now().timestamp(),
        model,
        output_text: text,
        usage,
        warning: truncation_warning(&outcome),
        history: HistorySummary {
            original_count: outcome.original_count,
            retained_count: outcome.retained_count,
            truncated: outcome.was_truncated,
        },
    }))
}

async fn chat_completions_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    let raw = payload.messages.ok_or_else(|| {
        ApiError::Validation("messages field is required and must be an array".into())
    })?;
    if raw.is_empty() {
        return Err(ApiError::Validation("messages array cannot be empty".into()));
    }
    let messages = validate_messages("Message", &raw, ContentRule::Bounded)?;
    let max_tokens = validate_max_tokens(payload.max_tokens)?;
    let temperature = validate_temperature(payload.temperature)?;
    let effort = parse_effort(payload.reasoning_effort.as_deref())?.unwrap_or_default();
    if payload.stream == Some(true) {
        return Err(ApiError::Validation("stream is not supported".into()));
    }

    let (base, history, prompt) = split_conversation(&messages);
    let model = state.resolve_model(payload.model)?;
    let cache = GatewayOptions::policy(payload.gateway.as_ref(), CHAT_CACHE_TTL_SECS);

    info!(model = %model, messages = messages.len(), "v1/chat/completions request");

    let (instructions, outcome) = assemble(&state, &model, base, &history);
    let params = InferenceParams::responses(PromptInput::Text(prompt), instructions)
        .with_reasoning(effort)
        .with_max_tokens(max_tokens)
        .with_temperature(temperature)
        .with_cache(cache);
    let (text, usage) = run_inference(&state, &model, params).await?;

    let usage = usage.unwrap_or_else(|| {
        let joined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        estimated_usage(&joined, &text)
    });

    Ok(Json(ChatCompletionResponse {
        id: new_id("chatcmpl-"),
        object: "chat.completion",
        created: Utc::now().timestamp(),
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content: text,
            },
            finish_reason: "stop",
        }],
        usage,
        warning: truncation_warning(&outcome),
    }))
}

async fn completions_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CompletionRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let prompt = required_text(payload.prompt, "prompt", MAX_CONTENT_CHARS)?;
    let max_tokens = validate_max_tokens(payload.max_tokens)?;
    let temperature = validate_temperature(payload.temperature)?;
    let model = state.resolve_model(payload.model)?;

    let params = InferenceParams::text(prompt.clone())
        .with_max_tokens(max_tokens)
        .with_temperature(temperature);
    let (text, usage) = run_inference(&state, &model, params).await?;
    let usage = usage.unwrap_or_else(|| estimated_usage(&prompt, &text));

    Ok(Json(CompletionResponse {
        id: new_id("cmpl-"),
        object: "text_completion",
        created: Utc::now().timestamp(),
        model,
        choices: vec![CompletionChoice {
            text,
            index: 0,
            finish_reason: "stop",
        }],
        usage,
    }))
}

async fn chatbot_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<ChatbotRequest>,
) -> Result<Json<ChatbotResponse>, ApiError> {
    let message = required_text(payload.message, "message", MAX_CHATBOT_CHARS)?;
    let system = payload
        .system_prompt
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| CHATBOT_SYSTEM_PROMPT.to_string());
    let model = state.resolve_model(None)?;

    let params = InferenceParams::chat(vec![
        ConversationMessage::system(system),
        ConversationMessage::user(message),
    ])
    .with_max_tokens(CHATBOT_MAX_TOKENS)
    .with_temperature(DEFAULT_TEMPERATURE);
    let (text, _) = run_inference(&state, &model, params).await?;

    Ok(Json(ChatbotResponse { response: text }))
}

async fn code_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<ResponsesRequest>,
) -> Result<Json<ResponsesResponse>, ApiError> {
    let input = parse_input(payload.input)?;
    let model = state.resolve_model(payload.model)?;
    let cache = GatewayOptions::policy(payload.gateway.as_ref(), CODE_CACHE_TTL_SECS);
    let instructions = payload
        .instructions
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| CODE_INSTRUCTIONS.to_string());

    info!(model = %model, "v1/code request");

    let params = InferenceParams::responses(input, instructions)
        .with_reasoning(ReasoningEffort::High)
        .with_cache(cache);
    let (text, usage) = run_inference(&state, &model, params).await?;

    Ok(Json(ResponsesResponse {
        id: new_id("resp-"),
        object: "response",
        created: Utc::now().timestamp(),
        model,
        output_text: text,
        usage,
        history: HistorySummary {
            original_count: 0,
            retained_count: 0,
            truncated: false,
        },
        warning: None,
    }))
}

async fn embeddings_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<EmbeddingRequest>,
) -> Result<Json<EmbeddingList>, ApiError> {
    let inputs = embedding_inputs(payload.input)?;
    let default_model = &state.config.inference.embedding_model;
    let model = match payload.model.map(|m| m.trim().to_string()) {
        Some(m) if !m.is_empty() && m != *default_model => state.resolve_model(Some(m))?,
        _ => default_model.clone(),
    };

    info!(model = %model, inputs = inputs.len(), "v1/embeddings request");

    let vectors = state.backend.embed(&model, &inputs).await?;
    let tokens: u32 = inputs.iter().map(|i| estimate_tokens(i)).sum();
    let data = vectors
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| Embedding {
            object: "embedding",
            embedding,
            index,
        })
        .collect();

    Ok(Json(EmbeddingList {
        object: "list",
        data,
        model,
        usage: EmbeddingUsage {
            prompt_tokens: tokens,
            total_tokens: tokens,
        },
    }))
}

async fn normalize_survey_handler(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<SurveyRequest>,
) -> Result<Json<SurveyNormalizationResponse>, ApiError> {
    let question = required_text(payload.question, "question", MAX_QUESTION_CHARS)?;
    let category = optional_text(payload.category, "category", MAX_CATEGORY_CHARS)?;
    let context = optional_text(payload.context, "context", MAX_CONTEXT_CHARS)?;
    let model = state.config.inference.normalization_model.clone();

    let system = normalization_prompt(category.as_deref(), context.as_deref());
    let user = format!(
        "Please normalize this survey question: \"{question}\"\n\nReturn only the JSON response as specified in the system prompt."
    );
    let prompt_text = format!("{system}{user}");

    let params = InferenceParams::chat(vec![
        ConversationMessage::system(system),
        ConversationMessage::user(user),
    ])
    .with_max_tokens(NORMALIZE_MAX_TOKENS)
    .with_temperature(NORMALIZE_TEMPERATURE);
    let (reply, _) = run_inference(&state, &model, params).await?;

    let parsed = parse_normalization(&reply).ok_or_else(|| {
        warn!(model = %model, reply_chars = reply.chars().count(), "Unparseable normalization reply");
        ApiError::Upstream("Failed to parse AI response for survey normalization".into())
    })?;

    Ok(Json(SurveyNormalizationResponse {
        id: new_id("norm-"),
        object: "survey_normalization",
        created: Utc::now().timestamp(),
        original_question: question,
        normalized_question: parsed.normalized_question,
        confidence_score: parsed.confidence_score,
        category: category.or(parsed.category),
        suggestions: parsed.suggestions,
        usage: estimated_usage(&prompt_text, &reply),
    }))
}

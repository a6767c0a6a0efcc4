//! Configuration loading, validation, and management for llmgate.
//!
//! Loads configuration from `~/.llmgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.llmgate/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Client authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-client request quota
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Shared key-value store backing the rate limiter
    #[serde(default)]
    pub store: StoreConfig,

    /// Remote inference endpoint
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Known models and their character budgets
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .field("rate_limit", &self.rate_limit)
            .field("store", &self.store)
            .field("inference", &self.inference)
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body size.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The single API key clients must present as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on each store call; expiry counts as a store failure.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Prefix prepended to the client identifier to form the store key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_max_requests() -> u32 {
    100
}
fn default_window_secs() -> u64 {
    3600
}
fn default_store_timeout_ms() -> u64 {
    250
}
fn default_key_prefix() -> String {
    "rate_limit:".into()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            store_timeout_ms: default_store_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Which [`StoreConfig`] backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

impl std::str::FromStr for StoreBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::ValidationError(format!(
                "unknown store backend '{other}' (expected memory, sqlite or postgres)"
            ))),
        }
    }
}

impl std::fmt::Display for StoreBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        })
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,

    /// SQLite path (`sqlite://gate.db`) or PostgreSQL DSN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Seconds between sweeps that delete expired entries. 0 disables.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_purge_interval() -> u64 {
    300
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::default(),
            url: None,
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // DSNs routinely embed passwords.
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("url", &redact(&self.url))
            .field("purge_interval_secs", &self.purge_interval_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// AI Gateway id. When set, calls go through the caching gateway at
    /// `gateway_base_url` instead of the direct run endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,

    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Model used by the embeddings route when the request names none.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model used for survey question normalization.
    #[serde(default = "default_normalization_model")]
    pub normalization_model: String,
}

fn default_inference_base_url() -> String {
    "https://api.cloudflare.com/client/v4".into()
}
fn default_model() -> String {
    "@cf/openai/gpt-oss-120b".into()
}
fn default_inference_timeout() -> u64 {
    120
}
fn default_gateway_base_url() -> String {
    "https://gateway.ai.cloudflare.com/v1".into()
}
fn default_embedding_model() -> String {
    "@cf/baai/bge-base-en-v1.5".into()
}
fn default_normalization_model() -> String {
    "@cf/meta/llama-3.1-8b-instruct".into()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_base_url(),
            account_id: None,
            api_token: None,
            default_model: default_model(),
            timeout_secs: default_inference_timeout(),
            gateway_id: None,
            gateway_base_url: default_gateway_base_url(),
            embedding_model: default_embedding_model(),
            normalization_model: default_normalization_model(),
        }
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("api_token", &redact(&self.api_token))
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("gateway_id", &self.gateway_id)
            .field("gateway_base_url", &self.gateway_base_url)
            .field("embedding_model", &self.embedding_model)
            .field("normalization_model", &self.normalization_model)
            .finish()
    }
}

/// One row of the model table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,

    /// The model's context window in tokens.
    pub context_tokens: usize,

    /// Characters assumed per token when deriving the character budget.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    #[serde(default = "default_owner")]
    pub owned_by: String,
}

fn default_chars_per_token() -> usize {
    4
}
fn default_owner() -> String {
    "cloudflare".into()
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, context_tokens: usize, owned_by: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_tokens,
            chars_per_token: default_chars_per_token(),
            owned_by: owned_by.into(),
        }
    }

    /// Estimated character budget for this model.
    pub fn estimated_chars(&self) -> usize {
        self.context_tokens.saturating_mul(self.chars_per_token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Character budget for models not listed in `table`.
    #[serde(default = "default_char_budget")]
    pub default_char_budget: usize,

    #[serde(default = "default_model_table")]
    pub table: Vec<ModelEntry>,

    /// Accept model names missing from `table`. When false, requests naming
    /// an unlisted model are rejected.
    #[serde(default)]
    pub allow_unlisted: bool,
}

fn default_char_budget() -> usize {
    400_000
}

fn default_model_table() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new("@cf/openai/gpt-oss-120b", 128_000, "openai"),
        ModelEntry::new("@cf/openai/gpt-oss-20b", 128_000, "openai"),
        ModelEntry::new("@cf/meta/llama-3.1-8b-instruct", 8_192, "meta"),
    ]
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_char_budget: default_char_budget(),
            table: default_model_table(),
            allow_unlisted: false,
        }
    }
}

impl ModelsConfig {
    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.table.iter().find(|m| m.id == id)
    }

    /// Whether a request may name `id`.
    pub fn accepts(&self, id: &str) -> bool {
        self.allow_unlisted || self.get(id).is_some()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.llmgate/config.toml),
    /// or from `LLMGATE_CONFIG` when set.
    ///
    /// Environment variables override file values:
    /// - `API_SECRET_KEY` / `LLMGATE_API_KEY`: client API key
    /// - `RATE_LIMIT_REQUESTS`, `RATE_LIMIT_WINDOW`: quota
    /// - `LLMGATE_STORE`, `LLMGATE_STORE_URL`: store backend
    /// - `LLMGATE_INFERENCE_ACCOUNT`, `LLMGATE_INFERENCE_TOKEN`, `LLMGATE_MODEL`
    /// - `AI_GATEWAY_ID`: route inference through the caching gateway
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("LLMGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        Self::load_with_env(&path)
    }

    /// Load from a specific path, then apply process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`.
    ///
    /// Numeric values that fail to parse leave the current value in place.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("LLMGATE_API_KEY").or_else(|| lookup("API_SECRET_KEY")) {
            self.auth.api_key = Some(key);
        }

        if let Some(n) = lookup("RATE_LIMIT_REQUESTS").and_then(|v| v.trim().parse().ok()) {
            self.rate_limit.max_requests = n;
        }
        if let Some(n) = lookup("RATE_LIMIT_WINDOW").and_then(|v| v.trim().parse().ok()) {
            self.rate_limit.window_secs = n;
        }

        if let Some(kind) = lookup("LLMGATE_STORE").and_then(|v| v.parse().ok()) {
            self.store.backend = kind;
        }
        if let Some(url) = lookup("LLMGATE_STORE_URL") {
            self.store.url = Some(url);
        }

        if let Some(account) = lookup("LLMGATE_INFERENCE_ACCOUNT") {
            self.inference.account_id = Some(account);
        }
        if let Some(token) = lookup("LLMGATE_INFERENCE_TOKEN") {
            self.inference.api_token = Some(token);
        }
        if let Some(model) = lookup("LLMGATE_MODEL") {
            self.inference.default_model = model;
        }
        if let Some(id) = lookup("AI_GATEWAY_ID").filter(|id| !id.is_empty()) {
            self.inference.gateway_id = Some(id);
        }

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.gateway.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".llmgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }

        if self.store.backend != StoreBackendKind::Memory && self.store.url.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "store.url is required for the {:?} backend",
                self.store.backend
            )));
        }

        if let Some(bad) = self.models.table.iter().find(|m| m.chars_per_token == 0) {
            return Err(ConfigError::ValidationError(format!(
                "models.table entry '{}' has chars_per_token = 0",
                bad.id
            )));
        }

        if !self.models.accepts(&self.inference.default_model) {
            return Err(ConfigError::ValidationError(format!(
                "inference.default_model '{}' is not in models.table",
                self.inference.default_model
            )));
        }

        Ok(())
    }

    /// Check if the client API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.auth.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

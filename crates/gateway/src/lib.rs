//! HTTP gateway for llmgate.
//!
//! Fronts a remote inference service: every `/api/v1` route passes the
//! gatekeeper (bearer auth, then the shared rate limiter) before its
//! handler runs, and leaves with `X-RateLimit-*` headers attached.
//! [`start`] also runs a background sweep that drops expired counters
//! from the store.

pub mod api_v1;
pub mod auth;
pub mod error;
pub mod gatekeeper;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, extract::State, middleware, response::Json, routing::get};
use llmgate_config::AppConfig;
use llmgate_context::CharacterBudgets;
use llmgate_core::{InferenceBackend, KeyValueStore};
use llmgate_ratelimit::{RateLimitPolicy, RateLimiter};
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub use error::ApiError;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub limiter: RateLimiter,
    pub backend: Arc<dyn InferenceBackend>,
    pub budgets: CharacterBudgets,
    started_at: Instant,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let limiter = RateLimiter::new(store, RateLimitPolicy::from_config(&config.rate_limit));
        let budgets = CharacterBudgets::from_config(&config.models);
        Self {
            config,
            limiter,
            backend,
            budgets,
            started_at: Instant::now(),
        }
    }

    /// The requested model, or the configured default when absent or blank.
    ///
    /// Models outside the configured table are rejected unless
    /// `models.allow_unlisted` is set.
    pub fn resolve_model(&self, requested: Option<String>) -> Result<String, ApiError> {
        let model = requested
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.inference.default_model.clone());
        if self.config.models.accepts(&model) {
            Ok(model)
        } else {
            Err(ApiError::Validation(format!(
                "Invalid model. Supported models: {}",
                self.supported_models().join(", ")
            )))
        }
    }

    /// Ids from the configured model table.
    pub fn supported_models(&self) -> Vec<String> {
        self.config
            .models
            .table
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied, outermost first:
/// - HTTP trace logging
/// - CORS from `gateway.allowed_origins`
/// - Request body size limit
/// - Panic recovery into a 500 error body
pub fn build_router(state: SharedState) -> Router {
    let api = api_v1::v1_router().layer(middleware::from_fn_with_state(
        state.clone(),
        gatekeeper::gatekeeper,
    ));

    let body_limit = state.config.gateway.body_limit_bytes;
    let cors = cors_layer(&state.config.gateway.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        .fallback(api_v1::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            HeaderName::from_static(error::RATE_LIMIT_LIMIT),
            HeaderName::from_static(error::RATE_LIMIT_REMAINING),
            HeaderName::from_static(error::RATE_LIMIT_RESET),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(86_400))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store = llmgate_store::build_from_config(&config.store).await?;
    let backend = llmgate_providers::build_from_config(&config.inference)?;
    if !config.has_api_key() {
        warn!("No API key configured; protected routes will answer 500 until one is set");
    }

    info!(
        store = store.name(),
        backend = backend.name(),
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Gateway components ready"
    );

    let sweep = match config.store.purge_interval_secs {
        0 => None,
        secs => Some(spawn_expiry_sweep(store.clone(), Duration::from_secs(secs))),
    };

    let state = Arc::new(GatewayState::new(config, store, backend));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "llmgate listening");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    served?;

    info!("llmgate stopped");
    Ok(())
}

/// Periodically purge expired entries from `store`.
///
/// The first purge runs one full interval after the call.
pub fn spawn_expiry_sweep(store: Arc<dyn KeyValueStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(store = store.name(), removed, "Purged expired entries"),
                Err(e) => warn!(store = store.name(), error = %e, "Expiry sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    timestamp: String,
    models: Vec<String>,
    ai_gateway: AiGatewayStatus,
}

#[derive(Serialize)]
struct AiGatewayStatus {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_id: Option<String>,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        models: state.supported_models(),
        ai_gateway: AiGatewayStatus {
            enabled: state.config.inference.gateway_id.is_some(),
            gateway_id: state.config.inference.gateway_id.clone(),
        },
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use llmgate_config::ModelEntry;
    use llmgate_core::{InferenceError, InferenceOutcome, InferenceParams};
    use llmgate_store::InMemoryStore;
    use std::sync::Mutex;

    pub const TEST_KEY: &str = "sk-test-0123456789";

    enum Script {
        Reply(String),
        Unusable,
        Fail,
    }

    /// Width of the vectors the mock embeds into.
    pub const EMBED_DIMS: usize = 3;

    /// Scripted backend that records the last call it received.
    pub struct MockBackend {
        script: Script,
        last: Mutex<Option<(String, InferenceParams)>>,
    }

    impl MockBackend {
        fn with(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                last: Mutex::new(None),
            })
        }

        pub fn replying(text: &str) -> Arc<Self> {
            Self::with(Script::Reply(text.to_string()))
        }

        pub fn unusable() -> Arc<Self> {
            Self::with(Script::Unusable)
        }

        pub fn failing() -> Arc<Self> {
            Self::with(Script::Fail)
        }

        pub fn last_call(&self) -> Option<(String, InferenceParams)> {
            self.last.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn run(
            &self,
            model: &str,
            params: InferenceParams,
        ) -> Result<InferenceOutcome, InferenceError> {
            *self.last.lock().unwrap() = Some((model.to_string(), params));
            match &self.script {
                Script::Reply(text) => Ok(InferenceOutcome::Completed {
                    text: text.clone(),
                    usage: None,
                }),
                Script::Unusable => Ok(InferenceOutcome::from_response(None, None)),
                Script::Fail => Err(InferenceError::Network("connection reset".into())),
            }
        }

        async fn embed(
            &self,
            model: &str,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, InferenceError> {
            if let Script::Fail = self.script {
                return Err(InferenceError::Network("connection reset".into()));
            }
            *self.last.lock().unwrap() = Some((
                model.to_string(),
                InferenceParams::text(texts.join("\n")),
            ));
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32; EMBED_DIMS])
                .collect())
        }
    }

    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.api_key = Some(TEST_KEY.into());
        // 22_500 tokens at 4 chars per token: a 90_000 character budget.
        config
            .models
            .table
            .push(ModelEntry::new("tiny-model", 22_500, "test"));
        config
    }

    pub fn state_with(config: AppConfig, backend: Arc<MockBackend>) -> SharedState {
        Arc::new(GatewayState::new(
            config,
            Arc::new(InMemoryStore::new()),
            backend,
        ))
    }

    pub fn router_with(backend: Arc<MockBackend>) -> Router {
        build_router(state_with(test_config(), backend))
    }
}

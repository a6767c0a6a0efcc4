//! Workers-AI style inference over HTTP.
//!
//! Posts the parameters as JSON to
//! `{base_url}/accounts/{account_id}/ai/run/{model}` and decodes the
//! `{success, result: {response, usage}, errors}` envelope.
//!
//! With a gateway id configured, requests go to
//! `{gateway_base_url}/{account_id}/{gateway_id}/workers-ai/{model}` instead,
//! and each call's [`CachePolicy`] travels as `cf-aig-*` headers.

use async_trait::async_trait;
use llmgate_config::InferenceConfig;
use llmgate_core::{
    CachePolicy, InferenceBackend, InferenceError, InferenceOutcome, InferenceParams, Usage,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SKIP_CACHE_HEADER: &str = "cf-aig-skip-cache";
const CACHE_TTL_HEADER: &str = "cf-aig-cache-ttl";

/// Remote model runner authenticated with a bearer token.
pub struct WorkersAiBackend {
    base_url: String,
    account_id: String,
    api_token: String,
    /// `(gateway_base_url, gateway_id)` when routed through the AI gateway.
    gateway: Option<(String, String)>,
    client: reqwest::Client,
}

impl WorkersAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
            gateway: None,
            client,
        })
    }

    /// Route calls through the caching AI gateway `gateway_id`.
    pub fn with_gateway(mut self, gateway_base_url: &str, gateway_id: impl Into<String>) -> Self {
        self.gateway = Some((
            gateway_base_url.trim_end_matches('/').to_string(),
            gateway_id.into(),
        ));
        self
    }

    /// Build from `[inference]`; both account id and token are required.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let account_id = config.account_id.as_deref().ok_or_else(|| {
            InferenceError::NotConfigured("inference.account_id is not set".into())
        })?;
        let api_token = config.api_token.as_deref().ok_or_else(|| {
            InferenceError::NotConfigured("inference.api_token is not set".into())
        })?;

        let backend = Self::new(
            &config.base_url,
            account_id,
            api_token,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(match config.gateway_id.as_deref() {
            Some(id) => backend.with_gateway(&config.gateway_base_url, id),
            None => backend,
        })
    }

    fn run_url(&self, model: &str) -> String {
        let model = model.trim_start_matches('/');
        match &self.gateway {
            Some((base, id)) => format!("{base}/{}/{id}/workers-ai/{model}", self.account_id),
            None => format!("{}/accounts/{}/ai/run/{model}", self.base_url, self.account_id),
        }
    }

    /// POST `body` to the model and return the successful response.
    async fn post<B: Serialize + ?Sized>(
        &self,
        model: &str,
        body: &B,
        cache: Option<CachePolicy>,
    ) -> Result<reqwest::Response, InferenceError> {
        let mut request = self
            .client
            .post(self.run_url(model))
            .bearer_auth(&self.api_token)
            .json(body);
        if let (Some(policy), Some(_)) = (cache, &self.gateway) {
            request = request
                .header(SKIP_CACHE_HEADER, policy.skip_cache.to_string())
                .header(CACHE_TTL_HEADER, policy.ttl_secs.to_string());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(e.to_string())
            } else {
                InferenceError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(InferenceError::AuthenticationFailed(
                "Invalid API token or insufficient permissions".into(),
            ));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Inference backend returned error");
            return Err(InferenceError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceBackend for WorkersAiBackend {
    fn name(&self) -> &str {
        "workers_ai"
    }

    async fn run(
        &self,
        model: &str,
        params: InferenceParams,
    ) -> Result<InferenceOutcome, InferenceError> {
        debug!(backend = "workers_ai", model = %model, prompt_chars = params.prompt_chars(), "Sending inference request");

        let response = self.post(model, &params, params.cache).await?;
        let status = response.status().as_u16();

        let envelope: RunEnvelope = response.json().await.map_err(|e| InferenceError::ApiError {
            status_code: status,
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(envelope.into_outcome())
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        debug!(backend = "workers_ai", model = %model, inputs = texts.len(), "Sending embedding request");

        let response = self.post(model, &EmbedRequest { text: texts }, None).await?;
        let envelope: EmbedEnvelope = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(format!("embedding body: {e}")))?;

        let data = envelope
            .result
            .map(|r| r.data)
            .filter(|_| envelope.success)
            .ok_or_else(|| InferenceError::InvalidResponse("embedding data missing".into()))?;
        if data.len() != texts.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        Ok(data)
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<RunMessage>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default, alias = "output_text")]
    response: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    result: Option<EmbedResult>,
}

#[derive(Debug, Deserialize)]
struct EmbedResult {
    data: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct RunMessage {
    message: String,
}

impl RunEnvelope {
    fn into_outcome(self) -> InferenceOutcome {
        if !self.success {
            let reason = if self.errors.is_empty() {
                "inference reported failure".to_string()
            } else {
                self.errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return InferenceOutcome::Unusable { reason };
        }

        match self.result {
            Some(result) => InferenceOutcome::from_response(result.response, result.usage),
            None => InferenceOutcome::Unusable {
                reason: "result missing from model output".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::PromptInput;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RUN_PATH: &str = "/accounts/acct-1/ai/run/@cf/openai/gpt-oss-120b";

    fn backend(server: &MockServer) -> WorkersAiBackend {
        WorkersAiBackend::new(server.uri(), "acct-1", "secret-token", Duration::from_secs(5)).unwrap()
    }

    fn params() -> InferenceParams {
        InferenceParams::responses(PromptInput::Text("What is Rust?".into()), "Be concise.")
    }

    #[tokio::test]
    async fn completed_response_with_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .and(header("Authorization", "Bearer secret-token"))
            .and(body_partial_json(serde_json::json!({
                "input": "What is Rust?",
                "instructions": "Be concise."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": {
                    "response": "A systems language.",
                    "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
                },
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = backend(&server)
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InferenceOutcome::Completed {
                text: "A systems language.".into(),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 4,
                    total_tokens: 14
                }),
            }
        );
    }

    #[tokio::test]
    async fn missing_response_is_unusable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "result": {}})),
            )
            .mount(&server)
            .await;

        let outcome = backend(&server)
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap();
        assert!(matches!(outcome, InferenceOutcome::Unusable { .. }));
    }

    #[tokio::test]
    async fn reported_failure_joins_error_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "result": null,
                "errors": [{"message": "model overloaded"}, {"message": "try later"}]
            })))
            .mount(&server)
            .await;

        let outcome = backend(&server)
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            InferenceOutcome::Unusable {
                reason: "model overloaded; try later".into()
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = backend(&server)
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("capacity exceeded"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap_err();
        match err {
            InferenceError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "capacity exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let backend =
            WorkersAiBackend::new(server.uri(), "acct-1", "t", Duration::from_millis(100)).unwrap();
        let err = backend
            .run("@cf/openai/gpt-oss-120b", params())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }

    #[tokio::test]
    async fn gateway_route_carries_cache_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acct-1/edge/workers-ai/@cf/openai/gpt-oss-120b"))
            .and(header("cf-aig-skip-cache", "true"))
            .and(header("cf-aig-cache-ttl", "300"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": {"response": "cached"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WorkersAiBackend::new("http://unused.invalid", "acct-1", "t", Duration::from_secs(5))
            .unwrap()
            .with_gateway(&server.uri(), "edge");
        let outcome = backend
            .run(
                "@cf/openai/gpt-oss-120b",
                params().with_cache(CachePolicy::new(true, 300)),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, InferenceOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn direct_route_ignores_cache_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": {"response": "fresh"}
            })))
            .mount(&server)
            .await;

        backend(&server)
            .run(
                "@cf/openai/gpt-oss-120b",
                params().with_cache(CachePolicy::new(false, 3600)),
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("cf-aig-cache-ttl").is_none());
    }

    #[tokio::test]
    async fn embed_returns_one_vector_per_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/ai/run/@cf/baai/bge-base-en-v1.5"))
            .and(body_json(serde_json::json!({"text": ["first", "second"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": {"shape": [2, 3], "data": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vectors = backend(&server)
            .embed(
                "@cf/baai/bge-base-en-v1.5",
                &["first".to_string(), "second".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn embed_without_data_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .mount(&server)
            .await;

        let err = backend(&server)
            .embed("@cf/baai/bge-base-en-v1.5", &["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidResponse(_)));
    }

    #[test]
    fn from_config_requires_credentials() {
        let config = InferenceConfig::default();
        assert!(matches!(
            WorkersAiBackend::from_config(&config),
            Err(InferenceError::NotConfigured(_))
        ));

        let config = InferenceConfig {
            account_id: Some("acct".into()),
            api_token: Some("tok".into()),
            ..InferenceConfig::default()
        };
        let backend = WorkersAiBackend::from_config(&config).unwrap();
        assert_eq!(
            backend.run_url("@cf/openai/gpt-oss-20b"),
            "https://api.cloudflare.com/client/v4/accounts/acct/ai/run/@cf/openai/gpt-oss-20b"
        );

        let config = InferenceConfig {
            gateway_id: Some("edge".into()),
            ..config
        };
        let backend = WorkersAiBackend::from_config(&config).unwrap();
        assert_eq!(
            backend.run_url("@cf/openai/gpt-oss-20b"),
            "https://gateway.ai.cloudflare.com/v1/acct/edge/workers-ai/@cf/openai/gpt-oss-20b"
        );
    }
}

//! HTTP error taxonomy.
//!
//! Every failure leaves the gateway as `{"error":{"message","type","code"}}`
//! with a status that identifies its class.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use llmgate_core::InferenceError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// A request failure, rendered by [`IntoResponse`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range request fields.
    #[error("{0}")]
    Validation(String),

    /// Missing or wrong bearer token.
    #[error("{0}")]
    Authentication(String),

    /// The gateway has no API key to check against.
    #[error("Server configuration error")]
    ServerMisconfigured,

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        window_secs: u64,
        reset_secs: u64,
    },

    /// The inference call failed or returned nothing usable.
    #[error("{0}")]
    Upstream(String),

    #[error("Endpoint not found")]
    NotFound,

    /// Anything else. The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    code: &'static str,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::ServerMisconfigured | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// `(type, code)` pair for the error body.
    pub fn kind(&self) -> (&'static str, &'static str) {
        match self {
            Self::Validation(_) => ("invalid_request_error", "invalid_request"),
            Self::Authentication(_) => ("authentication_error", "invalid_api_key"),
            Self::ServerMisconfigured | Self::Internal(_) => ("server_error", "internal_error"),
            Self::RateLimited { .. } => ("rate_limit_exceeded", "rate_limit_exceeded"),
            Self::Upstream(_) => ("upstream_error", "bad_gateway"),
            Self::NotFound => ("invalid_request_error", "not_found"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::RateLimited {
                limit, window_secs, ..
            } => format!(
                "Rate limit exceeded. Maximum {limit} requests per {} allowed.",
                describe_window(*window_secs)
            ),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

fn describe_window(secs: u64) -> String {
    match secs {
        3600 => "hour".to_string(),
        60 => "minute".to_string(),
        86_400 => "day".to_string(),
        1 => "second".to_string(),
        n => format!("{n} seconds"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (kind, code) = self.kind();
        if let Self::Internal(detail) = &self {
            error!(detail = %detail, "Request failed");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                message: self.public_message(),
                kind,
                code,
            },
        };
        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match self {
            Self::Authentication(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer realm=\"API\""),
                );
            }
            Self::RateLimited {
                limit, reset_secs, ..
            } => {
                headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
                headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_secs));
                headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs));
            }
            _ => {}
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        warn!(error = %err, "Inference call failed");
        match err {
            InferenceError::NotConfigured(_) => Self::ServerMisconfigured,
            InferenceError::Timeout(_) => Self::Upstream("AI model did not respond in time".into()),
            _ => Self::Upstream("Failed to generate response from AI model".into()),
        }
    }
}

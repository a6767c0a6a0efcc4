//! Per-request gate for protected routes.
//!
//! Authentication, then rate limiting, then the handler, then rate-limit
//! headers on whatever the handler returned. Failed authentication never
//! reaches the limiter, so it does not consume quota.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use llmgate_ratelimit::{ClientIdentifier, Decision, RateLimitStatus};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::SharedState;
use crate::auth;
use crate::error::{ApiError, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};

/// Derive the rate-limit identity of a request.
pub fn client_identifier(request: &Request) -> ClientIdentifier {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    ClientIdentifier::derive(
        header_str(headers, header::AUTHORIZATION.as_str()),
        header_str(headers, "cf-connecting-ip"),
        header_str(headers, "x-forwarded-for"),
        peer,
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Middleware applied to every `/api/v1` route.
pub async fn gatekeeper(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Err(err) = auth::authenticate(request.headers(), state.config.auth.api_key.as_deref()) {
        debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return err.into_response();
    }

    let id = client_identifier(&request);
    let limiter = &state.limiter;

    if let Decision::Rejected { reset_secs } = limiter.admit(&id, Utc::now()).await {
        warn!(client = %id.redacted(), reset_secs, "Rate limit exceeded");
        return ApiError::RateLimited {
            limit: limiter.limit(),
            window_secs: limiter.policy().window.as_secs(),
            reset_secs,
        }
        .into_response();
    }

    let mut response = next.run(request).await;

    let status = limiter.peek(&id, Utc::now()).await;
    annotate(&mut response, status);
    response
}

fn annotate(response: &mut Response, status: RateLimitStatus) {
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(status.reset_secs));
}

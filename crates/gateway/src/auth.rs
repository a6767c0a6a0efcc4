//! Bearer token authentication.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use tracing::error;

use crate::error::ApiError;

/// Check the `Authorization` header against the configured API key.
///
/// Header problems are reported before the server key is consulted, so a
/// misconfigured server still tells clients what is wrong with their
/// request.
pub fn authenticate(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Authentication("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| {
            ApiError::Authentication("Invalid authorization scheme. Use Bearer token".into())
        })?;

    let mut parts = value.split(' ');
    if parts.next() != Some("Bearer") {
        return Err(ApiError::Authentication(
            "Invalid authorization scheme. Use Bearer token".into(),
        ));
    }

    let token = parts.next().unwrap_or_default();
    if token.is_empty() {
        return Err(ApiError::Authentication("Missing API token".into()));
    }

    let Some(expected) = expected.filter(|k| !k.is_empty()) else {
        error!("No API key configured; set API_SECRET_KEY or [auth].api_key");
        return Err(ApiError::ServerMisconfigured);
    };

    if !digest_eq(token, expected) {
        return Err(ApiError::Authentication("Invalid API token".into()));
    }
    Ok(())
}

/// Compare two secrets through their SHA-256 digests.
fn digest_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Client identifier derivation.

use std::net::IpAddr;

/// Characters of the bearer token kept in the identifier.
const TOKEN_PREFIX_CHARS: usize = 8;

/// The rate-limit partition key for one client.
///
/// Derived deterministically from request metadata and never persisted
/// beyond the limiter's own store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifier(String);

impl ClientIdentifier {
    /// Derive an identifier, in priority order:
    /// 1. `token:` + first 8 characters of the bearer token
    /// 2. `ip:` + `CF-Connecting-IP`
    /// 3. `ip:` + first `X-Forwarded-For` entry
    /// 4. `ip:` + the peer socket address
    /// 5. `anonymous`
    pub fn derive(
        authorization: Option<&str>,
        connecting_ip: Option<&str>,
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
    ) -> Self {
        let token = authorization
            .and_then(|h| h.split(' ').nth(1))
            .filter(|t| !t.is_empty());
        if let Some(token) = token {
            let prefix: String = token.chars().take(TOKEN_PREFIX_CHARS).collect();
            return Self(format!("token:{prefix}"));
        }

        if let Some(ip) = connecting_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            return Self(format!("ip:{ip}"));
        }

        let forwarded = forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Self(format!("ip:{ip}"));
        }

        match peer {
            Some(ip) => Self(format!("ip:{ip}")),
            None => Self::anonymous(),
        }
    }

    pub fn anonymous() -> Self {
        Self("anonymous".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A shortened form safe to put in logs.
    pub fn redacted(&self) -> String {
        self.0.chars().take(20).collect()
    }
}

impl From<&str> for ClientIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

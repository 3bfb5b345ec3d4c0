//! Per-route request authentication.
//!
//! Each route carries exactly one [`AuthStrategy`]. [`authenticate`]
//! checks the inbound request against it and returns an [`AuthError`]
//! describing the failure; it never panics, so the dispatcher can record
//! the failure and move on to sibling routes.

use std::net::IpAddr;

use axum::http::{header, HeaderMap};
use serde::Serialize;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthStrategy {
    /// `x-api-key` header must equal `key`.
    #[serde(rename = "apikey")]
    ApiKey {
        #[serde(skip_serializing)]
        key: String,
    },
    /// `Origin` header must be one of `origins`.
    #[serde(rename = "whitelist")]
    Origin { origins: Vec<String> },
    /// Client IP must be one of `allowed_ips`.
    #[serde(rename = "ip_whitelist")]
    IpAllowList { allowed_ips: Vec<String> },
}

impl AuthStrategy {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "apikey",
            Self::Origin { .. } => "whitelist",
            Self::IpAllowList { .. } => "ip_whitelist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: missing x-api-key header")]
    MissingApiKey,

    #[error("authentication failed: invalid API key")]
    InvalidApiKey,

    #[error("authentication failed: missing Origin header")]
    MissingOrigin,

    #[error("authentication failed: origin '{0}' is not allowed")]
    OriginNotAllowed(String),

    #[error("authentication failed: IP '{0}' is not allowed")]
    IpNotAllowed(String),
}

/// What the authenticator needs to know about the inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestIdentity<'a> {
    pub headers: &'a HeaderMap,
    /// Resolved client IP, see [`client_ip`].
    pub client_ip: &'a str,
}

pub fn authenticate(request: &RequestIdentity<'_>, strategy: &AuthStrategy) -> Result<(), AuthError> {
    match strategy {
        AuthStrategy::ApiKey { key } => {
            let provided = header_str(request.headers, API_KEY_HEADER).ok_or(AuthError::MissingApiKey)?;
            if provided == key {
                Ok(())
            } else {
                Err(AuthError::InvalidApiKey)
            }
        }
        AuthStrategy::Origin { origins } => {
            let origin =
                header_str(request.headers, header::ORIGIN.as_str()).ok_or(AuthError::MissingOrigin)?;
            if origins.iter().any(|o| o == origin) {
                Ok(())
            } else {
                Err(AuthError::OriginNotAllowed(origin.to_string()))
            }
        }
        AuthStrategy::IpAllowList { allowed_ips } => {
            let ip = normalize_ip(request.client_ip);
            if allowed_ips.iter().any(|allowed| normalize_ip(allowed) == ip) {
                Ok(())
            } else {
                Err(AuthError::IpNotAllowed(ip.to_string()))
            }
        }
    }
}

/// First `X-Forwarded-For` entry if present, else the socket address.
#[must_use]
pub fn client_ip(headers: &HeaderMap, remote: Option<IpAddr>) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .or_else(|| remote.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `::ffff:10.0.0.1` and `10.0.0.1` are the same client.
fn normalize_ip(ip: &str) -> &str {
    let ip = ip.trim();
    ip.strip_prefix("::ffff:")
        .filter(|v4| v4.contains('.'))
        .unwrap_or(ip)
}

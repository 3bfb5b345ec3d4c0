//! Outbound delivery of a route's payload.
//!
//! [`Transport`] is the seam between the dispatcher and the network:
//! one POST, one bounded attempt, no retry. [`HyperTransport`] is the
//! production implementation on the shared pooled client. Status codes
//! below 500 count as delivered; [`ForwardError`] classifies the rest.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::server::HttpClient;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("no response from target: {0}")]
    NoResponse(String),

    #[error("target responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("{0}")]
    Other(String),
}

impl ForwardError {
    /// Stable error code recorded alongside the message.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Timeout(_) => "ECONNABORTED".to_string(),
            Self::NoResponse(_) => "NO_RESPONSE".to_string(),
            Self::HttpStatus(status) => format!("HTTP_{status}"),
            Self::Other(_) => "FORWARD_ERROR".to_string(),
        }
    }
}

/// Sends one JSON POST and reports the target's status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> Result<u16, ForwardError>;
}

/// Treat `< 500` as delivered: the target's own 4xx is its answer.
pub fn classify(status: u16) -> Result<u16, ForwardError> {
    if status >= 500 {
        Err(ForwardError::HttpStatus(status))
    } else {
        Ok(status)
    }
}

pub struct HyperTransport {
    client: HttpClient,
}

impl HyperTransport {
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> Result<u16, ForwardError> {
        let mut builder = hyper::Request::builder().method(Method::POST).uri(url);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| ForwardError::Other(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ForwardError::NoResponse(e.to_string()))?;
            let status = response.status().as_u16();
            // Drain so the pooled connection can be reused
            if let Err(e) = response.into_body().collect().await {
                tracing::debug!(target = %url, error = %e, "failed to drain target response body");
            }
            Ok::<_, ForwardError>(status)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ForwardError::Timeout(timeout))?
    }
}

//! Event ingestion: HTTP handlers and the routing core behind them.
//!
//! [`collect_handler`] serves `GET`/`POST /g/collect` (any other method
//! reaches the dispatcher's method gate and gets `405`),
//! [`dry_run_handler`] serves `POST /dry-run`. Both hand an
//! [`InboundRequest`](dispatch::InboundRequest) to the shared
//! [`Dispatcher`](dispatch::Dispatcher). Submodules hold route matching
//! ([`routing`]), authentication ([`auth`]), payload normalization
//! ([`normalize`]), outbound delivery ([`forward`]), and outcome
//! reporting ([`outcome`]).

pub mod auth;
pub mod dispatch;
pub mod forward;
pub mod normalize;
pub mod outcome;
pub mod routing;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::server::AppState;
use dispatch::InboundRequest;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// The caller's `x-correlation-id`, or a fresh UUID v4.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

fn inbound(
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
    addr: SocketAddr,
) -> InboundRequest {
    InboundRequest {
        correlation_id: correlation_id(&headers),
        method,
        headers,
        query: uri.query().map(String::from),
        body,
        remote_addr: Some(addr.ip()),
    }
}

fn with_correlation(mut response: Response, correlation_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

pub async fn collect_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = inbound(method, &uri, headers, body, addr);
    let correlation_id = request.correlation_id.clone();
    let response = state.dispatcher.dispatch(request).await;
    with_correlation(response.into_response(), &correlation_id)
}

pub async fn dry_run_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = inbound(Method::POST, &uri, headers, body, addr);
    let response = state.dispatcher.dry_run(&request).await;
    with_correlation(response.into_response(), &request.correlation_id)
}

pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "status": "error", "error": "Not Found" })),
    )
}

/// Known path, wrong method. The router adds the `Allow` header.
pub async fn method_not_allowed_handler() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "status": "error", "error": "Method Not Allowed" })),
    )
}

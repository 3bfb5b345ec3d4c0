//! Gateway assembly, shared application state, and graceful shutdown.
//!
//! [`assemble`] turns a loaded route config into the [`AppState`] that
//! every handler shares: route table, preloaded template store,
//! dispatcher, and debug log. [`build_router`] mounts the handlers,
//! [`build_http_client`] creates the pooled outbound client, and
//! [`shutdown_signal`] waits for SIGTERM / Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header;
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::debug::{debug_handler, DebugLog};
use crate::error::GatewayError;
use crate::gateway::dispatch::{DispatchSettings, Dispatcher};
use crate::gateway::forward::Transport;
use crate::gateway::routing::RouteTable;
use crate::gateway::{
    collect_handler, dry_run_handler, method_not_allowed_handler, not_found_handler,
};
use crate::health::health_handler;
use crate::template::TemplateStore;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

/// What `/health` reports about the loaded route config.
#[derive(Debug)]
pub struct ConfigInfo {
    pub source: String,
    pub version: ConfigVersion,
    pub loaded_at: Instant,
    pub routes: usize,
    pub fallback: bool,
    pub templates: usize,
}

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub debug_log: Arc<DebugLog>,
    pub config: ConfigInfo,
    pub start_time: Instant,
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub templates_dir: PathBuf,
    /// Re-read templates on every use.
    pub test_mode: bool,
    pub debug_entries: usize,
    pub settings: DispatchSettings,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            test_mode: false,
            debug_entries: crate::debug::DEFAULT_DEBUG_ENTRIES,
            settings: DispatchSettings::default(),
        }
    }
}

/// Validate `config`, preload its templates, and wire the dispatcher.
///
/// Fails on the first invalid route or unreadable template, before
/// anything is served.
pub fn assemble(
    config: &Config,
    version: ConfigVersion,
    source: String,
    transport: Arc<dyn Transport>,
    options: &GatewayOptions,
) -> Result<Arc<AppState>, GatewayError> {
    let table = RouteTable::from_config(config)?;

    let templates = TemplateStore::new(&options.templates_dir).bypass_cache(options.test_mode);
    let template_count = templates.preload(config.template_paths())?;

    let debug_log = Arc::new(DebugLog::new(options.debug_entries));
    let info = ConfigInfo {
        source,
        version,
        loaded_at: Instant::now(),
        routes: table.len(),
        fallback: table.fallback().is_some(),
        templates: template_count,
    };

    let dispatcher = Dispatcher::new(
        table,
        Arc::new(templates),
        transport,
        debug_log.clone(),
        options.settings,
    );

    Ok(Arc::new(AppState {
        dispatcher,
        debug_log,
        config: info,
        start_time: Instant::now(),
    }))
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // Several rustls providers may be compiled in; pin `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .route("/g/collect", any(collect_handler))
        .route("/dry-run", post(dry_run_handler))
        .route("/debug", get(debug_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .layer(map_response(json_error_bodies))
        .with_state(state)
}

/// Rewrite plain-text error responses from layers and extractors, such as
/// the body limit's `413`, into the `{"status":"error"}` shape.
async fn json_error_bodies(response: Response) -> Response {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    if is_json || !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let message = status.canonical_reason().unwrap_or("Error");
    let mut rewritten = (status, Json(serde_json::json!({ "status": "error", "error": message })))
        .into_response();
    if let Some(allow) = response.headers().get(header::ALLOW) {
        rewritten.headers_mut().insert(header::ALLOW, allow.clone());
    }
    rewritten
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

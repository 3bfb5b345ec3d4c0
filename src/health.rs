//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] with the gateway version, uptime, the
//! loaded route config's source and hash, and cumulative request stats.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::debug::StatsSnapshot;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsSnapshot,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub routes: usize,
    pub fallback: bool,
    pub templates: usize,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let info = &state.config;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: info.source.clone(),
            version: info.version.short().to_string(),
            loaded_ago_seconds: info.loaded_at.elapsed().as_secs(),
            routes: info.routes,
            fallback: info.fallback,
            templates: info.templates,
        },
        stats: state.debug_log.stats().snapshot(),
    })
}

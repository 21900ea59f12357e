//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Sample ingestion (`POST /upload`)
//! - Workstation restart notice (`POST /workstation_restarted`)
//! - Health and per-camera status

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub cameras_total: usize,
    pub cameras_online: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        cameras_total: state.status.snapshot().len(),
        cameras_online: state.status.online_count(),
    };

    Json(response)
}

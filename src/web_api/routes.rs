//! API Routes

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

use crate::camera_status_tracker::ConnectionState;
use crate::error::{Error, Result};
use crate::models::{ActuationMarker, ApiResponse, CameraId, SampleEnvelope};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Ingestion
        .route("/upload", post(upload_sample))
        .route("/workstation_restarted", post(workstation_restarted))
        // Health & Status
        .route("/api/health", get(super::health_check))
        .route("/api/cameras", get(list_cameras))
        .with_state(state)
}

// ========================================
// Ingestion
// ========================================

/// Fields of an upload form
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Option<Vec<u8>>,
    camera_id: Option<String>,
    focus_minutes: Option<String>,
    captured_at: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::Validation(format!("malformed upload: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| Error::Validation(format!("unreadable file part: {e}")))?;
                    form.bytes = Some(bytes.to_vec());
                }
                "camera_id" | "focus_minutes" | "captured_at" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| Error::Validation(format!("unreadable {name}: {e}")))?;
                    let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());
                    match name.as_str() {
                        "camera_id" => form.camera_id = text,
                        "focus_minutes" => form.focus_minutes = text,
                        _ => form.captured_at = text,
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn file(&self) -> Result<(&str, &[u8])> {
        let bytes = self
            .bytes
            .as_deref()
            .ok_or_else(|| Error::Validation("no file part".to_string()))?;
        let name = self
            .file_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Validation("file part has no file name".to_string()))?;
        Ok((name, bytes))
    }

    /// Envelope from the form metadata; without a camera id the legacy
    /// filename convention applies
    fn envelope(&self, path: &Path, tz: Tz, now: DateTime<Utc>) -> Result<SampleEnvelope> {
        let Some(camera) = self.camera_id.as_deref() else {
            return SampleEnvelope::from_legacy_path(path, &tz, now);
        };
        let camera = CameraId::parse(camera)?;

        let captured_at = match self.captured_at.as_deref() {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| Error::Validation(format!("invalid captured_at {raw}: {e}")))?
                .with_timezone(&Utc),
            None => now,
        };

        let actuation = match self.focus_minutes.as_deref() {
            Some(raw) => {
                let hold_minutes = raw
                    .parse::<u32>()
                    .map_err(|e| Error::Validation(format!("invalid focus_minutes {raw}: {e}")))?;
                Some(ActuationMarker { hold_minutes })
            }
            None => None,
        };

        Ok(SampleEnvelope::new(camera, path.to_path_buf(), captured_at).with_actuation(actuation))
    }
}

async fn upload_sample(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = UploadForm::read(multipart).await?;
    let (file_name, bytes) = form.file()?;

    // Validate before anything lands in the inbox
    let envelope = form.envelope(
        Path::new(file_name),
        state.config_store.timezone(),
        Utc::now(),
    )?;
    let path = state.inbox.store(file_name, bytes).await?;
    let accepted = state.dispatcher.submit(SampleEnvelope {
        path: path.clone(),
        ..envelope
    });

    Ok(Json(ApiResponse::success(json!({
        "path": path.display().to_string(),
        "accepted": accepted,
    }))))
}

async fn workstation_restarted(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let purged = state.inbox.purge().await?;
    let dropped = state.dispatcher.clear_pending();

    tracing::info!(purged, dropped, "Workstation restarted, inbox reset");

    Ok(Json(ApiResponse::success(json!({
        "purged": purged,
        "dropped": dropped,
    }))))
}

// ========================================
// Status
// ========================================

#[derive(Debug, Serialize)]
struct CameraStatusView {
    camera_id: CameraId,
    location: String,
    state: ConnectionState,
    pending_samples: usize,
    zoom_engaged: bool,
    zoom_blocked: bool,
}

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let aggregator = state.dispatcher.aggregator();
    let cameras: Vec<CameraStatusView> = state
        .config_store
        .cameras()
        .map(|camera| CameraStatusView {
            camera_id: camera.ip.clone(),
            location: camera.location.clone(),
            state: state
                .status
                .get(&camera.ip)
                .unwrap_or(ConnectionState::Disconnected),
            pending_samples: aggregator.pending_len(&camera.ip),
            zoom_engaged: state.cooldown.is_engaged(&camera.ip),
            zoom_blocked: state.cooldown.is_blocked(&camera.ip),
        })
        .collect();

    Json(ApiResponse::success(cameras))
}

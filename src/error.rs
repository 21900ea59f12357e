//! Error handling for smoke_hub

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error (fatal at startup)
    #[error("Config error: {0}")]
    Config(String),

    /// Video transport failure (open or read)
    #[error("Transport error for camera {camera_id}: {message}")]
    Transport { camera_id: String, message: String },

    /// Detector call failed for one sample
    #[error("Detection error: {0}")]
    Detection(String),

    /// Artifact upload failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// No upload destination for a camera
    #[error("No destination for camera {0}")]
    Routing(String),

    /// Camera control command failed
    #[error("Actuation error for camera {camera_id}: {message}")]
    Actuation { camera_id: String, message: String },

    /// Notification channel failure
    #[error("Notify error: {0}")]
    Notify(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transport(camera_id: impl ToString, message: impl ToString) -> Self {
        Error::Transport {
            camera_id: camera_id.to_string(),
            message: message.to_string(),
        }
    }

    pub fn actuation(camera_id: impl ToString, message: impl ToString) -> Self {
        Error::Actuation {
            camera_id: camera_id.to_string(),
            message: message.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Transport { .. } => (
                StatusCode::BAD_GATEWAY,
                "TRANSPORT_ERROR",
                self.to_string(),
            ),
            Error::Detection(msg) => (StatusCode::BAD_GATEWAY, "DETECTION_ERROR", msg.clone()),
            Error::Upload(msg) => (StatusCode::BAD_GATEWAY, "UPLOAD_ERROR", msg.clone()),
            Error::Routing(_) => (StatusCode::NOT_FOUND, "ROUTING_ERROR", self.to_string()),
            Error::Actuation { .. } => (
                StatusCode::BAD_GATEWAY,
                "ACTUATION_ERROR",
                self.to_string(),
            ),
            Error::Notify(msg) => (StatusCode::BAD_GATEWAY, "NOTIFY_ERROR", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Image(e) => (StatusCode::BAD_REQUEST, "IMAGE_ERROR", e.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

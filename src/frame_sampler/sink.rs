//! Sample sinks

use crate::error::{Error, Result};
use crate::models::{ActuationMarker, CameraId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Encoded sample leaving a camera
#[derive(Debug, Clone)]
pub struct OutboundSample {
    pub camera: CameraId,
    /// Legacy file name, also carries camera and marker
    pub file_name: String,
    pub jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub actuation: Option<ActuationMarker>,
}

/// Where sampled frames go
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn deliver(&self, sample: OutboundSample) -> Result<()>;
}

/// Posts samples to a remote `/upload` endpoint
pub struct HttpSampleSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSampleSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SampleSink for HttpSampleSink {
    async fn deliver(&self, sample: OutboundSample) -> Result<()> {
        let part = Part::bytes(sample.jpeg)
            .file_name(sample.file_name.clone())
            .mime_str("image/jpeg")
            .map_err(|e| Error::Upload(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("camera_id", sample.camera.to_string())
            .text("captured_at", sample.captured_at.to_rfc3339());
        if let Some(marker) = sample.actuation {
            form = form.text("focus_minutes", marker.hold_minutes.to_string());
        }

        let response = self.client.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(Error::Upload(format!(
                "{} rejected {}: {}",
                self.url,
                sample.file_name,
                response.status()
            )));
        }

        tracing::debug!(
            camera_id = %sample.camera,
            file = %sample.file_name,
            "Sample uploaded"
        );
        Ok(())
    }
}

//! Artifact upload to workstations

use crate::error::{Error, Result};
use crate::models::CameraId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;
use std::time::Duration;

/// A file produced for one group
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Ledger key, the file name
    pub id: String,
    pub camera: CameraId,
    pub path: PathBuf,
    /// Number of crops in the batch; set for crops only
    pub total_cropped: Option<usize>,
}

#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, endpoint: &str, artifact: &Artifact) -> Result<()>;
}

/// Multipart `file` POST, `total_cropped` as a text field for crops
pub struct HttpArtifactUploader {
    client: reqwest::Client,
}

impl HttpArtifactUploader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
        })
    }
}

#[async_trait]
impl ArtifactUploader for HttpArtifactUploader {
    async fn upload(&self, endpoint: &str, artifact: &Artifact) -> Result<()> {
        let bytes = tokio::fs::read(&artifact.path).await?;

        let mut form = Form::new().part(
            "file",
            Part::bytes(bytes)
                .file_name(artifact.id.clone())
                .mime_str("image/jpeg")?,
        );
        if let Some(total) = artifact.total_cropped {
            form = form.text("total_cropped", total.to_string());
        }

        let resp = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("{}: {}", artifact.id, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upload(format!(
                "{}: workstation answered {} - {}",
                artifact.id, status, body
            )));
        }
        Ok(())
    }
}

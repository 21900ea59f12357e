//! HTTP detector client
//!
//! `POST <url>` with multipart field `image`, answered by
//! `{"bboxes": [[x1, y1, x2, y2], ...], "scores": [...]}`.

use super::Detector;
use crate::error::{Error, Result};
use crate::models::BoundingBox;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Detector HTTP client
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    bboxes: Vec<[f32; 4]>,
    #[serde(default)]
    scores: Vec<f32>,
}

impl DetectResponse {
    fn into_boxes(self) -> Result<Vec<BoundingBox>> {
        if self.bboxes.len() != self.scores.len() {
            return Err(Error::Detection(format!(
                "detector returned {} boxes but {} scores",
                self.bboxes.len(),
                self.scores.len()
            )));
        }

        Ok(self
            .bboxes
            .into_iter()
            .zip(self.scores)
            .map(|([x1, y1, x2, y2], score)| BoundingBox {
                x1,
                y1,
                x2,
                y2,
                score,
            })
            .collect())
    }
}

impl HttpDetector {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<BoundingBox>> {
        let form = Form::new().part(
            "image",
            Part::bytes(jpeg.to_vec())
                .file_name("sample.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detection(format!("detector unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detection(format!(
                "detector failed: {} - {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("bad detector response: {e}")))?;
        parsed.into_boxes()
    }
}

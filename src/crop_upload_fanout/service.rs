//! Publishing of a group's best frame

use super::ledger::UploadLedger;
use super::render::{render, RenderedFrame};
use super::uploader::{Artifact, ArtifactUploader};
use crate::config_store::ConfigStore;
use crate::detection::GroupResult;
use crate::error::{Error, Result};
use crate::notifier::Notifier;
use crate::ptz_controller::{ActuationCooldown, TriggerOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What one publish call did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishReport {
    pub crops_started: usize,
    pub crops_uploaded: usize,
    pub summary_uploaded: bool,
    pub actuation: Option<TriggerOutcome>,
    pub alerted: bool,
}

pub struct CropUploadFanout {
    config: Arc<ConfigStore>,
    uploader: Arc<dyn ArtifactUploader>,
    ledger: Arc<UploadLedger>,
    out_dir: PathBuf,
    actuation: Option<Arc<ActuationCooldown>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CropUploadFanout {
    pub fn new(
        config: Arc<ConfigStore>,
        uploader: Arc<dyn ArtifactUploader>,
        ledger: Arc<UploadLedger>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            uploader,
            ledger,
            out_dir: out_dir.into(),
            actuation: None,
            notifier: None,
        }
    }

    pub fn with_actuation(mut self, actuation: Arc<ActuationCooldown>) -> Self {
        self.actuation = Some(actuation);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn ledger(&self) -> &Arc<UploadLedger> {
        &self.ledger
    }

    /// `{ip_}_{YYYYmmdd_HHMMSS}` in the fleet timezone
    pub fn base_name(&self, result: &GroupResult, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}",
            result.camera.file_stem(),
            now.with_timezone(&self.config.timezone())
                .format("%Y%m%d_%H%M%S")
        )
    }

    pub async fn publish(&self, result: &GroupResult) -> Result<PublishReport> {
        self.publish_at(result, Utc::now()).await
    }

    /// Crops, barrier, summary, then actuation and alert.
    ///
    /// An unroutable camera abandons the whole publish.
    pub async fn publish_at(&self, result: &GroupResult, now: DateTime<Utc>) -> Result<PublishReport> {
        let camera = &result.camera;
        let endpoint = match self.config.resolve_destination(camera) {
            Ok(url) => url.to_string(),
            Err(e) => {
                error!(
                    camera_id = %camera,
                    stage = "crop_publishing",
                    error = %e,
                    "No workstation for camera, publish abandoned"
                );
                return Err(e);
            }
        };

        let base = self.base_name(result, now);
        let frame = result.frame.clone();
        let boxes = result.best.valid_boxes.clone();
        let rendered = tokio::task::spawn_blocking(move || render(&frame, &boxes))
            .await
            .map_err(|e| Error::Internal(format!("render task failed: {e}")))??;

        let mut report = PublishReport::default();
        let (started, uploaded) = self.fan_out_crops(result, &base, &endpoint, &rendered).await?;
        report.crops_started = started;
        report.crops_uploaded = uploaded;

        let summary_path = self.save_summary(result, &base, &rendered.annotated).await?;
        report.summary_uploaded = self.upload_summary(result, &summary_path, &endpoint).await;

        if let (Some(marker), Some(cooldown)) = (result.best.source.actuation, &self.actuation) {
            if let Some(bbox) = result.best.valid_boxes.first() {
                report.actuation = Some(cooldown.trigger(camera, bbox, marker.hold()));
            }
        }

        report.alerted = self.alert(result, now, rendered.annotated);

        info!(
            camera_id = %camera,
            stage = "done",
            group = result.group_sequence,
            crops = report.crops_uploaded,
            summary = report.summary_uploaded,
            "Group published"
        );
        Ok(report)
    }

    /// Start one upload task per unclaimed crop and wait for all of them
    async fn fan_out_crops(
        &self,
        result: &GroupResult,
        base: &str,
        endpoint: &str,
        rendered: &RenderedFrame,
    ) -> Result<(usize, usize)> {
        tokio::fs::create_dir_all(&self.out_dir).await?;
        let total = result.best.valid_boxes.len();
        let mut handles = Vec::new();

        for (idx, crop) in rendered.crops.iter().enumerate() {
            let Some(bytes) = crop else {
                warn!(camera_id = %result.camera, index = idx + 1, "Box outside frame, crop skipped");
                continue;
            };

            let id = format!("{base}_cropped_{}.jpg", idx + 1);
            if !self.ledger.claim(&id) {
                info!(camera_id = %result.camera, artifact = %id, "Already uploaded, skipped");
                continue;
            }

            let path = self.out_dir.join(&id);
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                self.ledger.release(&id);
                warn!(camera_id = %result.camera, artifact = %id, error = %e, "Crop write failed");
                continue;
            }

            let artifact = Artifact {
                id,
                camera: result.camera.clone(),
                path,
                total_cropped: Some(total),
            };
            let uploader = self.uploader.clone();
            let ledger = self.ledger.clone();
            let endpoint = endpoint.to_string();
            handles.push(tokio::spawn(async move {
                upload_crop(uploader.as_ref(), &ledger, &endpoint, artifact).await
            }));
        }

        let started = handles.len();
        let uploaded = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        Ok((started, uploaded))
    }

    async fn save_summary(&self, result: &GroupResult, base: &str, annotated: &[u8]) -> Result<PathBuf> {
        let dir = self.out_dir.join(result.camera.file_stem());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{base}_with_boxes.jpg"));
        tokio::fs::write(&path, annotated).await?;
        Ok(path)
    }

    async fn upload_summary(&self, result: &GroupResult, path: &Path, endpoint: &str) -> bool {
        let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return false;
        };
        if !self.ledger.claim(&id) {
            info!(camera_id = %result.camera, artifact = %id, "Summary already uploaded, skipped");
            return false;
        }

        let artifact = Artifact {
            id,
            camera: result.camera.clone(),
            path: path.to_path_buf(),
            total_cropped: None,
        };
        match self.uploader.upload(endpoint, &artifact).await {
            Ok(()) => {
                self.ledger.mark_uploaded(&artifact.id);
                info!(camera_id = %result.camera, artifact = %artifact.id, "Summary uploaded");
                true
            }
            Err(e) => {
                self.ledger.release(&artifact.id);
                warn!(
                    camera_id = %result.camera,
                    stage = "crop_publishing",
                    artifact = %artifact.id,
                    error = %e,
                    "Summary upload failed"
                );
                false
            }
        }
    }

    /// Detection alert with the annotated frame; returns whether one was sent
    fn alert(&self, result: &GroupResult, now: DateTime<Utc>, annotated: Vec<u8>) -> bool {
        let Some(notifier) = self.notifier.clone() else {
            return false;
        };
        let Some(camera) = self.config.camera(&result.camera) else {
            return false;
        };
        let switches = &camera.function_switches;
        if !switches.enable_smoke_notify {
            return false;
        }

        let local = now.with_timezone(&self.config.timezone());
        if !switches.enable_night_detection && self.config.detection().night_window.contains(local.time()) {
            info!(camera_id = %result.camera, "Night alerts disabled for camera, alert skipped");
            return false;
        }

        let location = if camera.location.is_empty() {
            "unknown location"
        } else {
            camera.location.as_str()
        };
        let message = format!(
            "Smoke detected\nTime: {}\nLocation: {}",
            local.format("%Y-%m-%d %H:%M"),
            location
        );
        let camera_id = result.camera.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&message, Some(&annotated)).await {
                warn!(camera_id = %camera_id, error = %e, "Detection alert failed");
            }
        });
        true
    }
}

/// Upload one crop, settle its ledger entry and delete it once delivered
async fn upload_crop(
    uploader: &dyn ArtifactUploader,
    ledger: &UploadLedger,
    endpoint: &str,
    artifact: Artifact,
) -> bool {
    match uploader.upload(endpoint, &artifact).await {
        Ok(()) => {
            ledger.mark_uploaded(&artifact.id);
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                warn!(artifact = %artifact.id, error = %e, "Uploaded crop not removed");
            }
            info!(camera_id = %artifact.camera, artifact = %artifact.id, "Crop uploaded");
            true
        }
        Err(e) => {
            ledger.release(&artifact.id);
            warn!(
                camera_id = %artifact.camera,
                stage = "crop_publishing",
                artifact = %artifact.id,
                error = %e,
                "Crop upload failed"
            );
            false
        }
    }
}

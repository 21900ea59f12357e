//! Sampling tasks

use super::{FrameSlot, OutboundSample, SampleSink};
use crate::config_store::{CameraConfig, JitterRange, SupervisorPolicy};
use crate::error::Result;
use crate::models::{ActuationMarker, SampleEnvelope};
use crate::snapshot_service::{reencode_jpeg, SnapshotService};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Sampling timing
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub snapshot_interval: Duration,
    pub upload_base: Duration,
    pub upload_jitter: JitterRange,
    pub initial_upload_delay: Duration,
    pub jpeg_quality: u8,
}

impl From<&SupervisorPolicy> for SamplerSettings {
    fn from(p: &SupervisorPolicy) -> Self {
        Self {
            snapshot_interval: Duration::from_secs(p.snapshot_interval_secs),
            upload_base: Duration::from_secs(p.upload_base_secs),
            upload_jitter: p.upload_jitter,
            initial_upload_delay: Duration::from_secs(p.initial_upload_delay_secs),
            jpeg_quality: p.jpeg_quality,
        }
    }
}

impl SamplerSettings {
    /// Base plus a fresh random jitter
    pub fn next_upload_delay(&self) -> Duration {
        self.upload_base + self.jitter()
    }

    /// Wait before the first upload after connecting
    pub fn first_upload_delay(&self) -> Duration {
        self.initial_upload_delay + self.next_upload_delay()
    }

    fn jitter(&self) -> Duration {
        let JitterRange { min_secs, max_secs } = self.upload_jitter;
        Duration::from_secs(rand::thread_rng().gen_range(min_secs..=max_secs.max(min_secs)))
    }
}

/// Sampler of one camera
pub struct FrameSampler {
    camera: Arc<CameraConfig>,
    slot: FrameSlot,
    snapshots: Arc<SnapshotService>,
    sink: Arc<dyn SampleSink>,
    settings: SamplerSettings,
}

impl FrameSampler {
    pub fn new(
        camera: Arc<CameraConfig>,
        snapshots: Arc<SnapshotService>,
        sink: Arc<dyn SampleSink>,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            camera,
            slot: FrameSlot::new(),
            snapshots,
            sink,
            settings,
        }
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Start snapshot and upload tasks; they stop when the handle drops
    pub fn start(self: &Arc<Self>) -> SamplerTasks {
        let snapshot = tokio::spawn(self.clone().snapshot_loop());
        let upload = tokio::spawn(self.clone().upload_loop());
        SamplerTasks {
            handles: vec![snapshot, upload],
        }
    }

    async fn snapshot_loop(self: Arc<Self>) {
        let period = self.settings.snapshot_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.snapshot_once().await {
                tracing::warn!(
                    camera_id = %self.camera.ip,
                    stage = "snapshot",
                    error = %e,
                    "Snapshot failed"
                );
            }
        }
    }

    async fn upload_loop(self: Arc<Self>) {
        tokio::time::sleep(self.settings.first_upload_delay()).await;

        loop {
            match self.prepare_upload().await {
                Ok(Some(sample)) => {
                    let sink = self.sink.clone();
                    tokio::spawn(async move {
                        let camera = sample.camera.clone();
                        let file = sample.file_name.clone();
                        if let Err(e) = sink.deliver(sample).await {
                            tracing::warn!(
                                camera_id = %camera,
                                stage = "upload",
                                file = %file,
                                error = %e,
                                "Sample delivery failed"
                            );
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    camera_id = %self.camera.ip,
                    stage = "upload",
                    error = %e,
                    "Sample encoding failed"
                ),
            }

            tokio::time::sleep(self.settings.next_upload_delay()).await;
        }
    }

    /// Archive the current frame; `None` if there is none
    pub async fn snapshot_once(&self) -> Result<Option<PathBuf>> {
        let Some(frame) = self.slot.latest() else {
            return Ok(None);
        };
        self.snapshots.save(&self.camera.ip, &frame).await.map(Some)
    }

    /// Encode the current frame for upload; `None` if there is none
    pub async fn prepare_upload(&self) -> Result<Option<OutboundSample>> {
        let Some(frame) = self.slot.latest() else {
            return Ok(None);
        };

        let jpeg = reencode_jpeg(frame.jpeg.clone(), self.settings.jpeg_quality).await?;
        let actuation = self
            .camera
            .focus_minutes()
            .map(|hold_minutes| ActuationMarker { hold_minutes });
        let local = frame
            .captured_at
            .with_timezone(&self.snapshots.timezone())
            .naive_local();

        Ok(Some(OutboundSample {
            camera: self.camera.ip.clone(),
            file_name: SampleEnvelope::legacy_file_name(&self.camera.ip, &local, actuation),
            jpeg,
            captured_at: frame.captured_at,
            actuation,
        }))
    }
}

/// Running sampler tasks, aborted on drop
pub struct SamplerTasks {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for SamplerTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

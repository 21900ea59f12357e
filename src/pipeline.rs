//! DetectionPipeline - what a group worker does with a flushed group
//!
//! ## Responsibilities
//!
//! - Run best-frame selection over the group
//! - Publish the winner (crops, summary, actuation, alert)
//! - Delete the group's sample files afterwards
//!
//! A group moves one way through
//! `Collecting -> Flushed -> Detecting -> (NoDetection | BestFrameFound)
//! -> CropPublishing -> Done` and is never reused.

use crate::crop_upload_fanout::CropUploadFanout;
use crate::detection::BestFrameSelector;
use crate::group_aggregator::{FlushedGroup, GroupProcessor};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStage {
    Collecting,
    Flushed,
    Detecting,
    NoDetection,
    BestFrameFound,
    CropPublishing,
    Done,
}

impl GroupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Flushed => "flushed",
            Self::Detecting => "detecting",
            Self::NoDetection => "no_detection",
            Self::BestFrameFound => "best_frame_found",
            Self::CropPublishing => "crop_publishing",
            Self::Done => "done",
        }
    }

    pub fn can_advance_to(&self, next: GroupStage) -> bool {
        use GroupStage::*;
        matches!(
            (self, next),
            (Collecting, Flushed)
                | (Flushed, Detecting)
                | (Detecting, NoDetection)
                | (Detecting, BestFrameFound)
                | (BestFrameFound, CropPublishing)
                | (CropPublishing, Done)
                | (NoDetection, Done)
        )
    }
}

impl fmt::Display for GroupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage history of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTrace(Vec<GroupStage>);

impl StageTrace {
    fn flushed() -> Self {
        Self(vec![GroupStage::Collecting, GroupStage::Flushed])
    }

    fn advance(&mut self, next: GroupStage) {
        let current = self.current();
        debug_assert!(current.can_advance_to(next), "{current} -> {next}");
        self.0.push(next);
    }

    pub fn current(&self) -> GroupStage {
        self.0.last().copied().unwrap_or(GroupStage::Collecting)
    }

    pub fn stages(&self) -> &[GroupStage] {
        &self.0
    }
}

pub struct DetectionPipeline {
    selector: Arc<BestFrameSelector>,
    fanout: Arc<CropUploadFanout>,
    remove_members: bool,
}

impl DetectionPipeline {
    pub fn new(selector: Arc<BestFrameSelector>, fanout: Arc<CropUploadFanout>) -> Self {
        Self {
            selector,
            fanout,
            remove_members: true,
        }
    }

    /// Keep sample files after processing
    pub fn keep_members(mut self) -> Self {
        self.remove_members = false;
        self
    }

    pub async fn run(&self, group: &FlushedGroup) -> StageTrace {
        let mut trace = StageTrace::flushed();

        trace.advance(GroupStage::Detecting);
        info!(
            camera_id = %group.camera,
            stage = %trace.current(),
            group = group.sequence,
            members = group.members.len(),
            "Detecting group"
        );

        match self.selector.select(group).await {
            None => trace.advance(GroupStage::NoDetection),
            Some(result) => {
                trace.advance(GroupStage::BestFrameFound);
                trace.advance(GroupStage::CropPublishing);
                if let Err(e) = self.fanout.publish(&result).await {
                    error!(
                        camera_id = %group.camera,
                        stage = %trace.current(),
                        group = group.sequence,
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }

        if self.remove_members {
            for member in &group.members {
                if let Err(e) = tokio::fs::remove_file(&member.path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %member.path.display(), error = %e, "Sample file not removed");
                    }
                }
            }
        }

        trace.advance(GroupStage::Done);
        trace
    }
}

#[async_trait]
impl GroupProcessor for DetectionPipeline {
    async fn process(&self, group: FlushedGroup) {
        self.run(&group).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::{ConfigStore, DetectionPolicy, FleetConfig};
    use crate::crop_upload_fanout::{testing::RecordingUploader, UploadLedger};
    use crate::detection::{testing::ScriptedDetector, ThresholdPolicy};
    use crate::group_aggregator::FlushTrigger;
    use crate::models::{CameraId, SampleEnvelope};
    use crate::snapshot_service::testing::{scratch_dir, solid_jpeg};
    use chrono::Utc;
    use serde_json::json;
    use std::path::Path;

    fn pipeline(dir: &Path, detector: Arc<ScriptedDetector>, uploader: Arc<RecordingUploader>) -> DetectionPipeline {
        let fleet: FleetConfig = serde_json::from_value(json!({
            "cameras": [{ "ip": "10.0.0.5" }],
            "workstation_camera_mapping": { "ws1": ["10.0.0.5"] },
            "workstation_url_mapping": { "ws1": "http://ws1/upload" }
        }))
        .unwrap();
        let store = Arc::new(ConfigStore::from_fleet(fleet).unwrap());
        let selector = BestFrameSelector::new(
            detector,
            ThresholdPolicy {
                // Never night, so the test does not depend on the clock
                night_window: crate::models::DailyWindow::hours(0, 0),
                ..ThresholdPolicy::from_detection(&DetectionPolicy::default(), store.timezone())
            },
        );
        let fanout = CropUploadFanout::new(store, uploader, Arc::new(UploadLedger::new()), dir.join("out"));
        DetectionPipeline::new(Arc::new(selector), Arc::new(fanout))
    }

    fn group(dir: &Path, frames: &[Vec<u8>]) -> FlushedGroup {
        std::fs::create_dir_all(dir).unwrap();
        let camera = CameraId::parse("10.0.0.5").unwrap();
        let members = frames
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = dir.join(format!("m{i}.jpg"));
                std::fs::write(&path, bytes).unwrap();
                SampleEnvelope::new(camera.clone(), path, Utc::now())
            })
            .collect();
        FlushedGroup {
            camera,
            sequence: 0,
            trigger: FlushTrigger::Size,
            members,
            flushed_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_transitions_are_one_way() {
        assert!(GroupStage::Detecting.can_advance_to(GroupStage::NoDetection));
        assert!(GroupStage::NoDetection.can_advance_to(GroupStage::Done));
        assert!(!GroupStage::NoDetection.can_advance_to(GroupStage::CropPublishing));
        assert!(!GroupStage::Done.can_advance_to(GroupStage::Collecting));
    }

    #[tokio::test]
    async fn test_detection_publishes_and_cleans_up() {
        let dir = scratch_dir("pipeline_hit");
        let frame = solid_jpeg(64, 48);
        let detector = Arc::new(ScriptedDetector::default());
        detector.answer(&frame, &[0.9]);
        let uploader = Arc::new(RecordingUploader::default());
        let g = group(&dir, &[frame]);

        let trace = pipeline(&dir, detector, uploader.clone()).run(&g).await;

        assert_eq!(
            trace.stages(),
            &[
                GroupStage::Collecting,
                GroupStage::Flushed,
                GroupStage::Detecting,
                GroupStage::BestFrameFound,
                GroupStage::CropPublishing,
                GroupStage::Done
            ]
        );
        assert_eq!(uploader.uploads().len(), 2);
        assert!(!g.members[0].path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_no_detection_has_no_side_effects() {
        let dir = scratch_dir("pipeline_miss");
        let frame = solid_jpeg(64, 48);
        let detector = Arc::new(ScriptedDetector::default());
        detector.answer(&frame, &[0.3]);
        let uploader = Arc::new(RecordingUploader::default());
        let g = group(&dir, &[frame]);

        let trace = pipeline(&dir, detector, uploader.clone()).keep_members().run(&g).await;

        assert_eq!(trace.current(), GroupStage::Done);
        assert!(trace.stages().contains(&GroupStage::NoDetection));
        assert!(uploader.uploads().is_empty());
        assert!(g.members[0].path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}

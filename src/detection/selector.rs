//! BestFrameSelector - pick the most informative member of a group
//!
//! Members are scored in capture order. The member with the strictly
//! largest count of valid boxes wins, so ties go to the earliest capture.
//! A member that cannot be read or detected is skipped.

use super::{DetectionOutcome, Detector, ThresholdPolicy};
use crate::group_aggregator::FlushedGroup;
use crate::models::CameraId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Winner of a group
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub camera: CameraId,
    pub group_sequence: u64,
    pub best: DetectionOutcome,
    /// Encoded bytes of the winning member
    pub frame: Vec<u8>,
    pub threshold: f32,
    pub at_night: bool,
}

pub struct BestFrameSelector {
    detector: Arc<dyn Detector>,
    thresholds: ThresholdPolicy,
}

impl BestFrameSelector {
    pub fn new(detector: Arc<dyn Detector>, thresholds: ThresholdPolicy) -> Self {
        Self {
            detector,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &ThresholdPolicy {
        &self.thresholds
    }

    pub async fn select(&self, group: &FlushedGroup) -> Option<GroupResult> {
        self.select_at(group, Utc::now()).await
    }

    /// `None` when no member has a valid box
    pub async fn select_at(&self, group: &FlushedGroup, now: DateTime<Utc>) -> Option<GroupResult> {
        // One threshold for the whole group
        let threshold = self.thresholds.effective_at(now);
        let at_night = self.thresholds.is_night(now);

        let mut members = group.members.clone();
        members.sort_by_key(|m| m.captured_at);

        let mut best: Option<(DetectionOutcome, Vec<u8>)> = None;

        for member in members {
            let bytes = match tokio::fs::read(&member.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        camera_id = %group.camera,
                        stage = "detecting",
                        path = %member.path.display(),
                        error = %e,
                        "Group member unreadable, skipped"
                    );
                    continue;
                }
            };

            let boxes = match self.detector.detect(&bytes).await {
                Ok(boxes) => boxes,
                Err(e) => {
                    warn!(
                        camera_id = %group.camera,
                        stage = "detecting",
                        path = %member.path.display(),
                        error = %e,
                        "Detection failed, member skipped"
                    );
                    continue;
                }
            };

            let outcome = DetectionOutcome::from_boxes(member, boxes, threshold);
            debug!(
                camera_id = %group.camera,
                path = %outcome.source.path.display(),
                count = outcome.count,
                threshold,
                "Member scored"
            );

            let current = best.as_ref().map_or(0, |(b, _)| b.count);
            if outcome.count > current {
                best = Some((outcome, bytes));
            }
        }

        let Some((best, frame)) = best else {
            info!(
                camera_id = %group.camera,
                stage = "no_detection",
                group = group.sequence,
                threshold,
                "No valid detection in group"
            );
            return None;
        };

        info!(
            camera_id = %group.camera,
            stage = "best_frame_found",
            group = group.sequence,
            path = %best.source.path.display(),
            count = best.count,
            at_night,
            "Best frame selected"
        );

        Some(GroupResult {
            camera: group.camera.clone(),
            group_sequence: group.sequence,
            best,
            frame,
            threshold,
            at_night,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Error, Result};
    use crate::models::BoundingBox;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by file content: the bytes are looked up in a score table
    #[derive(Default)]
    pub struct ScriptedDetector {
        pub answers: Mutex<HashMap<Vec<u8>, Vec<f32>>>,
        pub calls: Mutex<usize>,
    }

    impl ScriptedDetector {
        pub fn answer(&self, content: &[u8], scores: &[f32]) {
            self.answers
                .lock()
                .unwrap()
                .insert(content.to_vec(), scores.to_vec());
        }
    }

    #[async_trait]
    impl Detector for ScriptedDetector {
        async fn detect(&self, jpeg: &[u8]) -> Result<Vec<BoundingBox>> {
            *self.calls.lock().unwrap() += 1;
            let answers = self.answers.lock().unwrap();
            let scores = answers
                .get(jpeg)
                .ok_or_else(|| Error::Detection("detector timed out".to_string()))?;
            Ok(scores
                .iter()
                .enumerate()
                .map(|(i, &score)| {
                    let o = i as f32 * 20.0;
                    BoundingBox {
                        x1: o,
                        y1: o,
                        x2: o + 10.0,
                        y2: o + 10.0,
                        score,
                    }
                })
                .collect())
        }
    }
}

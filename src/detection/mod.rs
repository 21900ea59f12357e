//! Detection - detector adapter, scoring policy and best-frame selection
//!
//! ## Responsibilities
//!
//! - Call the external detector for one image (`Detector`)
//! - Decide the effective score threshold (stricter at night)
//! - Pick the member with the most valid boxes (`BestFrameSelector`)

mod client;
mod selector;

pub use client::HttpDetector;
pub use selector::{BestFrameSelector, GroupResult};

#[cfg(test)]
pub(crate) use selector::testing;

use crate::config_store::DetectionPolicy;
use crate::error::Result;
use crate::models::{BoundingBox, DailyWindow, SampleEnvelope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// External object detector
#[async_trait]
pub trait Detector: Send + Sync {
    /// All boxes found in a JPEG, unfiltered
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<BoundingBox>>;
}

/// Score threshold in effect at a given time
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub baseline: f32,
    pub night: f32,
    pub night_window: DailyWindow,
    pub timezone: Tz,
}

impl ThresholdPolicy {
    pub fn from_detection(policy: &DetectionPolicy, timezone: Tz) -> Self {
        Self {
            baseline: policy.score_threshold,
            night: policy.night_score_threshold,
            night_window: policy.night_window,
            timezone,
        }
    }

    pub fn is_night(&self, now: DateTime<Utc>) -> bool {
        self.night_window
            .contains(now.with_timezone(&self.timezone).time())
    }

    pub fn effective_at(&self, now: DateTime<Utc>) -> f32 {
        if self.is_night(now) {
            self.night
        } else {
            self.baseline
        }
    }
}

/// Detection result of one group member
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub source: SampleEnvelope,
    /// Boxes scoring strictly above the threshold, detector order
    pub valid_boxes: Vec<BoundingBox>,
    pub count: usize,
}

impl DetectionOutcome {
    pub fn from_boxes(source: SampleEnvelope, boxes: Vec<BoundingBox>, threshold: f32) -> Self {
        let valid_boxes: Vec<_> = boxes.into_iter().filter(|b| b.score > threshold).collect();
        Self {
            source,
            count: valid_boxes.len(),
            valid_boxes,
        }
    }
}

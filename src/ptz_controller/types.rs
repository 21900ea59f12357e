//! PTZ Controller type definitions

use crate::models::BoundingBox;
use serde::Serialize;

/// Region in camera PTZ coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl ZoomRegion {
    /// Scale a pixel box into the camera's coordinate space
    pub fn from_box(bbox: &BoundingBox, ratio_x: u32, ratio_y: u32) -> Self {
        let px = |v: f32| v.max(0.0) as u32;
        Self {
            x1: px(bbox.x1.min(bbox.x2)).saturating_mul(ratio_x),
            y1: px(bbox.y1.min(bbox.y2)).saturating_mul(ratio_y),
            x2: px(bbox.x1.max(bbox.x2)).saturating_mul(ratio_x),
            y2: px(bbox.y1.max(bbox.y2)).saturating_mul(ratio_y),
        }
    }
}

/// Result of asking for an actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Actuation sequence started
    Started,
    /// Camera engaged or cooling down; request dropped
    Suppressed,
}

/// Actuation state of one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationPhase {
    /// Zoomed, holding or returning to preset
    Engaged,
    /// Returned; new triggers dropped until the deadline
    CoolingDown { until: tokio::time::Instant },
}

//! FrameSampler - newest-frame slot and periodic sampling
//!
//! ## Responsibilities
//!
//! - Hold the newest decoded frame of a camera (`FrameSlot`)
//! - Snapshot task: archive the current frame every snapshot interval
//! - Upload task: encode the current frame on a jittered interval and
//!   hand it to the sample sink
//!
//! Both tasks skip a cycle when no frame is available and never block
//! the supervisor's decode loop.

mod service;
mod sink;

pub use service::{FrameSampler, SamplerSettings, SamplerTasks};
pub use sink::{HttpSampleSink, OutboundSample, SampleSink};

use crate::rtsp_manager::Frame;
use std::sync::Arc;
use tokio::sync::watch;

/// Newest frame of one camera.
///
/// Single writer (the decode loop), any number of readers. Replacement is
/// atomic: a reader gets either the old or the new frame, never a mix.
#[derive(Clone)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// Drop the frame, e.g. after a disconnect
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.tx.subscribe()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

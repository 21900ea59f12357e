//! Live stream access per camera
//!
//! ## Responsibilities
//!
//! - Open a continuous decoded-frame stream for a camera
//! - Prevent more than one live stream per camera
//! - Surface open/read failures as transport errors
//!
//! `VideoTransport` is the seam the connection supervisor talks to;
//! `FfmpegTransport` is the production implementation.

mod ffmpeg;
mod mjpeg;

pub use ffmpeg::FfmpegTransport;
pub use mjpeg::MjpegSplitter;

use crate::error::Result;
use crate::models::CameraId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One decoded frame, JPEG encoded
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(jpeg: Vec<u8>) -> Self {
        Self {
            jpeg,
            captured_at: Utc::now(),
        }
    }
}

/// An open stream
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame; `Ok(None)` when the stream ended
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens camera streams
#[async_trait]
pub trait VideoTransport: Send + Sync {
    /// Open and verify a stream (first frame received)
    async fn open(&self, camera_id: &CameraId, url: &str) -> Result<Box<dyn FrameStream>>;
}

/// Cameras that currently have a live stream
#[derive(Debug, Default)]
pub struct OpenStreams {
    cameras: Mutex<HashSet<CameraId>>,
}

impl OpenStreams {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the camera's single stream slot; `None` while another stream
    /// holds it
    pub fn claim(self: &Arc<Self>, camera_id: &CameraId) -> Option<StreamClaim> {
        if !self.lock().insert(camera_id.clone()) {
            tracing::warn!(camera_id = %camera_id, "Stream already open, refusing a second one");
            return None;
        }
        Some(StreamClaim {
            streams: self.clone(),
            camera_id: camera_id.clone(),
        })
    }

    pub fn is_open(&self, camera_id: &CameraId) -> bool {
        self.lock().contains(camera_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<CameraId>> {
        self.cameras.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held by an open stream, frees the slot on drop
#[derive(Debug)]
pub struct StreamClaim {
    streams: Arc<OpenStreams>,
    camera_id: CameraId,
}

impl Drop for StreamClaim {
    fn drop(&mut self) {
        self.streams.lock().remove(&self.camera_id);
        tracing::debug!(camera_id = %self.camera_id, "Stream slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_stream_per_camera() {
        let streams = OpenStreams::new();
        let cam = CameraId::parse("10.0.0.1").unwrap();

        let claim = streams.claim(&cam).unwrap();
        assert!(streams.is_open(&cam));
        assert!(streams.claim(&cam).is_none());
        assert!(streams.claim(&CameraId::parse("10.0.0.2").unwrap()).is_some());

        drop(claim);
        assert!(!streams.is_open(&cam));
        assert!(streams.claim(&cam).is_some());
    }
}

//! SnapshotService - frame archive and sample encoding
//!
//! ## Responsibilities
//!
//! - Persist periodic snapshots under `<snapshot_dir>/<camera>/`
//! - Re-encode frames as compact JPEG for upload
//!
//! Image work runs on the blocking pool.

use crate::error::{Error, Result};
use crate::models::CameraId;
use crate::rtsp_manager::Frame;
use chrono_tz::Tz;
use image::codecs::jpeg::JpegEncoder;
use std::path::PathBuf;
use tokio::fs;

const SNAPSHOT_NAME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

pub struct SnapshotService {
    snapshot_dir: PathBuf,
    timezone: Tz,
}

impl SnapshotService {
    pub async fn new(snapshot_dir: PathBuf, timezone: Tz) -> Result<Self> {
        fs::create_dir_all(&snapshot_dir).await?;
        Ok(Self {
            snapshot_dir,
            timezone,
        })
    }

    pub fn camera_dir(&self, camera_id: &CameraId) -> PathBuf {
        self.snapshot_dir.join(camera_id.file_stem())
    }

    /// Save a frame as-is, named by local capture time
    pub async fn save(&self, camera_id: &CameraId, frame: &Frame) -> Result<PathBuf> {
        let camera_dir = self.camera_dir(camera_id);
        fs::create_dir_all(&camera_dir).await?;

        let local = frame.captured_at.with_timezone(&self.timezone);
        let path = camera_dir.join(format!("{}.jpg", local.format(SNAPSHOT_NAME_FORMAT)));
        fs::write(&path, &frame.jpeg).await?;

        tracing::debug!(
            camera_id = %camera_id,
            path = %path.display(),
            size = frame.jpeg.len(),
            "Saved snapshot"
        );

        Ok(path)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Decode a JPEG and encode it again at `quality`
pub async fn reencode_jpeg(jpeg: Vec<u8>, quality: u8) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || reencode_jpeg_blocking(&jpeg, quality))
        .await
        .map_err(|e| Error::Internal(format!("encode task failed: {e}")))?
}

pub fn reencode_jpeg_blocking(jpeg: &[u8], quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(jpeg)?;
    encode_jpeg(&img, quality)
}

/// Encode as JPEG, dropping any alpha channel
pub fn encode_jpeg(img: &image::DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use image::{Rgb, RgbImage};

    /// Small solid-colour JPEG
    pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 200])));
        super::encode_jpeg(&img, 90).unwrap()
    }

    /// Unique scratch directory
    pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("smoke_hub_{}_{}", tag, uuid::Uuid::new_v4()))
    }
}

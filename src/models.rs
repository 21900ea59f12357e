//! Shared models and types for smoke_hub
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Camera identity.
///
/// Always an IPv4 address. Canonical form is dotted (`10.0.0.5`); the
/// underscore form used in filenames (`10_0_0_5`) is accepted and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CameraId(String);

impl CameraId {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Validation("camera id is empty".to_string()));
        }

        // The id ends up as a file stem, so only IPv4 addresses pass
        let dotted = if raw.contains('.') {
            raw.to_string()
        } else {
            raw.replace('_', ".")
        };
        let addr: Ipv4Addr = dotted
            .parse()
            .map_err(|_| Error::Validation(format!("invalid camera id: {raw}")))?;

        Ok(Self(addr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form used in file and directory names
    pub fn file_stem(&self) -> String {
        self.0.replace('.', "_")
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CameraId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CameraId> for String {
    fn from(id: CameraId) -> Self {
        id.0
    }
}

/// Detection box in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl BoundingBox {
    /// Integer pixel rectangle `(x, y, w, h)` clamped to the image.
    ///
    /// Returns `None` when the clamped box has no area.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min(max as f32) as u32 };
        let x1 = clamp(self.x1.min(self.x2), width);
        let x2 = clamp(self.x1.max(self.x2), width);
        let y1 = clamp(self.y1.min(self.y2), height);
        let y2 = clamp(self.y1.max(self.y2), height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Request to zoom on a detection, carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationMarker {
    /// How long to hold the zoomed view
    pub hold_minutes: u32,
}

impl ActuationMarker {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(u64::from(self.hold_minutes) * 60)
    }
}

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// A sampled frame waiting for grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEnvelope {
    pub camera: CameraId,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub actuation: Option<ActuationMarker>,
}

impl SampleEnvelope {
    pub fn new(camera: CameraId, path: PathBuf, captured_at: DateTime<Utc>) -> Self {
        Self {
            camera,
            path,
            captured_at,
            actuation: None,
        }
    }

    pub fn with_actuation(mut self, marker: Option<ActuationMarker>) -> Self {
        self.actuation = marker;
        self
    }

    /// Filename used when the sample travels without metadata:
    /// `10_0_0_5_2024_05_01_09_30_00[_focus5min].jpg`
    pub fn legacy_file_name(
        camera: &CameraId,
        captured_local: &NaiveDateTime,
        actuation: Option<ActuationMarker>,
    ) -> String {
        let mut name = format!(
            "{}_{}",
            camera.file_stem(),
            captured_local.format(LEGACY_TIMESTAMP_FORMAT)
        );
        if let Some(marker) = actuation {
            name.push_str(&format!("_focus{}min", marker.hold_minutes));
        }
        name.push_str(".jpg");
        name
    }

    /// Recover an envelope from a legacy filename.
    ///
    /// The first four `_` separated parts are the camera. The capture time is
    /// taken from the name when it parses (interpreted in `tz`), otherwise
    /// `fallback` is used. A `_focus{N}min` part becomes the actuation marker.
    pub fn from_legacy_path<Tz: TimeZone>(
        path: &Path,
        tz: &Tz,
        fallback: DateTime<Utc>,
    ) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Validation(format!("unreadable file name: {}", path.display())))?;

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 4 {
            return Err(Error::Validation(format!(
                "file name carries no camera identity: {stem}"
            )));
        }
        let camera = CameraId::parse(&parts[..4].join("_"))?;

        let mut actuation = None;
        let mut time_parts = Vec::new();
        for part in &parts[4..] {
            if let Some(minutes) = part
                .strip_prefix("focus")
                .and_then(|p| p.strip_suffix("min"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                actuation = Some(ActuationMarker {
                    hold_minutes: minutes,
                });
            } else {
                time_parts.push(*part);
            }
        }

        let captured_at = NaiveDateTime::parse_from_str(&time_parts.join("_"), LEGACY_TIMESTAMP_FORMAT)
            .ok()
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or(fallback);

        Ok(Self {
            camera,
            path: path.to_path_buf(),
            captured_at,
            actuation,
        })
    }
}

/// Daily time-of-day window, `[start, end)`, wrapping past midnight
/// when `end < start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowSpec", into = "WindowSpec")]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Window from whole hours, e.g. `hours(7, 19)`
    pub fn hours(start: u32, end: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start % 24, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(end % 24, 0, 0).unwrap_or_default(),
        }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WindowSpec {
    start: String,
    end: String,
}

impl TryFrom<WindowSpec> for DailyWindow {
    type Error = Error;

    fn try_from(spec: WindowSpec) -> Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map_err(|_| Error::Config(format!("invalid time of day: {s}")))
        };
        Ok(Self {
            start: parse(&spec.start)?,
            end: parse(&spec.end)?,
        })
    }
}

impl From<DailyWindow> for WindowSpec {
    fn from(w: DailyWindow) -> Self {
        Self {
            start: w.start.format("%H:%M").to_string(),
            end: w.end.format("%H:%M").to_string(),
        }
    }
}

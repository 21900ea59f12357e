//! ConfigStore data types
//!
//! Fleet configuration as read from the JSON config file. Every policy
//! field has a default so a minimal file only lists cameras and routes.

use crate::models::{CameraId, DailyWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How the camera's stream is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionType {
    /// Channel on a network video recorder
    #[serde(rename = "NVR", alias = "nvr")]
    Nvr,
    /// Standalone camera with a single main stream
    #[default]
    #[serde(rename = "single", alias = "singel")]
    Single,
    /// Multi-sensor camera, first channel
    #[serde(rename = "multi")]
    Multi,
}

/// Per-camera feature switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSwitches {
    /// Tag samples so a detection zooms the camera
    #[serde(default)]
    pub adjust_camera_zoom_on_detection: bool,
    /// Zoom hold time in minutes
    #[serde(default = "default_focus_time")]
    pub focus_time: u32,
    /// Cycle through patrol presets
    #[serde(default)]
    pub enable_camera_ptz: bool,
    /// Push detections to the notification channels
    #[serde(default)]
    pub enable_smoke_notify: bool,
    /// Allow detection alerts inside the night window
    #[serde(default = "default_true")]
    pub enable_night_detection: bool,
}

impl Default for FunctionSwitches {
    fn default() -> Self {
        Self {
            adjust_camera_zoom_on_detection: false,
            focus_time: default_focus_time(),
            enable_camera_ptz: false,
            enable_smoke_notify: false,
            enable_night_detection: true,
        }
    }
}

/// Camera entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub ip: CameraId,
    /// Human readable place, used in alerts
    #[serde(default, alias = "notify")]
    pub location: String,
    #[serde(default)]
    pub connection_type: ConnectionType,
    /// Recorder address for `NVR` cameras
    #[serde(default, alias = "NVR_IP")]
    pub nvr_ip: Option<String>,
    #[serde(default, alias = "NVR_channel")]
    pub nvr_channel: Option<u32>,
    /// Explicit stream URL, overrides the derived one
    #[serde(default)]
    pub rtsp_url: Option<String>,
    /// Group size override for this camera
    #[serde(default)]
    pub group_size: Option<usize>,
    #[serde(default)]
    pub function_switches: FunctionSwitches,
    /// Preset names visited by the patrol; the n-th name is preset n+1
    #[serde(default)]
    pub patrol_points: Vec<String>,
    /// Dwell per patrol point in minutes
    #[serde(default = "default_patrol_time")]
    pub patrol_time: u32,
}

impl CameraConfig {
    pub fn new(ip: CameraId) -> Self {
        Self {
            ip,
            location: String::new(),
            connection_type: ConnectionType::Single,
            nvr_ip: None,
            nvr_channel: None,
            rtsp_url: None,
            group_size: None,
            function_switches: FunctionSwitches::default(),
            patrol_points: Vec::new(),
            patrol_time: default_patrol_time(),
        }
    }

    /// Stream URL for this camera.
    ///
    /// NVR channels are folded into the recorder's 1..=20 range.
    pub fn stream_url(&self, credentials: Option<&Credentials>) -> String {
        if let Some(url) = &self.rtsp_url {
            return url.clone();
        }

        let auth = credentials
            .map(|c| format!("{}:{}@", c.username, c.password))
            .unwrap_or_default();

        match self.connection_type {
            ConnectionType::Nvr => {
                let host = self.nvr_ip.as_deref().unwrap_or(self.ip.as_str());
                let channel = (self.nvr_channel.unwrap_or(1).max(1) - 1) % 20 + 1;
                format!(
                    "rtsp://{auth}{host}:554/cam/realmonitor?channel={channel}&subtype=0"
                )
            }
            ConnectionType::Single => format!("rtsp://{auth}{}:554/live/0/main", self.ip),
            ConnectionType::Multi => format!(
                "rtsp://{auth}{}:554/cam/realmonitor?channel=1&subtype=0",
                self.ip
            ),
        }
    }

    /// Hold duration attached to outbound samples, if zoom is enabled
    pub fn focus_minutes(&self) -> Option<u32> {
        let fs = &self.function_switches;
        (fs.adjust_camera_zoom_on_detection && fs.focus_time > 0).then_some(fs.focus_time)
    }

    pub fn patrol_dwell(&self) -> Duration {
        Duration::from_secs(u64::from(self.patrol_time.max(1)) * 60)
    }
}

/// Camera account used for streams and CGI control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Grouping and scoring policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPolicy {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Seconds of max wait per group slot
    #[serde(default = "default_unit_wait_secs")]
    pub unit_wait_secs: u64,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_night_score_threshold")]
    pub night_score_threshold: f32,
    #[serde(default = "default_night_window")]
    pub night_window: DailyWindow,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            unit_wait_secs: default_unit_wait_secs(),
            score_threshold: default_score_threshold(),
            night_score_threshold: default_night_score_threshold(),
            night_window: default_night_window(),
        }
    }
}

/// Inclusive range of seconds for randomized intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for JitterRange {
    fn default() -> Self {
        Self {
            min_secs: 10,
            max_secs: 30,
        }
    }
}

/// Connection supervision and sampling timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorPolicy {
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_notify_interval_secs")]
    pub notify_interval_secs: u64,
    #[serde(default = "default_disconnect_threshold_secs")]
    pub disconnect_threshold_secs: u64,
    #[serde(default = "default_active_window")]
    pub active_window: DailyWindow,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// Fixed part of the upload interval
    #[serde(default)]
    pub upload_base_secs: u64,
    #[serde(default)]
    pub upload_jitter: JitterRange,
    #[serde(default = "default_initial_upload_delay_secs")]
    pub initial_upload_delay_secs: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Time allowed for the first frame after opening a stream
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
            notify_interval_secs: default_notify_interval_secs(),
            disconnect_threshold_secs: default_disconnect_threshold_secs(),
            active_window: default_active_window(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            upload_base_secs: 0,
            upload_jitter: JitterRange::default(),
            initial_upload_delay_secs: default_initial_upload_delay_secs(),
            jpeg_quality: default_jpeg_quality(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

/// Zoom-on-detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationPolicy {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Detector-to-PTZ coordinate scale, horizontal
    #[serde(default = "default_ratio_x")]
    pub ratio_x: u32,
    /// Detector-to-PTZ coordinate scale, vertical
    #[serde(default = "default_ratio_y")]
    pub ratio_y: u32,
    /// Preset the camera returns to after a hold
    #[serde(default = "default_home_preset")]
    pub home_preset: u32,
}

impl Default for ActuationPolicy {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            ratio_x: default_ratio_x(),
            ratio_y: default_ratio_y(),
            home_preset: default_home_preset(),
        }
    }
}

/// Inbox maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingPolicy {
    /// Purge the inbox when it holds more images than this
    #[serde(default = "default_max_inbox_files")]
    pub max_inbox_files: usize,
    #[serde(default = "default_inbox_poll_secs")]
    pub inbox_poll_secs: u64,
    /// How often pending groups are checked for the time trigger
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for HousekeepingPolicy {
    fn default() -> Self {
        Self {
            max_inbox_files: default_max_inbox_files(),
            inbox_poll_secs: default_inbox_poll_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// IANA zone for windows and filenames
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub cameras: Vec<CameraConfig>,
    #[serde(default, alias = "Cameras_account_password")]
    pub camera_credentials: Option<Credentials>,
    /// workstation -> camera ids
    #[serde(default)]
    pub workstation_camera_mapping: BTreeMap<String, Vec<String>>,
    /// workstation -> upload endpoint
    #[serde(default)]
    pub workstation_url_mapping: BTreeMap<String, String>,
    /// Remote `/upload` endpoint; samples stay local when unset
    #[serde(default)]
    pub sample_upload_url: Option<String>,
    /// Receives a startup notice
    #[serde(default)]
    pub server_notify_url: Option<String>,
    #[serde(default)]
    pub detection: DetectionPolicy,
    #[serde(default)]
    pub supervisor: SupervisorPolicy,
    #[serde(default)]
    pub actuation: ActuationPolicy,
    #[serde(default)]
    pub housekeeping: HousekeepingPolicy,
}

fn default_true() -> bool {
    true
}
fn default_focus_time() -> u32 {
    5
}
fn default_patrol_time() -> u32 {
    15
}
fn default_group_size() -> usize {
    10
}
fn default_unit_wait_secs() -> u64 {
    60
}
fn default_score_threshold() -> f32 {
    0.6
}
fn default_night_score_threshold() -> f32 {
    0.9
}
fn default_night_window() -> DailyWindow {
    DailyWindow::hours(18, 6)
}
fn default_retry_interval_secs() -> u64 {
    10
}
fn default_notify_interval_secs() -> u64 {
    3600
}
fn default_disconnect_threshold_secs() -> u64 {
    1800
}
fn default_active_window() -> DailyWindow {
    DailyWindow::hours(7, 19)
}
fn default_snapshot_interval_secs() -> u64 {
    1800
}
fn default_initial_upload_delay_secs() -> u64 {
    60
}
fn default_jpeg_quality() -> u8 {
    40
}
fn default_open_timeout_secs() -> u64 {
    15
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_ratio_x() -> u32 {
    4
}
fn default_ratio_y() -> u32 {
    7
}
fn default_home_preset() -> u32 {
    1
}
fn default_max_inbox_files() -> usize {
    800
}
fn default_inbox_poll_secs() -> u64 {
    2
}
fn default_sweep_interval_secs() -> u64 {
    5
}
fn default_timezone() -> String {
    "Asia/Taipei".to_string()
}

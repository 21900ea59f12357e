//! ConfigStore - fleet configuration
//!
//! ## Responsibilities
//!
//! - Load and validate the fleet JSON once at startup
//! - Camera inventory lookup by identity
//! - Destination routing (camera -> workstation -> upload URL)
//! - Policy access for every other component
//!
//! Load failure is the only fatal error of the process.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::models::CameraId;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Read-only configuration shared by all components
pub struct ConfigStore {
    fleet: FleetConfig,
    timezone: Tz,
    cameras: HashMap<CameraId, Arc<CameraConfig>>,
    routes: HashMap<CameraId, String>,
}

impl ConfigStore {
    /// Load from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let fleet: FleetConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        Self::from_fleet(fleet)
    }

    /// Build from an already parsed configuration
    pub fn from_fleet(fleet: FleetConfig) -> Result<Self> {
        let timezone: Tz = fleet
            .timezone
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone: {}", fleet.timezone)))?;

        validate_policies(&fleet)?;

        let mut cameras = HashMap::new();
        for camera in &fleet.cameras {
            if let Some(size) = camera.group_size {
                if size == 0 {
                    return Err(Error::Config(format!(
                        "camera {}: group_size must be at least 1",
                        camera.ip
                    )));
                }
            }
            if cameras
                .insert(camera.ip.clone(), Arc::new(camera.clone()))
                .is_some()
            {
                return Err(Error::Config(format!("duplicate camera: {}", camera.ip)));
            }
        }

        let mut routes = HashMap::new();
        for (workstation, members) in &fleet.workstation_camera_mapping {
            let Some(url) = fleet.workstation_url_mapping.get(workstation) else {
                tracing::warn!(
                    workstation = %workstation,
                    "Workstation has cameras but no upload URL"
                );
                continue;
            };
            for member in members {
                let id = CameraId::parse(member)?;
                if let Some(existing) = routes.get(&id) {
                    tracing::warn!(
                        camera_id = %id,
                        kept = %existing,
                        ignored = %url,
                        "Camera mapped to more than one workstation"
                    );
                    continue;
                }
                routes.insert(id, url.clone());
            }
        }

        Ok(Self {
            fleet,
            timezone,
            cameras,
            routes,
        })
    }

    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Arc<CameraConfig>> {
        self.fleet
            .cameras
            .iter()
            .filter_map(|c| self.cameras.get(&c.ip))
    }

    pub fn camera(&self, id: &CameraId) -> Option<Arc<CameraConfig>> {
        self.cameras.get(id).cloned()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.fleet.camera_credentials.as_ref()
    }

    pub fn detection(&self) -> &DetectionPolicy {
        &self.fleet.detection
    }

    pub fn supervisor(&self) -> &SupervisorPolicy {
        &self.fleet.supervisor
    }

    pub fn actuation(&self) -> &ActuationPolicy {
        &self.fleet.actuation
    }

    pub fn housekeeping(&self) -> &HousekeepingPolicy {
        &self.fleet.housekeeping
    }

    /// Group size for a camera, falling back to the fleet default
    pub fn group_target(&self, id: &CameraId) -> usize {
        self.cameras
            .get(id)
            .and_then(|c| c.group_size)
            .unwrap_or(self.fleet.detection.group_size)
    }

    /// Upload endpoint of the workstation that owns the camera
    pub fn resolve_destination(&self, id: &CameraId) -> Result<&str> {
        self.routes
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| Error::Routing(id.to_string()))
    }

    pub fn stream_url(&self, camera: &CameraConfig) -> String {
        camera.stream_url(self.credentials())
    }
}

fn validate_policies(fleet: &FleetConfig) -> Result<()> {
    let d = &fleet.detection;
    if d.group_size == 0 {
        return Err(Error::Config("detection.group_size must be at least 1".into()));
    }
    if d.unit_wait_secs == 0 {
        return Err(Error::Config("detection.unit_wait_secs must be positive".into()));
    }
    for (name, thr) in [
        ("score_threshold", d.score_threshold),
        ("night_score_threshold", d.night_score_threshold),
    ] {
        if !(0.0..=1.0).contains(&thr) {
            return Err(Error::Config(format!("detection.{name} out of range: {thr}")));
        }
    }

    let s = &fleet.supervisor;
    if s.retry_interval_secs == 0 || s.snapshot_interval_secs == 0 {
        return Err(Error::Config("supervisor intervals must be positive".into()));
    }
    if s.upload_jitter.min_secs > s.upload_jitter.max_secs {
        return Err(Error::Config("supervisor.upload_jitter min exceeds max".into()));
    }
    if s.upload_base_secs + s.upload_jitter.max_secs == 0 {
        return Err(Error::Config("upload interval must be positive".into()));
    }
    if !(1..=100).contains(&s.jpeg_quality) {
        return Err(Error::Config(format!(
            "supervisor.jpeg_quality out of range: {}",
            s.jpeg_quality
        )));
    }

    let a = &fleet.actuation;
    if a.ratio_x == 0 || a.ratio_y == 0 {
        return Err(Error::Config("actuation ratios must be positive".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_fleet() -> serde_json::Value {
        json!({
            "cameras": [
                {
                    "ip": "10.0.0.5",
                    "location": "Warehouse A",
                    "connection_type": "NVR",
                    "NVR_IP": "10.0.0.2",
                    "NVR_channel": 23,
                    "function_switches": {
                        "adjust_camera_zoom_on_detection": true,
                        "focus_time": 5
                    }
                },
                { "ip": "10.0.0.6", "connection_type": "singel", "group_size": 4 }
            ],
            "Cameras_account_password": { "username": "admin", "password": "pw" },
            "workstation_camera_mapping": { "ws1": ["10_0_0_5"] },
            "workstation_url_mapping": { "ws1": "http://ws1:8000/upload" }
        })
    }

    #[test]
    fn test_defaults_match_fleet_constants() {
        let fleet: FleetConfig = serde_json::from_value(sample_fleet()).unwrap();
        let store = ConfigStore::from_fleet(fleet).unwrap();

        assert_eq!(store.detection().group_size, 10);
        assert_eq!(store.detection().unit_wait_secs, 60);
        assert_eq!(store.supervisor().retry_interval_secs, 10);
        assert_eq!(store.supervisor().notify_interval_secs, 3600);
        assert_eq!(store.supervisor().disconnect_threshold_secs, 1800);
        assert_eq!(store.supervisor().jpeg_quality, 40);
        assert_eq!(store.actuation().cooldown_secs, 60);
        assert_eq!(store.timezone(), chrono_tz::Asia::Taipei);
    }

    #[test]
    fn test_routing_accepts_underscore_ids() {
        let fleet: FleetConfig = serde_json::from_value(sample_fleet()).unwrap();
        let store = ConfigStore::from_fleet(fleet).unwrap();

        let mapped = CameraId::parse("10.0.0.5").unwrap();
        assert_eq!(
            store.resolve_destination(&mapped).unwrap(),
            "http://ws1:8000/upload"
        );

        let unmapped = CameraId::parse("10.0.0.6").unwrap();
        assert!(matches!(
            store.resolve_destination(&unmapped),
            Err(Error::Routing(_))
        ));
    }

    #[test]
    fn test_stream_urls_per_connection_type() {
        let fleet: FleetConfig = serde_json::from_value(sample_fleet()).unwrap();
        let store = ConfigStore::from_fleet(fleet).unwrap();

        let nvr = store.camera(&CameraId::parse("10.0.0.5").unwrap()).unwrap();
        assert_eq!(
            store.stream_url(&nvr),
            "rtsp://admin:pw@10.0.0.2:554/cam/realmonitor?channel=3&subtype=0"
        );
        assert_eq!(nvr.focus_minutes(), Some(5));

        let single = store.camera(&CameraId::parse("10.0.0.6").unwrap()).unwrap();
        assert_eq!(
            store.stream_url(&single),
            "rtsp://admin:pw@10.0.0.6:554/live/0/main"
        );
        assert_eq!(single.focus_minutes(), None);
        assert_eq!(store.group_target(&single.ip), 4);
        assert_eq!(store.group_target(&nvr.ip), 10);
    }

    #[test]
    fn test_rejects_duplicate_cameras_and_bad_policy() {
        let mut raw = sample_fleet();
        raw["cameras"][1]["ip"] = json!("10_0_0_5");
        let fleet: FleetConfig = serde_json::from_value(raw).unwrap();
        assert!(matches!(ConfigStore::from_fleet(fleet), Err(Error::Config(_))));

        let mut raw = sample_fleet();
        raw["detection"] = json!({ "score_threshold": 1.5 });
        let fleet: FleetConfig = serde_json::from_value(raw).unwrap();
        assert!(ConfigStore::from_fleet(fleet).is_err());

        let mut raw = sample_fleet();
        raw["timezone"] = json!("Mars/Olympus");
        let fleet: FleetConfig = serde_json::from_value(raw).unwrap();
        assert!(ConfigStore::from_fleet(fleet).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_config_error() {
        let result = ConfigStore::load("/nonexistent/smoke_hub.json").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

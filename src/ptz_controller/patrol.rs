//! Preset patrol
//!
//! Cameras with `enable_camera_ptz` cycle through their patrol presets,
//! dwelling `patrol_time` minutes at each. A stop is skipped while the
//! camera is held by an actuation.

use super::client::CameraControl;
use super::cooldown::ActuationCooldown;
use crate::config_store::CameraConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct PatrolService {
    control: Arc<dyn CameraControl>,
    cooldown: Arc<ActuationCooldown>,
}

impl PatrolService {
    pub fn new(control: Arc<dyn CameraControl>, cooldown: Arc<ActuationCooldown>) -> Self {
        Self { control, cooldown }
    }

    pub fn wants_patrol(camera: &CameraConfig) -> bool {
        camera.function_switches.enable_camera_ptz && !camera.patrol_points.is_empty()
    }

    /// Spawn a patrol task for every camera that has one configured
    pub fn start<'a>(
        self: &Arc<Self>,
        cameras: impl IntoIterator<Item = &'a Arc<CameraConfig>>,
    ) -> Vec<JoinHandle<()>> {
        cameras
            .into_iter()
            .filter(|c| Self::wants_patrol(c))
            .map(|camera| {
                let this = self.clone();
                let camera = camera.clone();
                tokio::spawn(async move { this.patrol(camera).await })
            })
            .collect()
    }

    async fn patrol(&self, camera: Arc<CameraConfig>) {
        let dwell = camera.patrol_dwell();
        tracing::info!(
            camera_id = %camera.ip,
            points = camera.patrol_points.len(),
            dwell_minutes = dwell.as_secs() / 60,
            "Patrol started"
        );

        loop {
            for (index, name) in camera.patrol_points.iter().enumerate() {
                self.visit(&camera, index, name).await;
                tokio::time::sleep(dwell).await;
            }
        }
    }

    async fn visit(&self, camera: &CameraConfig, index: usize, name: &str) {
        if self.cooldown.is_engaged(&camera.ip) {
            tracing::debug!(camera_id = %camera.ip, point = name, "Camera held by actuation, stop skipped");
            return;
        }

        let preset = index as u32 + 1;
        match self.control.goto_preset(&camera.ip, preset).await {
            Ok(()) => tracing::info!(camera_id = %camera.ip, point = name, preset, "Patrol moved"),
            Err(e) => tracing::warn!(camera_id = %camera.ip, point = name, error = %e, "Patrol move failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ActuationPolicy;
    use crate::models::{BoundingBox, CameraId};
    use crate::ptz_controller::cooldown::testing::{Command, RecordingControl};
    use std::time::Duration;

    fn camera(ptz: bool) -> Arc<CameraConfig> {
        let mut c = CameraConfig::new(CameraId::parse("10.0.0.5").unwrap());
        c.function_switches.enable_camera_ptz = ptz;
        c.patrol_points = vec!["gate".to_string(), "yard".to_string()];
        c.patrol_time = 1;
        Arc::new(c)
    }

    fn presets(control: &RecordingControl) -> Vec<u32> {
        control
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Preset(_, p, _) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_patrol_cycles_presets() {
        let control = Arc::new(RecordingControl::default());
        let cooldown = Arc::new(ActuationCooldown::new(control.clone(), ActuationPolicy::default()));
        let patrol = Arc::new(PatrolService::new(control.clone(), cooldown));

        let cams = [camera(true), {
            let mut off = (*camera(false)).clone();
            off.ip = CameraId::parse("10.0.0.6").unwrap();
            Arc::new(off)
        }];
        let handles = patrol.start(cams.iter());
        assert_eq!(handles.len(), 1);

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(presets(&control), vec![1, 2, 1]);
        for h in handles {
            h.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_patrol_skips_while_engaged() {
        let control = Arc::new(RecordingControl::default());
        let cooldown = Arc::new(ActuationCooldown::new(control.clone(), ActuationPolicy::default()));
        let patrol = PatrolService::new(control.clone(), cooldown.clone());
        let cam = camera(true);

        let bbox = BoundingBox {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            score: 0.9,
        };
        cooldown.trigger(&cam.ip, &bbox, Duration::from_secs(600));
        tokio::task::yield_now().await;

        patrol.visit(&cam, 0, "gate").await;
        assert!(presets(&control).is_empty());
    }
}

//! ActuationCooldown - one zoom sequence per camera at a time
//!
//! A trigger zooms onto the detection, holds, returns to the home preset
//! and then blocks further triggers for the cooldown period. Triggers that
//! arrive while a camera is engaged or cooling down are dropped.

use super::client::CameraControl;
use super::types::{ActuationPhase, TriggerOutcome, ZoomRegion};
use crate::config_store::ActuationPolicy;
use crate::models::{BoundingBox, CameraId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub struct ActuationCooldown {
    control: Arc<dyn CameraControl>,
    policy: ActuationPolicy,
    phases: Mutex<HashMap<CameraId, ActuationPhase>>,
}

impl ActuationCooldown {
    pub fn new(control: Arc<dyn CameraControl>, policy: ActuationPolicy) -> Self {
        Self {
            control,
            policy,
            phases: Mutex::new(HashMap::new()),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.policy.cooldown_secs)
    }

    /// Start an actuation unless one is running or cooling down.
    ///
    /// The sequence runs on its own task; the caller is never blocked.
    pub fn trigger(
        self: &Arc<Self>,
        camera: &CameraId,
        bbox: &BoundingBox,
        hold: Duration,
    ) -> TriggerOutcome {
        let now = Instant::now();
        {
            let mut phases = self.lock_phases();
            let busy = match phases.get(camera) {
                Some(ActuationPhase::Engaged) => true,
                Some(ActuationPhase::CoolingDown { until }) => now < *until,
                None => false,
            };
            if busy {
                info!(camera_id = %camera, "Actuation suppressed, camera busy or cooling down");
                return TriggerOutcome::Suppressed;
            }
            phases.insert(camera.clone(), ActuationPhase::Engaged);
        }

        let region = ZoomRegion::from_box(bbox, self.policy.ratio_x, self.policy.ratio_y);
        let this = self.clone();
        let camera = camera.clone();
        tokio::spawn(async move {
            let _release = CooldownGuard {
                owner: &this,
                camera: &camera,
            };
            this.run_sequence(&camera, region, hold).await;
        });

        TriggerOutcome::Started
    }

    async fn run_sequence(&self, camera: &CameraId, region: ZoomRegion, hold: Duration) {
        info!(camera_id = %camera, ?region, hold_secs = hold.as_secs(), "Zooming onto detection");

        match self.control.zoom_to_region(camera, region).await {
            Ok(()) => tokio::time::sleep(hold).await,
            Err(e) => warn!(camera_id = %camera, error = %e, "Zoom failed"),
        }

        match self.control.goto_preset(camera, self.policy.home_preset).await {
            Ok(()) => info!(camera_id = %camera, preset = self.policy.home_preset, "Returned to preset"),
            Err(e) => warn!(camera_id = %camera, error = %e, "Return to preset failed"),
        }
    }

    /// Zoomed or returning
    pub fn is_engaged(&self, camera: &CameraId) -> bool {
        matches!(self.lock_phases().get(camera), Some(ActuationPhase::Engaged))
    }

    /// Engaged or still inside the cooldown
    pub fn is_blocked(&self, camera: &CameraId) -> bool {
        match self.lock_phases().get(camera) {
            Some(ActuationPhase::Engaged) => true,
            Some(ActuationPhase::CoolingDown { until }) => Instant::now() < *until,
            None => false,
        }
    }

    fn lock_phases(&self) -> std::sync::MutexGuard<'_, HashMap<CameraId, ActuationPhase>> {
        self.phases.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Moves the camera into cooldown when the sequence ends, panics included
struct CooldownGuard<'a> {
    owner: &'a ActuationCooldown,
    camera: &'a CameraId,
}

impl Drop for CooldownGuard<'_> {
    fn drop(&mut self) {
        let until = Instant::now() + self.owner.cooldown();
        self.owner
            .lock_phases()
            .insert(self.camera.clone(), ActuationPhase::CoolingDown { until });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Command {
        Zoom(CameraId, ZoomRegion, Instant),
        Preset(CameraId, u32, Instant),
    }

    #[derive(Default)]
    pub struct RecordingControl {
        pub commands: Mutex<Vec<Command>>,
        pub fail_zoom: bool,
    }

    impl RecordingControl {
        pub fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CameraControl for RecordingControl {
        async fn zoom_to_region(&self, camera: &CameraId, region: ZoomRegion) -> Result<()> {
            self.commands
                .lock()
                .unwrap()
                .push(Command::Zoom(camera.clone(), region, Instant::now()));
            if self.fail_zoom {
                return Err(Error::actuation(camera, "timeout"));
            }
            Ok(())
        }

        async fn goto_preset(&self, camera: &CameraId, preset: u32) -> Result<()> {
            self.commands
                .lock()
                .unwrap()
                .push(Command::Preset(camera.clone(), preset, Instant::now()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Command, RecordingControl};
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox {
            x1: 10.0,
            y1: 20.0,
            x2: 30.0,
            y2: 40.0,
            score: 0.9,
        }
    }

    fn cooldown(control: Arc<RecordingControl>) -> Arc<ActuationCooldown> {
        Arc::new(ActuationCooldown::new(
            control,
            ActuationPolicy {
                cooldown_secs: 60,
                ..ActuationPolicy::default()
            },
        ))
    }

    async fn advance_to(start: Instant, secs: u64) {
        tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_engagement_is_dropped() {
        let control = Arc::new(RecordingControl::default());
        let cd = cooldown(control.clone());
        let cam = CameraId::parse("10.0.0.5").unwrap();
        let hold = Duration::from_secs(300);
        let start = Instant::now();

        assert_eq!(cd.trigger(&cam, &bbox(), hold), TriggerOutcome::Started);
        tokio::task::yield_now().await;
        assert!(cd.is_engaged(&cam));

        advance_to(start, 200).await;
        assert_eq!(cd.trigger(&cam, &bbox(), hold), TriggerOutcome::Suppressed);

        // Returned at 300s, cooldown ends at 360s
        advance_to(start, 330).await;
        assert!(!cd.is_engaged(&cam));
        assert!(cd.is_blocked(&cam));
        assert_eq!(cd.trigger(&cam, &bbox(), hold), TriggerOutcome::Suppressed);

        advance_to(start, 370).await;
        assert_eq!(cd.trigger(&cam, &bbox(), hold), TriggerOutcome::Started);
        tokio::task::yield_now().await;

        let zooms: Vec<_> = control
            .commands()
            .into_iter()
            .filter(|c| matches!(c, Command::Zoom(..)))
            .collect();
        assert_eq!(zooms.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_zooms_holds_and_returns() {
        let control = Arc::new(RecordingControl::default());
        let cd = cooldown(control.clone());
        let cam = CameraId::parse("10.0.0.5").unwrap();
        let start = Instant::now();

        cd.trigger(&cam, &bbox(), Duration::from_secs(300));
        advance_to(start, 301).await;

        let commands = control.commands();
        assert_eq!(commands.len(), 2);
        match (&commands[0], &commands[1]) {
            (Command::Zoom(_, region, zoomed_at), Command::Preset(_, preset, returned_at)) => {
                assert_eq!((region.x1, region.y1, region.x2, region.y2), (40, 140, 120, 280));
                assert_eq!(*preset, 1);
                assert_eq!(*returned_at - *zoomed_at, Duration::from_secs(300));
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_failure_still_returns_and_cools_down() {
        let control = Arc::new(RecordingControl {
            fail_zoom: true,
            ..Default::default()
        });
        let cd = cooldown(control.clone());
        let cam = CameraId::parse("10.0.0.5").unwrap();
        let start = Instant::now();

        cd.trigger(&cam, &bbox(), Duration::from_secs(300));
        advance_to(start, 1).await;

        assert!(matches!(control.commands().last(), Some(Command::Preset(..))));
        assert!(!cd.is_engaged(&cam));
        assert!(cd.is_blocked(&cam));
        advance_to(start, 62).await;
        assert!(!cd.is_blocked(&cam));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cameras_are_independent() {
        let control = Arc::new(RecordingControl::default());
        let cd = cooldown(control);
        let a = CameraId::parse("10.0.0.5").unwrap();
        let b = CameraId::parse("10.0.0.6").unwrap();

        assert_eq!(cd.trigger(&a, &bbox(), Duration::from_secs(60)), TriggerOutcome::Started);
        assert_eq!(cd.trigger(&b, &bbox(), Duration::from_secs(60)), TriggerOutcome::Started);
    }
}

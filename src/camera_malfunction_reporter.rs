//! Camera Malfunction Reporter
//!
//! Escalates long stream outages to the alert channels.
//!
//! ## Rules
//!
//! - An outage starts at the first failed open/read after being Online
//! - Escalate only inside the daily active window
//! - Escalate once the outage lasted at least the disconnect threshold
//! - At most one escalation per notify interval per camera
//!
//! Outage bookkeeping (`OutageTracker`) is owned by the camera's supervisor
//! task, so it needs no locking.

use crate::config_store::{CameraConfig, SupervisorPolicy};
use crate::models::DailyWindow;
use crate::notifier::Notifier;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

/// When an outage becomes worth an alert
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    pub disconnect_threshold: Duration,
    pub notify_interval: Duration,
    pub active_window: DailyWindow,
    pub timezone: Tz,
}

impl EscalationPolicy {
    pub fn from_supervisor(policy: &SupervisorPolicy, timezone: Tz) -> Self {
        Self {
            disconnect_threshold: Duration::seconds(policy.disconnect_threshold_secs as i64),
            notify_interval: Duration::seconds(policy.notify_interval_secs as i64),
            active_window: policy.active_window,
            timezone,
        }
    }

    fn in_active_window(&self, now: DateTime<Utc>) -> bool {
        self.active_window
            .contains(now.with_timezone(&self.timezone).time())
    }
}

/// Per-camera outage state
#[derive(Debug, Default, Clone)]
pub struct OutageTracker {
    disconnect_started_at: Option<DateTime<Utc>>,
    last_notified_at: Option<DateTime<Utc>>,
}

impl OutageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect_started_at(&self) -> Option<DateTime<Utc>> {
        self.disconnect_started_at
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.last_notified_at
    }

    /// Stream is healthy again
    pub fn mark_online(&mut self) {
        self.disconnect_started_at = None;
    }

    /// Record a failed open or read.
    ///
    /// Returns the outage length when an alert is due. The notify time is
    /// recorded here, so the caller sends the alert exactly once.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        policy: &EscalationPolicy,
    ) -> Option<Duration> {
        let started = *self.disconnect_started_at.get_or_insert(now);

        if !policy.in_active_window(now) {
            return None;
        }

        let outage = now - started;
        if outage < policy.disconnect_threshold {
            return None;
        }

        let quiet_long_enough = self
            .last_notified_at
            .map_or(true, |last| now - last > policy.notify_interval);
        if !quiet_long_enough {
            return None;
        }

        self.last_notified_at = Some(now);
        Some(outage)
    }
}

/// Sends outage alerts
pub struct CameraMalfunctionReporter {
    notifier: Arc<dyn Notifier>,
}

impl CameraMalfunctionReporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn offline_message(camera: &CameraConfig, outage: Duration) -> String {
        let location = if camera.location.is_empty() {
            "unknown location"
        } else {
            camera.location.as_str()
        };
        format!(
            "Location: {}\nCamera {} has been disconnected for {} minutes",
            location,
            camera.ip,
            outage.num_minutes()
        )
    }

    /// Send an offline alert without waiting for delivery
    pub fn report_offline(&self, camera: &CameraConfig, outage: Duration) {
        let message = Self::offline_message(camera, outage);
        let notifier = self.notifier.clone();
        let camera_id = camera.ip.clone();

        warn!(
            camera_id = %camera_id,
            outage_minutes = outage.num_minutes(),
            "Camera disconnected past threshold, escalating"
        );

        tokio::spawn(async move {
            match notifier.notify(&message, None).await {
                Ok(()) => info!(camera_id = %camera_id, "Offline alert sent"),
                Err(e) => warn!(camera_id = %camera_id, error = %e, "Offline alert failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CameraId;
    use crate::notifier::testing::RecordingNotifier;
    use chrono::TimeZone;
    use chrono_tz::Asia::Taipei;

    fn policy() -> EscalationPolicy {
        EscalationPolicy::from_supervisor(&SupervisorPolicy::default(), Taipei)
    }

    /// Local Taipei time on a fixed day
    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Taipei
            .with_ymd_and_hms(2024, 5, 1, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Drive the tracker with a failure every retry interval
    fn fail_until(
        tracker: &mut OutageTracker,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        policy: &EscalationPolicy,
    ) -> Vec<DateTime<Utc>> {
        let mut alerts = Vec::new();
        let mut now = from;
        while now <= to {
            if tracker.record_failure(now, policy).is_some() {
                alerts.push(now);
            }
            now += Duration::seconds(10);
        }
        alerts
    }

    #[test]
    fn test_outage_alert_and_notify_interval() {
        let policy = policy();
        let mut tracker = OutageTracker::new();

        // Down 09:00, alert once the 30 minute threshold is reached
        let alerts = fail_until(&mut tracker, at(9, 0, 0), at(9, 40, 0), &policy);
        assert_eq!(alerts, vec![at(9, 30, 0)]);

        // Reconnect at 09:40, drop again at 09:50
        tracker.mark_online();
        let alerts = fail_until(&mut tracker, at(9, 50, 0), at(10, 40, 0), &policy);

        // Threshold reached at 10:20 but the last alert was at 09:30
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0] > at(10, 30, 0));
        assert!(alerts[0] <= at(10, 30, 10));
    }

    #[test]
    fn test_no_alert_outside_active_window() {
        let policy = policy();
        let mut tracker = OutageTracker::new();

        let alerts = fail_until(&mut tracker, at(19, 0, 0), at(23, 0, 0), &policy);
        assert!(alerts.is_empty());
        // Outage start is still tracked
        assert_eq!(tracker.disconnect_started_at(), Some(at(19, 0, 0)));
    }

    #[test]
    fn test_overnight_outage_alerts_when_window_opens() {
        let policy = policy();
        let mut tracker = OutageTracker::new();

        let alerts = fail_until(&mut tracker, at(6, 0, 0), at(7, 5, 0), &policy);
        assert_eq!(alerts, vec![at(7, 0, 0)]);
    }

    #[test]
    fn test_offline_message_uses_location() {
        let mut camera = CameraConfig::new(CameraId::parse("10.0.0.5").unwrap());
        camera.location = "Warehouse A".to_string();
        let message = CameraMalfunctionReporter::offline_message(&camera, Duration::minutes(30));
        assert!(message.contains("Warehouse A"));
        assert!(message.contains("10.0.0.5"));
        assert!(message.contains("30 minutes"));
    }

    #[tokio::test]
    async fn test_report_offline_reaches_channel() {
        let recorder = Arc::new(RecordingNotifier::default());
        let reporter = CameraMalfunctionReporter::new(recorder.clone());
        let camera = CameraConfig::new(CameraId::parse("10.0.0.5").unwrap());

        reporter.report_offline(&camera, Duration::minutes(31));

        for _ in 0..50 {
            if !recorder.messages().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(recorder.messages().len(), 1);
    }
}

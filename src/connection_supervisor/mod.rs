//! ConnectionSupervisor - keeps one camera's stream alive
//!
//! ## Responsibilities
//!
//! - Open the camera stream and keep reading frames into the frame slot
//! - Run the sampler tasks only while the stream is Online
//! - Retry forever at a fixed interval after any open or read failure
//! - Escalate long outages through `CameraMalfunctionReporter`
//!
//! The supervisor task is the only writer of its camera's connection
//! state and outage bookkeeping.

use crate::camera_malfunction_reporter::{CameraMalfunctionReporter, EscalationPolicy, OutageTracker};
use crate::camera_status_tracker::{CameraStatusEvent, ConnectionCell, ConnectionState};
use crate::config_store::CameraConfig;
use crate::error::Error;
use crate::frame_sampler::FrameSampler;
use crate::rtsp_manager::{FrameStream, VideoTransport};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ConnectionSupervisor {
    camera: Arc<CameraConfig>,
    stream_url: String,
    transport: Arc<dyn VideoTransport>,
    sampler: Arc<FrameSampler>,
    cell: Arc<ConnectionCell>,
    reporter: Arc<CameraMalfunctionReporter>,
    escalation: EscalationPolicy,
    retry_interval: Duration,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: Arc<CameraConfig>,
        stream_url: String,
        transport: Arc<dyn VideoTransport>,
        sampler: Arc<FrameSampler>,
        cell: Arc<ConnectionCell>,
        reporter: Arc<CameraMalfunctionReporter>,
        escalation: EscalationPolicy,
        retry_interval: Duration,
    ) -> Self {
        Self {
            camera,
            stream_url,
            transport,
            sampler,
            cell,
            reporter,
            escalation,
            retry_interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Supervise forever
    pub async fn run(self) {
        let mut outage = OutageTracker::new();
        info!(camera_id = %self.camera.ip, location = %self.camera.location, "Supervisor started");

        loop {
            self.set_state(ConnectionState::Connecting);

            let failure = match self.transport.open(&self.camera.ip, &self.stream_url).await {
                Ok(mut stream) => {
                    self.set_state(ConnectionState::Online);
                    outage.mark_online();

                    let tasks = self.sampler.start();
                    let failure = self.pump(stream.as_mut()).await;
                    drop(tasks);
                    self.sampler.slot().clear();
                    failure
                }
                Err(e) => e,
            };

            warn!(
                camera_id = %self.camera.ip,
                stage = "transport",
                error = %failure,
                "Stream unavailable"
            );
            self.set_state(ConnectionState::Disconnected);

            if let Some(length) = outage.record_failure(Utc::now(), &self.escalation) {
                self.reporter.report_offline(&self.camera, length);
            }

            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Publish frames until the stream fails; returns the failure
    async fn pump(&self, stream: &mut dyn FrameStream) -> Error {
        let mut frames: u64 = 0;
        loop {
            match stream.next_frame().await {
                Ok(Some(frame)) => {
                    frames += 1;
                    self.sampler.slot().publish(frame);
                }
                Ok(None) => {
                    debug!(camera_id = %self.camera.ip, frames, "Stream ended");
                    return Error::transport(&self.camera.ip, "stream ended");
                }
                Err(e) => return e,
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.cell.get();
        let event = self.cell.transition(next);
        if prev != next {
            info!(
                camera_id = %self.camera.ip,
                from = ?prev,
                to = ?next,
                at = %Utc::now(),
                "Connection state changed"
            );
        }
        match event {
            Some(CameraStatusEvent::Lost) => warn!(camera_id = %self.camera.ip, "Camera lost"),
            Some(CameraStatusEvent::Recovered) => info!(camera_id = %self.camera.ip, "Camera recovered"),
            Some(CameraStatusEvent::InitialLost) => {
                warn!(camera_id = %self.camera.ip, "Camera unreachable since startup")
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::camera_status_tracker::CameraStatusTracker;
    use crate::config_store::{JitterRange, SupervisorPolicy};
    use crate::frame_sampler::{OutboundSample, SampleSink, SamplerSettings};
    use crate::models::{CameraId, DailyWindow};
    use crate::notifier::testing::RecordingNotifier;
    use crate::rtsp_manager::Frame;
    use crate::snapshot_service::testing::{scratch_dir, solid_jpeg};
    use crate::snapshot_service::SnapshotService;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Each open pops a script: `None` fails, `Some(n)` yields n frames then ends
    struct ScriptedTransport {
        script: Mutex<VecDeque<Option<usize>>>,
        opens: Mutex<usize>,
    }

    struct CountedStream {
        remaining: usize,
    }

    #[async_trait]
    impl FrameStream for CountedStream {
        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Some(Frame::new(solid_jpeg(8, 8))))
        }
    }

    #[async_trait]
    impl VideoTransport for ScriptedTransport {
        async fn open(&self, camera_id: &CameraId, _url: &str) -> Result<Box<dyn FrameStream>> {
            *self.opens.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(n) => Ok(Box::new(CountedStream { remaining: n })),
                None => Err(Error::transport(camera_id, "connection refused")),
            }
        }
    }

    struct NullSink;

    #[async_trait]
    impl SampleSink for NullSink {
        async fn deliver(&self, _sample: OutboundSample) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        sampler: Arc<FrameSampler>,
        cell: Arc<ConnectionCell>,
        notifier: Arc<RecordingNotifier>,
        supervisor: ConnectionSupervisor,
    }

    async fn harness(script: Vec<Option<usize>>, threshold_secs: i64) -> Harness {
        let camera = Arc::new(CameraConfig::new(CameraId::parse("10.0.0.5").unwrap()));
        let transport = Arc::new(ScriptedTransport {
            script: Mutex::new(script.into()),
            opens: Mutex::new(0),
        });
        let snapshots = Arc::new(
            SnapshotService::new(scratch_dir("supervisor"), chrono_tz::Asia::Taipei)
                .await
                .unwrap(),
        );
        let sampler = Arc::new(FrameSampler::new(
            camera.clone(),
            snapshots,
            Arc::new(NullSink),
            SamplerSettings {
                snapshot_interval: Duration::from_secs(1800),
                upload_base: Duration::ZERO,
                upload_jitter: JitterRange { min_secs: 10, max_secs: 30 },
                initial_upload_delay: Duration::from_secs(60),
                jpeg_quality: 40,
            },
        ));
        let tracker = CameraStatusTracker::new([&camera.ip]);
        let cell = tracker.cell(&camera.ip).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());

        let mut escalation = EscalationPolicy::from_supervisor(&SupervisorPolicy::default(), chrono_tz::Asia::Taipei);
        escalation.disconnect_threshold = chrono::Duration::seconds(threshold_secs);
        escalation.active_window = DailyWindow::new(
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap(),
        );

        let supervisor = ConnectionSupervisor::new(
            camera,
            "rtsp://10.0.0.5:554/live/0/main".to_string(),
            transport.clone(),
            sampler.clone(),
            cell.clone(),
            Arc::new(CameraMalfunctionReporter::new(notifier.clone())),
            escalation,
            Duration::from_secs(10),
        );
        Harness {
            transport,
            sampler,
            cell,
            notifier,
            supervisor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_at_fixed_interval() {
        let h = harness(vec![None; 4], 3600).await;
        let transport = h.transport.clone();
        let cell = h.cell.clone();

        let handle = h.supervisor.spawn();
        tokio::time::sleep(Duration::from_secs(35)).await;

        // Attempts at 0, 10, 20, 30
        assert_eq!(*transport.opens.lock().unwrap(), 4);
        assert_eq!(cell.get(), ConnectionState::Disconnected);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_publishes_frames_and_clears_on_loss() {
        let h = harness(vec![Some(50)], 3600).await;
        let cell = h.cell.clone();
        let sampler = h.sampler.clone();

        let handle = h.supervisor.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cell.get(), ConnectionState::Online);
        assert!(sampler.slot().latest().is_some());

        // 50 frames at 100ms, then the stream ends
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_ne!(cell.get(), ConnectionState::Online);
        assert!(sampler.slot().latest().is_none());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_escalates_once() {
        let h = harness(vec![None; 20], 0).await;
        let notifier = h.notifier.clone();

        let handle = h.supervisor.spawn();
        tokio::time::sleep(Duration::from_secs(60)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        // Threshold reached on the first failure; the notify interval holds the rest back
        assert_eq!(notifier.messages().len(), 1);
        handle.abort();
    }
}

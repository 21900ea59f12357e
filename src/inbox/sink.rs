//! Local sample delivery: write to the inbox, then submit

use super::Inbox;
use crate::error::Result;
use crate::frame_sampler::{OutboundSample, SampleSink};
use crate::group_aggregator::GroupDispatcher;
use crate::models::SampleEnvelope;
use async_trait::async_trait;
use std::sync::Arc;

pub struct InboxSink {
    inbox: Arc<Inbox>,
    dispatcher: Arc<GroupDispatcher>,
}

impl InboxSink {
    pub fn new(inbox: Arc<Inbox>, dispatcher: Arc<GroupDispatcher>) -> Self {
        Self { inbox, dispatcher }
    }
}

#[async_trait]
impl SampleSink for InboxSink {
    async fn deliver(&self, sample: OutboundSample) -> Result<()> {
        let path = self.inbox.store(&sample.file_name, &sample.jpeg).await?;
        let envelope = SampleEnvelope::new(sample.camera, path, sample.captured_at)
            .with_actuation(sample.actuation);
        self.dispatcher.submit(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group_aggregator::{FlushedGroup, GroupAggregator, GroupProcessor};
    use crate::models::{ActuationMarker, CameraId};
    use crate::snapshot_service::testing::scratch_dir;
    use chrono::Utc;
    use std::time::Duration;

    struct Idle;

    #[async_trait]
    impl GroupProcessor for Idle {
        async fn process(&self, _group: FlushedGroup) {}
    }

    #[tokio::test]
    async fn test_delivery_stores_and_submits_with_marker() {
        let dir = scratch_dir("inbox_sink");
        let inbox = Arc::new(Inbox::new(&dir).await.unwrap());
        let aggregator = Arc::new(GroupAggregator::new(10, Duration::from_secs(60)));
        let dispatcher = Arc::new(GroupDispatcher::new(aggregator.clone(), Arc::new(Idle)));
        let sink = InboxSink::new(inbox, dispatcher.clone());
        let camera = CameraId::parse("10.0.0.5").unwrap();

        sink.deliver(OutboundSample {
            camera: camera.clone(),
            file_name: "10_0_0_5_2024_05_01_09_30_00_focus5min.jpg".to_string(),
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            captured_at: Utc::now(),
            actuation: Some(ActuationMarker { hold_minutes: 5 }),
        })
        .await
        .unwrap();

        let path = dir.join("10_0_0_5_2024_05_01_09_30_00_focus5min.jpg");
        assert!(path.exists());
        assert!(dispatcher.is_known(&path));
        assert_eq!(aggregator.pending_len(&camera), 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}

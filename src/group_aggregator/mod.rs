//! GroupAggregator - per-camera batching of sampled frames
//!
//! ## Responsibilities
//!
//! - Append samples to the camera's pending group
//! - Flush on size (`len >= target_size`) or age
//!   (`now - first_member_at >= target_size * unit_wait`)
//! - Re-validate members still exist before flushing
//! - Hand flushed groups to a FIFO worker per camera (`GroupDispatcher`)
//!
//! The group lock is held for list mutation and a file existence check
//! only; detection and uploads run in the workers.

mod dispatcher;
mod types;

pub use dispatcher::{GroupDispatcher, GroupProcessor};
pub use types::*;

use crate::models::{CameraId, SampleEnvelope};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Pending groups of all cameras
pub struct GroupAggregator {
    groups: Mutex<HashMap<CameraId, PendingGroup>>,
    default_target: usize,
    targets: HashMap<CameraId, usize>,
    unit_wait: Duration,
    sequence: AtomicU64,
}

impl GroupAggregator {
    pub fn new(default_target: usize, unit_wait: Duration) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            default_target: default_target.max(1),
            targets: HashMap::new(),
            unit_wait,
            sequence: AtomicU64::new(0),
        }
    }

    /// Per-camera target size overrides
    pub fn with_targets(mut self, targets: HashMap<CameraId, usize>) -> Self {
        self.targets = targets;
        self
    }

    pub fn target_for(&self, camera: &CameraId) -> usize {
        self.targets
            .get(camera)
            .copied()
            .unwrap_or(self.default_target)
    }

    pub fn unit_wait(&self) -> Duration {
        self.unit_wait
    }

    pub fn ingest(&self, sample: SampleEnvelope) -> IngestOutcome {
        self.ingest_at(sample, Utc::now())
    }

    /// Append a sample and flush its group if a trigger is due
    pub fn ingest_at(&self, sample: SampleEnvelope, now: DateTime<Utc>) -> IngestOutcome {
        let camera = sample.camera.clone();
        let target = self.target_for(&camera);

        let mut groups = self.lock_groups();
        let group = groups
            .entry(camera.clone())
            .or_insert_with(|| PendingGroup::new(target));
        group.push(sample, now);

        match group.due(now, self.unit_wait) {
            None => IngestOutcome::Pending { len: group.len() },
            Some(trigger) => self.flush_locked(&camera, group, trigger, now, |p| p.exists()),
        }
    }

    /// Flush every group whose time trigger is due
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Sweep {
        self.sweep_with(now, |p| p.exists())
    }

    fn sweep_with(&self, now: DateTime<Utc>, exists: impl Fn(&Path) -> bool + Copy) -> Sweep {
        let mut groups = self.lock_groups();
        let mut sweep = Sweep::default();

        for (camera, group) in groups.iter_mut() {
            let Some(trigger) = group.due(now, self.unit_wait) else {
                continue;
            };
            let (batch, vanished) = self
                .flush_locked(camera, group, trigger, now, exists)
                .into_parts();
            sweep.flushed.extend(batch);
            sweep.vanished.extend(vanished);
        }

        sweep.flushed.sort_by_key(|g| g.sequence);
        sweep
    }

    fn flush_locked(
        &self,
        camera: &CameraId,
        group: &mut PendingGroup,
        trigger: FlushTrigger,
        now: DateTime<Utc>,
        exists: impl Fn(&Path) -> bool,
    ) -> IngestOutcome {
        match group.take_validated(trigger, exists) {
            FlushDecision::Flush { members, vanished } => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    camera_id = %camera,
                    stage = "flushed",
                    group = sequence,
                    trigger = ?trigger,
                    members = members.len(),
                    "Group flushed"
                );
                IngestOutcome::Flushed {
                    group: FlushedGroup {
                        camera: camera.clone(),
                        sequence,
                        trigger,
                        members,
                        flushed_at: now,
                    },
                    vanished,
                }
            }
            FlushDecision::Defer { remaining, vanished } => {
                tracing::debug!(
                    camera_id = %camera,
                    stage = "collecting",
                    remaining,
                    vanished = vanished.len(),
                    "Members vanished, group below target"
                );
                IngestOutcome::Deferred { remaining, vanished }
            }
            FlushDecision::Emptied { vanished } => {
                tracing::info!(
                    camera_id = %camera,
                    stage = "collecting",
                    "No group member left on disk, group reset"
                );
                IngestOutcome::Emptied { vanished }
            }
        }
    }

    pub fn pending_len(&self, camera: &CameraId) -> usize {
        self.lock_groups().get(camera).map_or(0, |g| g.len())
    }

    /// Drop every pending sample, returning how many were dropped
    pub fn clear_all(&self) -> usize {
        let mut groups = self.lock_groups();
        let dropped = groups.values().map(PendingGroup::len).sum();
        for group in groups.values_mut() {
            group.reset();
        }
        dropped
    }

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, HashMap<CameraId, PendingGroup>> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_service::testing::scratch_dir;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"jpg").unwrap();
        path
    }

    fn sample(camera: &str, path: PathBuf, at: DateTime<Utc>) -> SampleEnvelope {
        SampleEnvelope::new(CameraId::parse(camera).unwrap(), path, at)
    }

    #[test]
    fn test_groups_are_per_camera() {
        let dir = scratch_dir("agg_cam");
        let agg = GroupAggregator::new(2, Duration::from_secs(60));

        let a = touch(&dir, "a1.jpg");
        let b = touch(&dir, "b1.jpg");
        assert!(matches!(
            agg.ingest_at(sample("10.0.0.1", a, t(0)), t(0)),
            IngestOutcome::Pending { len: 1 }
        ));
        assert!(matches!(
            agg.ingest_at(sample("10.0.0.2", b, t(1)), t(1)),
            IngestOutcome::Pending { len: 1 }
        ));

        let a2 = touch(&dir, "a2.jpg");
        match agg.ingest_at(sample("10.0.0.1", a2, t(2)), t(2)) {
            IngestOutcome::Flushed { group, .. } => {
                assert_eq!(group.camera.as_str(), "10.0.0.1");
                assert_eq!(group.members.len(), 2);
                assert_eq!(group.trigger, FlushTrigger::Size);
            }
            other => panic!("expected flush, got {other:?}"),
        }
        assert_eq!(agg.pending_len(&CameraId::parse("10.0.0.2").unwrap()), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    /// Ten-sample target, three samples, no more arrive
    #[test]
    fn test_time_trigger_flushes_partial_group() {
        let dir = scratch_dir("agg_time");
        let agg = GroupAggregator::new(10, Duration::from_secs(60));
        for (n, secs) in [0, 60, 120].into_iter().enumerate() {
            let path = touch(&dir, &format!("{n}.jpg"));
            agg.ingest_at(sample("10.0.0.1", path, t(secs)), t(secs));
        }

        assert!(agg.sweep_at(t(599)).flushed.is_empty());
        let flushed = agg.sweep_at(t(600)).flushed;
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].members.len(), 3);
        assert_eq!(flushed[0].trigger, FlushTrigger::Time);

        // Flushed exactly once
        assert!(agg.sweep_at(t(1200)).flushed.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_flushed_groups_never_exceed_target() {
        let dir = scratch_dir("agg_bound");
        let agg = GroupAggregator::new(3, Duration::from_secs(60));
        let mut flushed = Vec::new();

        for n in 0..10 {
            let path = touch(&dir, &format!("{n}.jpg"));
            if let IngestOutcome::Flushed { group: g, .. } = agg.ingest_at(sample("10.0.0.1", path, t(n)), t(n)) {
                flushed.push(g);
            }
        }

        assert_eq!(flushed.len(), 3);
        assert!(flushed.iter().all(|g| g.members.len() <= 3));
        assert_eq!(agg.pending_len(&CameraId::parse("10.0.0.1").unwrap()), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_vanished_member_defers_size_flush() {
        let dir = scratch_dir("agg_vanish");
        let agg = GroupAggregator::new(3, Duration::from_secs(60));

        let p0 = touch(&dir, "0.jpg");
        let p1 = touch(&dir, "1.jpg");
        agg.ingest_at(sample("10.0.0.1", p0, t(0)), t(0));
        agg.ingest_at(sample("10.0.0.1", p1.clone(), t(1)), t(1));
        std::fs::remove_file(&p1).unwrap();

        let p2 = touch(&dir, "2.jpg");
        match agg.ingest_at(sample("10.0.0.1", p2, t(2)), t(2)) {
            IngestOutcome::Deferred { remaining, vanished } => {
                assert_eq!(remaining, 2);
                assert_eq!(vanished, vec![p1]);
            }
            other => panic!("expected deferral, got {other:?}"),
        }

        let p3 = touch(&dir, "3.jpg");
        assert!(matches!(
            agg.ingest_at(sample("10.0.0.1", p3, t(3)), t(3)),
            IngestOutcome::Flushed { .. }
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_sweep_with_nothing_on_disk_resets_group() {
        let agg = GroupAggregator::new(5, Duration::from_secs(1));
        agg.ingest_at(sample("10.0.0.1", PathBuf::from("/nope/0.jpg"), t(0)), t(0));

        let sweep = agg.sweep_with(t(10), |_| false);
        assert!(sweep.flushed.is_empty());
        assert_eq!(sweep.vanished, vec![PathBuf::from("/nope/0.jpg")]);
        assert_eq!(agg.pending_len(&CameraId::parse("10.0.0.1").unwrap()), 0);
    }

    #[test]
    fn test_target_override_and_clear_all() {
        let cam = CameraId::parse("10.0.0.9").unwrap();
        let agg = GroupAggregator::new(10, Duration::from_secs(60))
            .with_targets(HashMap::from([(cam.clone(), 1)]));
        assert_eq!(agg.target_for(&cam), 1);

        agg.ingest_at(sample("10.0.0.1", PathBuf::from("/x/0.jpg"), t(0)), t(0));
        agg.ingest_at(sample("10.0.0.2", PathBuf::from("/x/1.jpg"), t(0)), t(0));
        assert_eq!(agg.clear_all(), 2);
        assert_eq!(agg.pending_len(&CameraId::parse("10.0.0.1").unwrap()), 0);
    }
}

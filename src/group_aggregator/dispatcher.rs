//! Group dispatch
//!
//! Ingestion only appends and returns. Flushed groups go to one worker
//! queue per camera, so a camera's groups are processed in flush order
//! while different cameras proceed concurrently.

use super::{FlushedGroup, GroupAggregator};
use crate::models::{CameraId, SampleEnvelope};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Consumes flushed groups
#[async_trait]
pub trait GroupProcessor: Send + Sync {
    async fn process(&self, group: FlushedGroup);
}

type KnownPaths = Arc<Mutex<HashSet<PathBuf>>>;

pub struct GroupDispatcher {
    aggregator: Arc<GroupAggregator>,
    processor: Arc<dyn GroupProcessor>,
    workers: Mutex<HashMap<CameraId, mpsc::UnboundedSender<FlushedGroup>>>,
    /// Paths submitted and not yet processed
    known: KnownPaths,
}

impl GroupDispatcher {
    pub fn new(aggregator: Arc<GroupAggregator>, processor: Arc<dyn GroupProcessor>) -> Self {
        Self {
            aggregator,
            processor,
            workers: Mutex::new(HashMap::new()),
            known: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn aggregator(&self) -> &Arc<GroupAggregator> {
        &self.aggregator
    }

    /// Has this path been submitted and not processed yet
    pub fn is_known(&self, path: &Path) -> bool {
        lock(&self.known).contains(path)
    }

    /// Add a sample to its camera's group.
    ///
    /// Returns `false` for a path that is already pending.
    pub fn submit(&self, sample: SampleEnvelope) -> bool {
        if !lock(&self.known).insert(sample.path.clone()) {
            tracing::debug!(
                camera_id = %sample.camera,
                path = %sample.path.display(),
                "Sample already pending, ignored"
            );
            return false;
        }

        tracing::debug!(
            camera_id = %sample.camera,
            stage = "collecting",
            path = %sample.path.display(),
            "Sample ingested"
        );

        let (flushed, vanished) = self.aggregator.ingest(sample).into_parts();
        forget(&self.known, &vanished);
        if let Some(group) = flushed {
            self.dispatch(group);
        }
        true
    }

    /// Apply the time trigger to all groups
    pub fn sweep(&self) -> usize {
        let sweep = self.aggregator.sweep_at(Utc::now());
        forget(&self.known, &sweep.vanished);
        let n = sweep.flushed.len();
        for group in sweep.flushed {
            self.dispatch(group);
        }
        n
    }

    /// Periodic sweep task
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.sweep();
            }
        })
    }

    /// Drop all pending samples (inbox purge, workstation restart)
    pub fn clear_pending(&self) -> usize {
        let dropped = self.aggregator.clear_all();
        lock(&self.known).clear();
        tracing::info!(dropped, "Pending groups cleared");
        dropped
    }

    fn dispatch(&self, group: FlushedGroup) {
        let mut workers = lock(&self.workers);
        let sender = workers
            .entry(group.camera.clone())
            .or_insert_with(|| self.spawn_worker(&group.camera));

        if let Err(mpsc::error::SendError(group)) = sender.send(group) {
            // Worker gone; start a fresh one for this camera
            let camera = group.camera.clone();
            let sender = self.spawn_worker(&camera);
            if let Err(mpsc::error::SendError(group)) = sender.send(group) {
                tracing::error!(
                    camera_id = %camera,
                    group = group.sequence,
                    members = group.members.len(),
                    "No group worker available, group dropped"
                );
                let paths: Vec<PathBuf> = group.members.into_iter().map(|m| m.path).collect();
                forget(&self.known, &paths);
            }
            workers.insert(camera, sender);
        }
    }

    fn spawn_worker(&self, camera: &CameraId) -> mpsc::UnboundedSender<FlushedGroup> {
        let (tx, mut rx) = mpsc::unbounded_channel::<FlushedGroup>();
        let processor = self.processor.clone();
        let known = self.known.clone();
        let camera = camera.clone();

        tokio::spawn(async move {
            tracing::debug!(camera_id = %camera, "Group worker started");
            while let Some(group) = rx.recv().await {
                let paths: Vec<PathBuf> = group.members.iter().map(|m| m.path.clone()).collect();
                processor.process(group).await;
                forget(&known, &paths);
            }
        });

        tx
    }
}

fn forget(known: &Mutex<HashSet<PathBuf>>, paths: &[PathBuf]) {
    if paths.is_empty() {
        return;
    }
    let mut known = lock(known);
    for path in paths {
        known.remove(path);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

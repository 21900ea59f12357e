//! Inbox polling
//!
//! Files found in the inbox that were not submitted yet are parsed with the
//! legacy filename convention and submitted. Existing files are picked up
//! by the first scan after startup.

use super::Inbox;
use crate::config_store::HousekeepingPolicy;
use crate::group_aggregator::GroupDispatcher;
use crate::models::SampleEnvelope;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;

pub struct InboxWatcher {
    inbox: Arc<Inbox>,
    dispatcher: Arc<GroupDispatcher>,
    timezone: Tz,
    housekeeping: HousekeepingPolicy,
    /// Files that carry no camera identity, reported once
    rejected: Mutex<HashSet<PathBuf>>,
    running: Arc<RwLock<bool>>,
}

impl InboxWatcher {
    pub fn new(
        inbox: Arc<Inbox>,
        dispatcher: Arc<GroupDispatcher>,
        timezone: Tz,
        housekeeping: HousekeepingPolicy,
    ) -> Self {
        Self {
            inbox,
            dispatcher,
            timezone,
            housekeeping,
            rejected: Mutex::new(HashSet::new()),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the polling loop
    pub async fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Inbox watcher already running");
                return;
            }
            *running = true;
        }

        let period = Duration::from_secs(self.housekeeping.inbox_poll_secs.max(1));
        tracing::info!(dir = %self.inbox.dir().display(), period_secs = period.as_secs(), "Starting inbox watcher");

        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if !*this.running.read().await {
                    break;
                }
                this.scan_once().await;
            }
            tracing::info!("Inbox watcher stopped");
        });
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Purge if oversized, then submit unseen files; returns submissions
    pub async fn scan_once(&self) -> usize {
        if self.purge_if_needed().await {
            return 0;
        }

        let images = match self.inbox.list_images().await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(dir = %self.inbox.dir().display(), error = %e, "Inbox listing failed");
                return 0;
            }
        };

        let mut submitted = 0;
        for path in images {
            if self.dispatcher.is_known(&path) || self.lock_rejected().contains(&path) {
                continue;
            }

            let fallback = modified_at(&path).await.unwrap_or_else(Utc::now);
            match SampleEnvelope::from_legacy_path(&path, &self.timezone, fallback) {
                Ok(envelope) => {
                    if self.dispatcher.submit(envelope) {
                        submitted += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Inbox file ignored");
                    self.lock_rejected().insert(path);
                }
            }
        }
        submitted
    }

    /// Purge the inbox and pending groups when over the file limit
    pub async fn purge_if_needed(&self) -> bool {
        let count = match self.inbox.list_images().await {
            Ok(images) => images.len(),
            Err(_) => return false,
        };
        if count <= self.housekeeping.max_inbox_files {
            return false;
        }

        tracing::warn!(
            count,
            limit = self.housekeeping.max_inbox_files,
            "Inbox over limit, purging"
        );
        if let Err(e) = self.inbox.purge().await {
            tracing::error!(error = %e, "Inbox purge failed");
        }
        self.dispatcher.clear_pending();
        self.lock_rejected().clear();
        true
    }

    fn lock_rejected(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.rejected.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn modified_at(path: &std::path::Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

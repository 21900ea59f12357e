//! GroupAggregator data types

use crate::models::{CameraId, SampleEnvelope};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Why a group was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// Reached target size
    Size,
    /// Oldest member waited `target_size * unit_wait`
    Time,
}

/// Samples of one camera collected so far
#[derive(Debug, Clone)]
pub struct PendingGroup {
    members: Vec<SampleEnvelope>,
    first_member_at: Option<DateTime<Utc>>,
    target_size: usize,
}

/// Result of re-validating a due group.
///
/// `vanished` lists the members dropped because their file is gone.
#[derive(Debug, PartialEq)]
pub enum FlushDecision {
    /// Members handed out, group reset
    Flush {
        members: Vec<SampleEnvelope>,
        vanished: Vec<PathBuf>,
    },
    /// Too few members survived a size trigger, kept waiting
    Defer {
        remaining: usize,
        vanished: Vec<PathBuf>,
    },
    /// No member survived, group reset
    Emptied { vanished: Vec<PathBuf> },
}

impl PendingGroup {
    pub fn new(target_size: usize) -> Self {
        Self {
            members: Vec::new(),
            first_member_at: None,
            target_size: target_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn first_member_at(&self) -> Option<DateTime<Utc>> {
        self.first_member_at
    }

    pub fn members(&self) -> &[SampleEnvelope] {
        &self.members
    }

    pub fn push(&mut self, sample: SampleEnvelope, now: DateTime<Utc>) {
        if self.members.is_empty() {
            self.first_member_at = Some(now);
        }
        self.members.push(sample);
    }

    /// Maximum wait before the time trigger fires
    pub fn max_wait(&self, unit_wait: Duration) -> Duration {
        unit_wait.saturating_mul(self.target_size as u32)
    }

    /// Which trigger, if any, is due at `now`
    pub fn due(&self, now: DateTime<Utc>, unit_wait: Duration) -> Option<FlushTrigger> {
        if self.members.is_empty() {
            return None;
        }
        if self.members.len() >= self.target_size {
            return Some(FlushTrigger::Size);
        }

        let first = self.first_member_at?;
        let waited = (now - first).to_std().unwrap_or(Duration::ZERO);
        (waited >= self.max_wait(unit_wait)).then_some(FlushTrigger::Time)
    }

    /// Drop vanished members, then flush, defer or reset.
    ///
    /// A size trigger needs a full group after validation. A time trigger
    /// flushes whatever survived.
    pub fn take_validated(
        &mut self,
        trigger: FlushTrigger,
        exists: impl Fn(&Path) -> bool,
    ) -> FlushDecision {
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.members)
            .into_iter()
            .partition(|m| exists(&m.path));
        self.members = kept;
        let vanished: Vec<PathBuf> = gone.into_iter().map(|m| m.path).collect();

        if self.members.is_empty() {
            self.reset();
            return FlushDecision::Emptied { vanished };
        }

        if trigger == FlushTrigger::Size && self.members.len() < self.target_size {
            return FlushDecision::Defer {
                remaining: self.members.len(),
                vanished,
            };
        }

        let take = self.members.len().min(self.target_size);
        let flushed: Vec<_> = self.members.drain(..take).collect();
        // Overflow beyond one group starts the next group
        if self.members.is_empty() {
            self.first_member_at = None;
        }
        FlushDecision::Flush {
            members: flushed,
            vanished,
        }
    }

    pub fn reset(&mut self) {
        self.members.clear();
        self.first_member_at = None;
    }
}

/// A batch handed to selection
#[derive(Debug, Clone)]
pub struct FlushedGroup {
    pub camera: CameraId,
    /// Monotonic per process, for logs
    pub sequence: u64,
    pub trigger: FlushTrigger,
    pub members: Vec<SampleEnvelope>,
    pub flushed_at: DateTime<Utc>,
}

/// What happened to an ingested sample's group
#[derive(Debug)]
pub enum IngestOutcome {
    /// Still collecting
    Pending { len: usize },
    /// The sample completed a group
    Flushed {
        group: FlushedGroup,
        vanished: Vec<PathBuf>,
    },
    /// Size reached but members vanished; waiting for more
    Deferred {
        remaining: usize,
        vanished: Vec<PathBuf>,
    },
    /// Every member vanished
    Emptied { vanished: Vec<PathBuf> },
}

impl IngestOutcome {
    /// The flushed group, if any, and the paths dropped from the group
    pub fn into_parts(self) -> (Option<FlushedGroup>, Vec<PathBuf>) {
        match self {
            Self::Pending { .. } => (None, Vec::new()),
            Self::Flushed { group, vanished } => (Some(group), vanished),
            Self::Deferred { vanished, .. } | Self::Emptied { vanished } => (None, vanished),
        }
    }
}

/// Groups flushed by one sweep
#[derive(Debug, Default)]
pub struct Sweep {
    pub flushed: Vec<FlushedGroup>,
    pub vanished: Vec<PathBuf>,
}

//! Upload ledger
//!
//! Process-wide record of artifact identifiers. An identifier is claimed
//! before its upload starts; a claimed or uploaded identifier is never
//! enqueued again. Failed uploads release their claim.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    InFlight,
    Uploaded,
}

#[derive(Debug, Default)]
pub struct UploadLedger {
    entries: Mutex<HashMap<String, LedgerState>>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an artifact for upload; `false` if already claimed or uploaded
    pub fn claim(&self, id: &str) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.to_string(), LedgerState::InFlight);
        true
    }

    pub fn mark_uploaded(&self, id: &str) {
        self.lock().insert(id.to_string(), LedgerState::Uploaded);
    }

    /// Drop an in-flight claim so a later publish may retry it
    pub fn release(&self, id: &str) {
        let mut entries = self.lock();
        if entries.get(id) == Some(&LedgerState::InFlight) {
            entries.remove(id);
        }
    }

    pub fn state(&self, id: &str) -> Option<LedgerState> {
        self.lock().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LedgerState>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Camera Status Tracker
//!
//! Per-camera connection state. Each camera's supervisor is the only
//! writer of its cell; everyone else reads an atomic snapshot.
//! Transitions are returned to the writer so that only changes are logged.

use crate::models::CameraId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Camera connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Online,
}

impl ConnectionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Online => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Online,
            _ => Self::Disconnected,
        }
    }
}

/// Camera status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Stream went from Online to Disconnected
    Lost,
    /// Stream came back Online after an outage
    Recovered,
    /// First connection attempt failed
    InitialLost,
}

/// Single camera's state cell
#[derive(Debug)]
pub struct ConnectionCell {
    state: AtomicU8,
    /// Has the camera ever been Online
    seen_online: AtomicBool,
    initial_loss_reported: AtomicBool,
}

impl ConnectionCell {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.to_u8()),
            seen_online: AtomicBool::new(false),
            initial_loss_reported: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store a new state and report the transition, if any
    pub fn transition(&self, next: ConnectionState) -> Option<CameraStatusEvent> {
        let prev = ConnectionState::from_u8(self.state.swap(next.to_u8(), Ordering::AcqRel));

        match (prev, next) {
            (ConnectionState::Online, ConnectionState::Disconnected) => Some(CameraStatusEvent::Lost),
            (p, ConnectionState::Online) if p != ConnectionState::Online => {
                let was_seen = self.seen_online.swap(true, Ordering::AcqRel);
                was_seen.then_some(CameraStatusEvent::Recovered)
            }
            (ConnectionState::Connecting, ConnectionState::Disconnected)
                if !self.seen_online.load(Ordering::Acquire)
                    && !self.initial_loss_reported.swap(true, Ordering::AcqRel) =>
            {
                Some(CameraStatusEvent::InitialLost)
            }
            _ => None,
        }
    }
}

/// Connection states of the whole fleet
pub struct CameraStatusTracker {
    cells: HashMap<CameraId, Arc<ConnectionCell>>,
}

impl CameraStatusTracker {
    /// Create a tracker for a fixed set of cameras
    pub fn new<'a>(cameras: impl IntoIterator<Item = &'a CameraId>) -> Self {
        let cells = cameras
            .into_iter()
            .map(|id| (id.clone(), Arc::new(ConnectionCell::new())))
            .collect();
        Self { cells }
    }

    /// Writer handle for one camera's supervisor
    pub fn cell(&self, camera_id: &CameraId) -> Option<Arc<ConnectionCell>> {
        self.cells.get(camera_id).cloned()
    }

    pub fn get(&self, camera_id: &CameraId) -> Option<ConnectionState> {
        self.cells.get(camera_id).map(|c| c.get())
    }

    /// Snapshot of all cameras
    pub fn snapshot(&self) -> Vec<(CameraId, ConnectionState)> {
        let mut all: Vec<_> = self
            .cells
            .iter()
            .map(|(id, cell)| (id.clone(), cell.get()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn online_count(&self) -> usize {
        self.cells
            .values()
            .filter(|c| c.get() == ConnectionState::Online)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (CameraStatusTracker, CameraId) {
        let id = CameraId::parse("10.0.0.5").unwrap();
        (CameraStatusTracker::new([&id]), id)
    }

    #[test]
    fn test_initial_failure_reports_initial_lost() {
        let (tracker, id) = tracker();
        let cell = tracker.cell(&id).unwrap();

        assert_eq!(cell.transition(ConnectionState::Connecting), None);
        assert_eq!(
            cell.transition(ConnectionState::Disconnected),
            Some(CameraStatusEvent::InitialLost)
        );
        assert_eq!(tracker.get(&id), Some(ConnectionState::Disconnected));

        cell.transition(ConnectionState::Connecting);
        assert_eq!(cell.transition(ConnectionState::Disconnected), None);
    }

    #[test]
    fn test_first_online_is_not_a_recovery() {
        let (tracker, id) = tracker();
        let cell = tracker.cell(&id).unwrap();

        cell.transition(ConnectionState::Connecting);
        assert_eq!(cell.transition(ConnectionState::Online), None);
        assert_eq!(tracker.online_count(), 1);
    }

    #[test]
    fn test_lost_then_recovered() {
        let (tracker, id) = tracker();
        let cell = tracker.cell(&id).unwrap();

        cell.transition(ConnectionState::Connecting);
        cell.transition(ConnectionState::Online);
        assert_eq!(
            cell.transition(ConnectionState::Disconnected),
            Some(CameraStatusEvent::Lost)
        );
        assert_eq!(cell.transition(ConnectionState::Connecting), None);
        // Retry failures after a real outage are not reported again
        assert_eq!(cell.transition(ConnectionState::Disconnected), None);
        cell.transition(ConnectionState::Connecting);
        assert_eq!(
            cell.transition(ConnectionState::Online),
            Some(CameraStatusEvent::Recovered)
        );
    }

    #[test]
    fn test_unknown_camera_has_no_cell() {
        let (tracker, _) = tracker();
        let other = CameraId::parse("10.0.0.9").unwrap();
        assert!(tracker.cell(&other).is_none());
        assert!(tracker.get(&other).is_none());
    }
}

//! PTZ Controller - camera actuation on detection
//!
//! ## Responsibilities
//!
//! - CGI zoom/preset commands with digest auth (`DahuaPtzClient`)
//! - One actuation per camera at a time, then cooldown (`ActuationCooldown`)
//! - Optional preset patrol (`PatrolService`)

mod client;
mod cooldown;
mod patrol;
mod types;

pub use client::{CameraControl, DahuaPtzClient};
pub use cooldown::ActuationCooldown;
pub use patrol::PatrolService;
pub use types::*;

#[cfg(test)]
pub(crate) use cooldown::testing;

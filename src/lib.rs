//! smoke_hub Library
//!
//! Multi-camera smoke detection hub
//!
//! ## Architecture
//!
//! 1. ConfigStore - fleet configuration and workstation routing
//! 2. ConnectionSupervisor - keeps each camera's stream alive
//! 3. FrameSampler - periodic snapshots and jittered sample uploads
//! 4. GroupAggregator - per-camera batching with size/time flush
//! 5. BestFrameSelector - detector calls and best frame per group
//! 6. CropUploadFanout - crops, annotated frame, uploads and alerts
//! 7. ActuationCooldown - PTZ zoom with per-camera cooldown
//! 8. WebAPI - sample ingestion and status endpoints
//!
//! ## Data flow
//!
//! stream -> frame slot -> sample -> inbox -> group -> best frame
//! -> crops/summary upload (+ zoom, alert)

pub mod camera_malfunction_reporter;
pub mod camera_status_tracker;
pub mod config_store;
pub mod connection_supervisor;
pub mod crop_upload_fanout;
pub mod detection;
pub mod error;
pub mod frame_sampler;
pub mod group_aggregator;
pub mod inbox;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod ptz_controller;
pub mod rtsp_manager;
pub mod snapshot_service;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;

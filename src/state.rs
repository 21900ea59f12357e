//! Application state
//!
//! Holds the shared components the HTTP handlers need

use crate::camera_status_tracker::CameraStatusTracker;
use crate::config_store::ConfigStore;
use crate::error::Result;
use crate::group_aggregator::GroupDispatcher;
use crate::inbox::Inbox;
use crate::notifier::{DiscordNotifier, Notifier, TelegramNotifier};
use crate::ptz_controller::ActuationCooldown;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Process configuration from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Fleet configuration file (JSON)
    pub config_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Sample inbox
    pub input_dir: PathBuf,
    /// Crops and annotated frames
    pub output_dir: PathBuf,
    /// Periodic snapshot archive
    pub snapshot_dir: PathBuf,
    /// Smoke detector endpoint
    pub detector_url: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: std::env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5005),
            input_dir: std::env::var("INPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/inbox")),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/output")),
            snapshot_dir: std::env::var("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/snapshots")),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5006/detect".to_string()),
            telegram_token: non_empty_var("TELEGRAM_TOKEN"),
            telegram_chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
            discord_webhook_url: non_empty_var("DISCORD_WEBHOOK_URL"),
        }
    }
}

impl AppConfig {
    /// Alert channels that have credentials configured
    pub fn alert_channels(&self) -> Result<Vec<Arc<dyn Notifier>>> {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let (Some(token), Some(chat_id)) = (&self.telegram_token, &self.telegram_chat_id) {
            channels.push(Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())?));
        }
        if let Some(url) = &self.discord_webhook_url {
            channels.push(Arc::new(DiscordNotifier::new(url.clone())?));
        }
        Ok(channels)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Fleet configuration (read-only)
    pub config_store: Arc<ConfigStore>,
    /// Connection state per camera
    pub status: Arc<CameraStatusTracker>,
    /// Grouping entry point
    pub dispatcher: Arc<GroupDispatcher>,
    pub inbox: Arc<Inbox>,
    /// PTZ zoom/cooldown state
    pub cooldown: Arc<ActuationCooldown>,
    pub started_at: Instant,
}

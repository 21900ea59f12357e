//! Notifier - alert delivery
//!
//! ## Responsibilities
//!
//! - Deliver a text message with an optional JPEG to a channel
//! - Fan one alert out to every configured channel
//!
//! Alerts are fire-and-forget for callers: a failing channel is logged
//! and never blocks the others.

mod discord;
mod telegram;

pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Outbound HTTP timeout for every channel
pub(crate) const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs
    fn channel(&self) -> &'static str;

    async fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<()>;
}

/// Sends to every channel, reporting how many accepted the alert
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn broadcast(&self, message: &str, image: Option<&[u8]>) -> usize {
        let sends = self.channels.iter().map(|channel| async move {
            match channel.notify(message, image).await {
                Ok(()) => {
                    tracing::debug!(channel = channel.channel(), "Alert delivered");
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel(),
                        error = %e,
                        "Alert delivery failed"
                    );
                    false
                }
            }
        });

        futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    fn channel(&self) -> &'static str {
        "fanout"
    }

    async fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<()> {
        self.broadcast(message, image).await;
        Ok(())
    }
}

//! Discord webhook channel

use super::{Notifier, NOTIFY_TIMEOUT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel(&self) -> &'static str {
        "discord"
    }

    async fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<()> {
        let request = self.client.post(&self.webhook_url);
        let request = match image {
            Some(jpeg) => {
                let file = Part::bytes(jpeg.to_vec())
                    .file_name("alert.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| Error::Notify(e.to_string()))?;
                request.multipart(Form::new().text("content", message.to_string()).part("file", file))
            }
            None => request.json(&serde_json::json!({ "content": message })),
        };

        let response = request.send().await?;
        // Webhooks answer 204 No Content
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("discord returned {status}: {body}")));
        }
        Ok(())
    }
}

//! Telegram Bot API channel

use super::{Notifier, NOTIFY_TIMEOUT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;

        Ok(Self {
            client,
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", TELEGRAM_API, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<()> {
        let response = match image {
            Some(jpeg) => {
                let photo = Part::bytes(jpeg.to_vec())
                    .file_name("alert.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| Error::Notify(e.to_string()))?;
                let form = Form::new()
                    .text("chat_id", self.chat_id.clone())
                    .text("caption", message.to_string())
                    .part("photo", photo);
                self.client
                    .post(self.method_url("sendPhoto"))
                    .multipart(form)
                    .send()
                    .await?
            }
            None => {
                self.client
                    .post(self.method_url("sendMessage"))
                    .json(&serde_json::json!({
                        "chat_id": self.chat_id,
                        "text": message,
                    }))
                    .send()
                    .await?
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("telegram returned {status}: {body}")));
        }
        Ok(())
    }
}

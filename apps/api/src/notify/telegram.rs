use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{MatchAlert, MatchNotifier, NotifyError};
use crate::config::TelegramSettings;

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Posts alerts to a chat through the Telegram Bot API (`sendMessage`).
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }
}

#[async_trait]
impl MatchNotifier for TelegramNotifier {
    async fn notify(&self, alert: &MatchAlert) -> Result<(), NotifyError> {
        let text = alert.to_html();
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.bot_token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(posting_id = alert.posting_id, "Telegram alert sent");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "telegram"
    }
}

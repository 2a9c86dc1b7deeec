//! High-match alerts.
//!
//! The match orchestrator hands every result at or above the high-match threshold
//! to an `Arc<dyn MatchNotifier>`. Delivery failures are logged by the caller and
//! never fail a match run.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::posting::PostingRow;

pub mod telegram;

pub use telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One posting that scored at or above the high-match threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchAlert {
    pub posting_id: i64,
    pub source_id: String,
    pub title: String,
    pub location: Option<String>,
    pub url: Option<String>,
    pub score: u8,
}

impl MatchAlert {
    pub fn new(posting: &PostingRow, score: u8) -> Self {
        Self {
            posting_id: posting.id,
            source_id: posting.source_id.clone(),
            title: posting.title.clone(),
            location: posting.location.clone(),
            url: posting.url.clone(),
            score,
        }
    }

    /// Message body in Telegram's HTML subset.
    pub fn to_html(&self) -> String {
        let mut message = format!(
            "<b>{}</b> | <b>{}</b>\n{}\nScore: <b>{}</b>",
            escape_html(&self.source_id),
            escape_html(&self.title),
            escape_html(self.location.as_deref().unwrap_or("Location N/A")),
            self.score
        );
        if let Some(url) = &self.url {
            message.push('\n');
            message.push_str(&escape_html(url));
        }
        message
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
pub trait MatchNotifier: Send + Sync {
    async fn notify(&self, alert: &MatchAlert) -> Result<(), NotifyError>;

    /// Short backend name for logs and /health.
    fn backend(&self) -> &'static str;
}

/// Used when no alert channel is configured. Drops every alert.
pub struct DisabledNotifier;

#[async_trait]
impl MatchNotifier for DisabledNotifier {
    async fn notify(&self, _alert: &MatchAlert) -> Result<(), NotifyError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}

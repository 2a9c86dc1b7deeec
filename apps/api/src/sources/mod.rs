//! Source connectors: one per external job board.
//!
//! Every connector returns a lazy stream of raw postings. Pagination, retries and
//! wire formats stay behind `SourceConnector`; the scrape orchestrator only drains
//! streams and normalizes what comes out.

use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

pub mod config;
pub mod greenhouse;
pub mod http;
pub mod lever;
pub mod normalize;
pub mod workday;

pub use config::{build_connectors, load_sources, SourceConfig, SourceKind};
pub use http::HttpFetcher;

/// One posting as a connector saw it, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosting {
    pub requisition_id: Option<String>,
    pub title: String,
    pub location: Option<String>,
    /// Plain text or HTML.
    pub description: Option<String>,
    /// Unparsed date as the board reports it.
    pub posted: Option<String>,
    pub url: Option<String>,
    /// The board's original record.
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("blocked by {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("unexpected response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl SourceError {
    /// Worth another attempt: network trouble, timeouts, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http { .. } | SourceError::Timeout { .. } => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::Blocked { .. } | SourceError::Parse { .. } => false,
        }
    }
}

pub type PostingStream<'a> = BoxStream<'a, Result<RawPosting, SourceError>>;

pub trait SourceConnector: Send + Sync {
    /// Stable id stored with every posting from this source.
    fn source_id(&self) -> &str;

    /// Human-readable name for progress messages.
    fn name(&self) -> &str;

    /// Lazily fetches every posting. Nothing is requested until polled.
    fn fetch(&self) -> PostingStream<'_>;
}

/// Non-empty trimmed string from a JSON value; numbers are stringified.
pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

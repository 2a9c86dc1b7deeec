//! Raw text extraction from uploaded documents.
//!
//! PDFs go through `pdf-extract` on the blocking pool, Word files through a
//! `pandoc` subprocess bounded by a timeout, plain text is decoded as UTF-8 with
//! a Latin-1 fallback.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ProfileError;

pub const PANDOC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Word,
    PlainText,
}

impl DocumentFormat {
    /// Resolves the format from the file extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, ProfileError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" | "doc" => Ok(DocumentFormat::Word),
            "txt" => Ok(DocumentFormat::PlainText),
            "" => Err(ProfileError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(ProfileError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentFormat::PlainText => "text/plain",
        }
    }
}

/// Turns document bytes into unstructured text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, format: DocumentFormat, bytes: &[u8]) -> Result<String, ProfileError>;
}

pub struct DocumentTextExtractor {
    pandoc_timeout: Duration,
}

impl Default for DocumentTextExtractor {
    fn default() -> Self {
        Self {
            pandoc_timeout: PANDOC_TIMEOUT,
        }
    }
}

impl DocumentTextExtractor {
    pub fn new(pandoc_timeout: Duration) -> Self {
        Self { pandoc_timeout }
    }

    async fn extract_pdf(&self, bytes: &[u8]) -> Result<String, ProfileError> {
        let data = bytes.to_vec();
        // pdf-extract is CPU-bound and may panic on malformed input.
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
            .await
            .map_err(|e| ProfileError::ExtractionFailed(format!("PDF parser aborted: {e}")))?
            .map_err(|e| ProfileError::ExtractionFailed(format!("PDF parse error: {e}")))
    }

    async fn extract_word(&self, bytes: &[u8]) -> Result<String, ProfileError> {
        let mut tmpfile = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .map_err(|e| ProfileError::ExtractionFailed(format!("Failed to create temp file: {e}")))?;
        tmpfile
            .write_all(bytes)
            .map_err(|e| ProfileError::ExtractionFailed(format!("Failed to write temp file: {e}")))?;

        debug!(path = %tmpfile.path().display(), "Converting Word document with pandoc");

        let output = tokio::time::timeout(
            self.pandoc_timeout,
            Command::new("pandoc")
                .arg("-f")
                .arg("docx")
                .arg("-t")
                .arg("plain")
                .arg("--wrap=none")
                .arg(tmpfile.path())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ProfileError::ExtractionFailed(format!(
                "pandoc timed out after {}s",
                self.pandoc_timeout.as_secs()
            ))
        })?
        .map_err(|e| ProfileError::ExtractionFailed(format!("Failed to run pandoc: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProfileError::ExtractionFailed(format!(
                "pandoc failed (exit {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// UTF-8, or Latin-1 when the bytes are not valid UTF-8. Latin-1 maps every byte,
/// so decoding never fails.
pub fn decode_plain_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract(&self, format: DocumentFormat, bytes: &[u8]) -> Result<String, ProfileError> {
        if bytes.is_empty() {
            return Err(ProfileError::ExtractionFailed("Uploaded file is empty".to_string()));
        }
        match format {
            DocumentFormat::Pdf => self.extract_pdf(bytes).await,
            DocumentFormat::Word => self.extract_word(bytes).await,
            DocumentFormat::PlainText => Ok(decode_plain_text(bytes)),
        }
    }
}

//! Profile extraction: uploaded CV → `CandidateProfile`.
//!
//! Text extraction runs on the upload request so format and parse failures reach
//! the caller directly. Structuring the text (skills, years, degree, optional AI
//! hints) and storing the profile run as a `cv_analysis` task.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::inference::InferenceClient;
use crate::models::profile::CandidateProfile;
use crate::store::{JobStore, StoreError};
use crate::tasks::manager::TaskHandle;
use crate::tasks::{CvAnalysisCounters, ProgressUpdate};
use crate::text::normalize_lines;

pub mod archive;
pub mod extract;
pub mod handlers;
pub mod heuristics;

use archive::UploadArchive;
use extract::{DocumentFormat, TextExtractor};

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("unsupported format {0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    ExtractionFailed(String),
}

/// An accepted upload whose text has already been extracted.
#[derive(Debug, Clone)]
pub struct CvUpload {
    pub filename: String,
    pub format: DocumentFormat,
    pub bytes: Bytes,
    pub text: String,
}

#[derive(Clone)]
pub struct ProfileExtractor {
    text: Arc<dyn TextExtractor>,
    inference: Arc<dyn InferenceClient>,
    inference_timeout: Duration,
}

impl ProfileExtractor {
    pub fn new(
        text: Arc<dyn TextExtractor>,
        inference: Arc<dyn InferenceClient>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            text,
            inference,
            inference_timeout,
        }
    }

    /// Validates the format and extracts normalized text.
    /// `ExtractionFailed` when the document yields no text.
    pub async fn extract_text(&self, filename: &str, bytes: Bytes) -> Result<CvUpload, ProfileError> {
        let format = DocumentFormat::from_filename(filename)?;
        let raw = self.text.extract(format, &bytes).await?;
        let text = normalize_lines(&raw);
        if text.is_empty() {
            return Err(ProfileError::ExtractionFailed(
                "No text could be extracted from the document".to_string(),
            ));
        }
        debug!(filename, chars = text.chars().count(), "Extracted CV text");
        Ok(CvUpload {
            filename: filename.to_string(),
            format,
            bytes,
            text,
        })
    }

    /// Structures extracted text. Asks the inference client for hints only when
    /// the heuristics found no skills or no years; inference failure is ignored.
    pub async fn build_profile(&self, filename: &str, text: &str) -> CandidateProfile {
        let mut skills: BTreeSet<String> = heuristics::detect_skills(text).into_iter().collect();
        let mut years_experience = heuristics::detect_years_experience(text);
        let mut education = heuristics::detect_education(text);

        if skills.is_empty() || years_experience == 0.0 {
            match tokio::time::timeout(self.inference_timeout, self.inference.profile_hints(text))
                .await
            {
                Ok(Ok(hints)) => {
                    debug!(
                        hinted_skills = hints.technical_skills.len(),
                        hinted_years = ?hints.years_experience,
                        "Merging profile hints"
                    );
                    skills.extend(
                        hints
                            .technical_skills
                            .iter()
                            .map(|s| heuristics::canonical_skill(s))
                            .filter(|s| !s.is_empty()),
                    );
                    if years_experience == 0.0 {
                        years_experience = hints.years_experience.unwrap_or(0.0);
                    }
                    if education.is_none() {
                        education = hints
                            .education
                            .as_deref()
                            .and_then(heuristics::detect_education);
                    }
                }
                Ok(Err(e)) => debug!(error = %e, "Profile hints unavailable"),
                Err(_) => debug!("Profile hints timed out"),
            }
        }

        CandidateProfile {
            filename: filename.to_string(),
            raw_text: text.to_string(),
            skills: skills.into_iter().collect(),
            years_experience,
            education: education.map(|level| level.as_str().to_string()),
            // Postgres keeps microseconds; the version must survive a round trip.
            extracted_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// `cv_analysis` task body: structure, store, archive.
    #[instrument(skip_all, fields(task_id = %handle.id(), filename = %upload.filename))]
    pub async fn analyze(
        &self,
        handle: TaskHandle,
        upload: CvUpload,
        store: Arc<dyn JobStore>,
        archive: Option<UploadArchive>,
    ) -> Result<ProgressUpdate, StoreError> {
        let chars_extracted = upload.text.chars().count() as u64;
        handle
            .update(
                ProgressUpdate::message(format!("Analyzing CV ({chars_extracted} characters)"))
                    .with_counters(CvAnalysisCounters {
                        chars_extracted,
                        skills_found: 0,
                    }),
            )
            .await;

        let profile = self.build_profile(&upload.filename, &upload.text).await;
        store.replace_profile(&profile).await?;

        if let Some(archive) = archive {
            if let Err(e) = archive
                .store(&upload.filename, upload.format, upload.bytes.clone())
                .await
            {
                warn!("CV archive failed: {e:#}");
            }
        }

        let skills_found = profile.skills.len() as u64;
        info!(
            skills_found,
            years = profile.years_experience,
            education = ?profile.education,
            "CV analysis complete"
        );

        Ok(ProgressUpdate::message(format!(
            "CV analyzed: {skills_found} skills, {} years experience",
            profile.years_experience
        ))
        .with_counters(CvAnalysisCounters {
            chars_extracted,
            skills_found,
        }))
    }
}

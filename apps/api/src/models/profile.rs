use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The single stored candidate. Replaced wholesale on every upload.
///
/// `extracted_at` doubles as the profile version that match results are pinned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CandidateProfile {
    pub filename: String,
    pub raw_text: String,
    /// Normalized (lowercase), sorted and deduplicated.
    pub skills: Vec<String>,
    pub years_experience: f64,
    pub education: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

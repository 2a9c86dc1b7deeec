use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deterministic rule scores. Bounds: title 25, skills 30, location 20,
/// experience 10, recency 10, education 5. The bands add up to 100; the
/// counted total is capped at [`SubScores::MAX_TOTAL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub title: u8,
    pub skills: u8,
    pub location: u8,
    pub experience: u8,
    pub recency: u8,
    pub education: u8,
}

impl SubScores {
    pub const MAX_TOTAL: u32 = 90;

    /// Sum of the bands, capped at `MAX_TOTAL`.
    pub fn total(&self) -> u32 {
        let sum: u32 = [
            self.title,
            self.skills,
            self.location,
            self.experience,
            self.recency,
            self.education,
        ]
        .iter()
        .map(|s| u32::from(*s))
        .sum();
        sum.min(Self::MAX_TOTAL)
    }

    /// `(name, points, max)` for each dimension, in display order.
    pub fn dimensions(&self) -> [(&'static str, u8, u8); 6] {
        [
            ("title", self.title, 25),
            ("skills", self.skills, 30),
            ("location", self.location, 20),
            ("experience", self.experience, 10),
            ("recency", self.recency, 10),
            ("education", self.education, 5),
        ]
    }
}

/// Which path produced the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Rules blended with an AI assessment.
    Blended,
    /// AI unavailable; rules only.
    RulesOnly,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Blended => "blended",
            ScoreSource::RulesOnly => "rules_only",
        }
    }
}

/// Current score for one posting against one profile version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub posting_id: i64,
    pub profile_version: DateTime<Utc>,
    pub score: u8,
    pub reasoning: String,
    pub sub_scores: SubScores,
    pub ai_score: Option<u8>,
    pub scorer: ScoreSource,
    pub computed_at: DateTime<Utc>,
}

//! Scoring engine: deterministic rule sub-scores blended with an optional AI score.
//!
//! The rule score (at most 90 points) is rescaled to 0–100. When the inference
//! client returns an in-range score before the timeout, the final score is
//! `round(w_rules × rescaled + w_ai × ai)`; otherwise it is `round(rescaled)` with
//! a synthesized explanation. Inference never fails a match.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::debug;

use crate::inference::{InferenceClient, MatchPrompt};
use crate::models::match_result::{MatchResult, ScoreSource, SubScores};
use crate::models::posting::PostingRow;
use crate::models::profile::CandidateProfile;

pub mod rules;

use rules::DegreeLevel;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Posting {0} has neither title nor description")]
    EmptyPosting(i64),
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Blend weights, normalized so `rules + ai == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub rules: f64,
    pub ai: f64,
}

impl BlendWeights {
    /// `None` for negative, non-finite or all-zero weights.
    pub fn new(rules: f64, ai: f64) -> Option<Self> {
        let valid = |w: f64| w.is_finite() && w >= 0.0;
        if !valid(rules) || !valid(ai) || rules + ai <= 0.0 {
            return None;
        }
        let total = rules + ai;
        Some(Self {
            rules: rules / total,
            ai: ai / total,
        })
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self { rules: 0.4, ai: 0.6 }
    }
}

/// Lowercase substrings matched against a posting's location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationTargets {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

impl Default for LocationTargets {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            primary: list(&["mumbai", "bengaluru", "bangalore", "hyderabad"]),
            secondary: list(&["pune", "chennai", "gurugram", "gurgaon", "noida", "india"]),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Blend arithmetic
// ────────────────────────────────────────────────────────────────────────────

/// Rule points (0–90) on the 0–100 scale.
pub fn rescale(sub_scores: &SubScores) -> f64 {
    f64::from(sub_scores.total()) * 100.0 / f64::from(SubScores::MAX_TOTAL)
}

pub fn blend(rescaled: f64, ai_score: f64, weights: BlendWeights) -> u8 {
    (weights.rules * rescaled + weights.ai * ai_score)
        .round()
        .clamp(0.0, 100.0) as u8
}

/// Rules-only explanation naming the strongest dimensions.
fn fallback_reasoning(sub_scores: &SubScores) -> String {
    let mut ranked: Vec<(&str, u8, u8)> = sub_scores
        .dimensions()
        .into_iter()
        .filter(|(_, points, _)| *points > 0)
        .collect();
    ranked.sort_by(|a, b| {
        let ratio = |(_, points, max): &(&str, u8, u8)| f64::from(*points) / f64::from(*max);
        ratio(b)
            .total_cmp(&ratio(a))
            .then_with(|| b.1.cmp(&a.1))
    });

    if ranked.is_empty() {
        return "Rule-based score (AI unavailable): no strong signals matched.".to_string();
    }
    let strongest = ranked
        .iter()
        .take(3)
        .map(|(name, points, max)| format!("{name} {points}/{max}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Rule-based score (AI unavailable). Strongest signals: {strongest}.")
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ScoringEngine {
    inference: Arc<dyn InferenceClient>,
    weights: BlendWeights,
    locations: LocationTargets,
    timeout: Duration,
}

impl ScoringEngine {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        weights: BlendWeights,
        locations: LocationTargets,
        timeout: Duration,
    ) -> Self {
        Self {
            inference,
            weights,
            locations,
            timeout,
        }
    }

    /// Rule sub-scores only. Pure.
    pub fn deterministic(
        &self,
        posting: &PostingRow,
        profile: &CandidateProfile,
        today: NaiveDate,
    ) -> SubScores {
        let description = posting.description.as_deref().unwrap_or_default();
        let posting_text = format!("{}\n{}", posting.title, description);
        let candidate_degree = profile.education.as_deref().and_then(DegreeLevel::highest_in);

        SubScores {
            title: rules::title_score(&posting.title),
            skills: rules::skills_score(&profile.skills, &posting_text),
            location: rules::location_score(posting.location.as_deref(), &self.locations),
            experience: rules::experience_score(
                rules::parse_experience_requirement(&posting_text),
                profile.years_experience,
            ),
            recency: rules::recency_score(posting.posted_at, today),
            education: rules::education_score(
                DegreeLevel::required_by(description),
                candidate_degree,
            ),
        }
    }

    pub async fn score(
        &self,
        posting: &PostingRow,
        profile: &CandidateProfile,
    ) -> Result<MatchResult, ScoringError> {
        self.score_at(posting, profile, Utc::now().date_naive()).await
    }

    /// Scores against a fixed "today" for recency.
    pub async fn score_at(
        &self,
        posting: &PostingRow,
        profile: &CandidateProfile,
        today: NaiveDate,
    ) -> Result<MatchResult, ScoringError> {
        let has_description = posting
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if posting.title.trim().is_empty() && !has_description {
            return Err(ScoringError::EmptyPosting(posting.id));
        }

        let sub_scores = self.deterministic(posting, profile, today);
        let rescaled = rescale(&sub_scores);

        let prompt = MatchPrompt::new(posting, profile);
        let assessment =
            match tokio::time::timeout(self.timeout, self.inference.assess_match(&prompt)).await {
                Ok(Ok(assessment)) => Some(assessment),
                Ok(Err(e)) => {
                    debug!(posting_id = posting.id, error = %e, "Inference failed; rules only");
                    None
                }
                Err(_) => {
                    debug!(
                        posting_id = posting.id,
                        timeout_secs = self.timeout.as_secs(),
                        "Inference timed out; rules only"
                    );
                    None
                }
            };

        let (score, reasoning, ai_score, scorer) = match assessment {
            Some(ai) => (
                blend(rescaled, ai.score, self.weights),
                ai.reasoning,
                Some(ai.score.round() as u8),
                ScoreSource::Blended,
            ),
            None => (
                rescaled.round() as u8,
                fallback_reasoning(&sub_scores),
                None,
                ScoreSource::RulesOnly,
            ),
        };

        Ok(MatchResult {
            posting_id: posting.id,
            profile_version: profile.extracted_at,
            score,
            reasoning,
            sub_scores,
            ai_score,
            scorer,
            computed_at: Utc::now(),
        })
    }
}

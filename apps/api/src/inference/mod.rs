/// Inference client: the only path to the local AI service.
///
/// Callers depend on `Arc<dyn InferenceClient>`; `OllamaClient` talks to a running
/// Ollama instance and `DisabledInference` makes every call fail fast so that the
/// scoring engine takes its deterministic path.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::posting::PostingRow;
use crate::models::profile::CandidateProfile;
use crate::text::truncate_chars;

pub mod ollama;
pub mod prompts;

pub use ollama::OllamaClient;

/// Description characters sent with a match prompt.
pub const PROMPT_DESCRIPTION_CHARS: usize = 1000;
/// Profile skills sent with a match prompt.
pub const PROMPT_MAX_SKILLS: usize = 15;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model output: {0}")]
    Parse(String),

    #[error("Model score {0} is outside 0..=100")]
    OutOfRange(f64),

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Inference is disabled")]
    Disabled,
}

/// Bounded view of one (posting, profile) pair sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPrompt {
    pub title: String,
    pub location: Option<String>,
    pub description: String,
    pub skills: Vec<String>,
    pub years_experience: f64,
    pub education: Option<String>,
}

impl MatchPrompt {
    pub fn new(posting: &PostingRow, profile: &CandidateProfile) -> Self {
        Self {
            title: posting.title.clone(),
            location: posting.location.clone(),
            description: truncate_chars(
                posting.description.as_deref().unwrap_or_default(),
                PROMPT_DESCRIPTION_CHARS,
            )
            .to_string(),
            skills: profile
                .skills
                .iter()
                .take(PROMPT_MAX_SKILLS)
                .cloned()
                .collect(),
            years_experience: profile.years_experience,
            education: profile.education.clone(),
        }
    }
}

/// A parsed, range-checked model verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAssessment {
    pub score: f64,
    pub reasoning: String,
}

/// Profile fields the model can suggest when heuristics come up short.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileHints {
    pub technical_skills: Vec<String>,
    pub years_experience: Option<f64>,
    pub education: Option<String>,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn assess_match(&self, prompt: &MatchPrompt) -> Result<AiAssessment, InferenceError>;

    async fn profile_hints(&self, cv_text: &str) -> Result<ProfileHints, InferenceError>;

    /// Short backend name for logs and `/health`.
    fn backend(&self) -> &'static str;
}

/// Backend used when `INFERENCE_ENABLED=false`.
pub struct DisabledInference;

#[async_trait]
impl InferenceClient for DisabledInference {
    async fn assess_match(&self, _prompt: &MatchPrompt) -> Result<AiAssessment, InferenceError> {
        Err(InferenceError::Disabled)
    }

    async fn profile_hints(&self, _cv_text: &str) -> Result<ProfileHints, InferenceError> {
        Err(InferenceError::Disabled)
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response parsing
// ────────────────────────────────────────────────────────────────────────────

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// The outermost `{...}` span, tolerating chatter around it.
fn json_object(text: &str) -> Result<Value, InferenceError> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(InferenceError::EmptyContent);
    }
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };
    serde_json::from_str(candidate).map_err(|e| InferenceError::Parse(e.to_string()))
}

/// Numbers may come back as JSON numbers or numeric strings ("85", "3.5").
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_assessment(text: &str) -> Result<AiAssessment, InferenceError> {
    let object = json_object(text)?;
    let score = object
        .get("score")
        .and_then(lenient_number)
        .ok_or_else(|| InferenceError::Parse("missing numeric `score`".to_string()))?;
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(InferenceError::OutOfRange(score));
    }
    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No reasoning provided")
        .to_string();
    Ok(AiAssessment { score, reasoning })
}

pub(crate) fn parse_profile_hints(text: &str) -> Result<ProfileHints, InferenceError> {
    let object = json_object(text)?;
    let technical_skills = object
        .get("technical_skills")
        .and_then(Value::as_array)
        .map(|skills| {
            skills
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let years_experience = object
        .get("years_experience")
        .and_then(lenient_number)
        .filter(|y| y.is_finite() && *y >= 0.0);
    let education = object
        .get("education")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(ProfileHints {
        technical_skills,
        years_experience,
        education,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_assessment_tolerates_surrounding_text() {
        let parsed =
            parse_assessment("Sure! {\"score\": 85, \"reasoning\": \"Strong SQL fit\"} Hope it helps")
                .unwrap();
        assert_eq!(parsed.score, 85.0);
        assert_eq!(parsed.reasoning, "Strong SQL fit");
    }

    #[test]
    fn test_parse_assessment_accepts_numeric_string() {
        let parsed = parse_assessment("{\"score\": \"72.5\"}").unwrap();
        assert_eq!(parsed.score, 72.5);
        assert_eq!(parsed.reasoning, "No reasoning provided");
    }

    #[test]
    fn test_parse_assessment_rejects_out_of_range() {
        assert!(matches!(
            parse_assessment("{\"score\": 140, \"reasoning\": \"x\"}"),
            Err(InferenceError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_assessment("{\"score\": -1}"),
            Err(InferenceError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_parse_assessment_rejects_garbage() {
        assert!(matches!(
            parse_assessment("I think it's a good match"),
            Err(InferenceError::Parse(_))
        ));
        assert!(matches!(
            parse_assessment("{\"reasoning\": \"no score\"}"),
            Err(InferenceError::Parse(_))
        ));
        assert!(matches!(parse_assessment("  "), Err(InferenceError::EmptyContent)));
    }

    #[test]
    fn test_parse_profile_hints() {
        let hints = parse_profile_hints(
            r#"{"technical_skills": ["Python", " ", "Tableau"], "years_experience": "4", "education": "Master's in Finance"}"#,
        )
        .unwrap();
        assert_eq!(hints.technical_skills, vec!["Python", "Tableau"]);
        assert_eq!(hints.years_experience, Some(4.0));
        assert_eq!(hints.education.as_deref(), Some("Master's in Finance"));
    }

    #[test]
    fn test_parse_profile_hints_missing_fields_default() {
        let hints = parse_profile_hints("{}").unwrap();
        assert_eq!(hints, ProfileHints::default());
    }

    #[tokio::test]
    async fn test_disabled_backend_always_fails() {
        let client = DisabledInference;
        assert!(matches!(
            client.profile_hints("cv").await,
            Err(InferenceError::Disabled)
        ));
        assert_eq!(client.backend(), "disabled");
    }

    #[test]
    fn test_match_prompt_is_bounded() {
        use chrono::Utc;
        use serde_json::json;

        let posting = PostingRow {
            id: 1,
            source_id: "s".into(),
            external_ref: "r".into(),
            title: "Quant".into(),
            location: None,
            description: Some("x".repeat(5000)),
            posted_at: None,
            url: None,
            raw_fields: json!({}),
            first_seen_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let profile = CandidateProfile {
            filename: "cv.txt".into(),
            raw_text: String::new(),
            skills: (0..40).map(|i| format!("skill{i}")).collect(),
            years_experience: 3.0,
            education: None,
            extracted_at: Utc::now(),
        };

        let prompt = MatchPrompt::new(&posting, &profile);
        assert_eq!(prompt.description.chars().count(), PROMPT_DESCRIPTION_CHARS);
        assert_eq!(prompt.skills.len(), PROMPT_MAX_SKILLS);
    }
}

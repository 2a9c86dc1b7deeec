//! Deterministic sub-scores. Every function here is pure: same posting, profile and
//! date always produce the same points.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::LocationTargets;
use crate::text::contains_term;

pub const TITLE_MAX: u8 = 25;
pub const SKILLS_MAX: u8 = 30;
pub const LOCATION_PRIMARY: u8 = 20;
pub const LOCATION_SECONDARY: u8 = 12;
pub const EXPERIENCE_MAX: u8 = 10;
pub const RECENCY_MAX: u8 = 10;
pub const RECENCY_UNKNOWN: u8 = 5;
pub const RECENCY_WINDOW_DAYS: f64 = 90.0;
pub const EDUCATION_MAX: u8 = 5;

// ────────────────────────────────────────────────────────────────────────────
// Title
// ────────────────────────────────────────────────────────────────────────────

static TITLE_WEIGHTS: LazyLock<Vec<(Regex, u8)>> = LazyLock::new(|| {
    [
        (r"\bquant(itative)?\b", 25),
        (r"machine learning|\bml\b|\bml engineer", 22),
        (r"\bdata scientists?\b", 20),
        (r"\bdata engineer|\bdata platform\b", 18),
        (r"\brisk (analytics|model|management)|model validation|model risk", 16),
        (r"analytics|\banalyst\b|business intelligence|\bbi\b", 12),
    ]
    .into_iter()
    .map(|(pattern, weight)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("static title regex");
        (regex, weight)
    })
    .collect()
});

/// Highest weight among role patterns matching the title.
pub fn title_score(title: &str) -> u8 {
    TITLE_WEIGHTS
        .iter()
        .filter(|(regex, _)| regex.is_match(title))
        .map(|(_, weight)| *weight)
        .max()
        .unwrap_or(0)
        .min(TITLE_MAX)
}

// ────────────────────────────────────────────────────────────────────────────
// Skills
// ────────────────────────────────────────────────────────────────────────────

/// Share of profile skills mentioned in the posting text, scaled to 30.
pub fn skills_score(skills: &[String], posting_text: &str) -> u8 {
    if skills.is_empty() {
        return 0;
    }
    let haystack = posting_text.to_lowercase();
    let found = skills
        .iter()
        .filter(|skill| contains_term(&haystack, &skill.to_lowercase()))
        .count();
    let fraction = found as f64 / skills.len() as f64;
    (fraction * f64::from(SKILLS_MAX)).round() as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Location
// ────────────────────────────────────────────────────────────────────────────

pub fn location_score(location: Option<&str>, targets: &LocationTargets) -> u8 {
    let Some(location) = location else {
        return 0;
    };
    let location = location.to_lowercase();
    let hit = |list: &[String]| list.iter().any(|t| !t.is_empty() && location.contains(t.as_str()));
    if hit(&targets.primary) {
        LOCATION_PRIMARY
    } else if hit(&targets.secondary) {
        LOCATION_SECONDARY
    } else {
        0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Experience
// ────────────────────────────────────────────────────────────────────────────

/// Years asked for by a posting. `max == None` means open-ended ("5+ years").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperienceRange {
    pub min: f64,
    pub max: Option<f64>,
}

static RE_YEARS_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:-|–|to)\s*(\d{1,2})\s*\+?\s*(?:years?|yrs?)\b")
        .expect("static years regex")
});
static RE_YEARS_PLUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:\+|plus)\s*(?:years?|yrs?)\b").expect("static years regex")
});
static RE_YEARS_EXACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:years?|yrs?)\b").expect("static years regex")
});

/// First experience requirement in the text: "N-M years", then "N+ years", then "N years".
pub fn parse_experience_requirement(text: &str) -> Option<ExperienceRange> {
    let number = |s: &str| s.parse::<f64>().ok();

    if let Some(caps) = RE_YEARS_RANGE.captures(text) {
        let (a, b) = (number(&caps[1])?, number(&caps[2])?);
        return Some(ExperienceRange {
            min: a.min(b),
            max: Some(a.max(b)),
        });
    }
    if let Some(caps) = RE_YEARS_PLUS.captures(text) {
        return Some(ExperienceRange {
            min: number(&caps[1])?,
            max: None,
        });
    }
    let caps = RE_YEARS_EXACT.captures(text)?;
    let years = number(&caps[1])?;
    Some(ExperienceRange {
        min: years,
        max: Some(years),
    })
}

/// 10 inside the range, minus 2 per year outside it.
pub fn experience_score(requirement: Option<ExperienceRange>, candidate_years: f64) -> u8 {
    let Some(range) = requirement else {
        return EXPERIENCE_MAX;
    };
    let distance = if candidate_years < range.min {
        range.min - candidate_years
    } else {
        match range.max {
            Some(max) if candidate_years > max => candidate_years - max,
            _ => 0.0,
        }
    };
    (f64::from(EXPERIENCE_MAX) - 2.0 * distance)
        .max(0.0)
        .round() as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Recency
// ────────────────────────────────────────────────────────────────────────────

pub fn recency_score(posted_at: Option<NaiveDate>, today: NaiveDate) -> u8 {
    let Some(posted_at) = posted_at else {
        return RECENCY_UNKNOWN;
    };
    let days = (today - posted_at).num_days();
    if days <= 0 {
        return RECENCY_MAX;
    }
    let score = f64::from(RECENCY_MAX) * (1.0 - days as f64 / RECENCY_WINDOW_DAYS);
    score.round().clamp(0.0, f64::from(RECENCY_MAX)) as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Education
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegreeLevel {
    Bachelor,
    Master,
    Doctorate,
}

static DEGREE_PATTERNS: LazyLock<Vec<(Regex, DegreeLevel)>> = LazyLock::new(|| {
    [
        (
            r"\b(bachelor'?s?\b|b\.?\s?tech\b|b\.?\s?sc\b|b\.?\s?com\b|b\.e\.|undergraduate degree)",
            DegreeLevel::Bachelor,
        ),
        (
            r"\b(master'?s?\b|m\.?\s?tech\b|m\.?\s?sc\b|mba\b|mfe\b|post-?graduate\b)",
            DegreeLevel::Master,
        ),
        (r"\b(ph\.?\s?d\b|doctorate\b|doctoral\b)", DegreeLevel::Doctorate),
    ]
    .into_iter()
    .map(|(pattern, level)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("static degree regex");
        (regex, level)
    })
    .collect()
});

impl DegreeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegreeLevel::Bachelor => "bachelor",
            DegreeLevel::Master => "master",
            DegreeLevel::Doctorate => "doctorate",
        }
    }

    /// Every level mentioned in the text.
    fn mentioned(text: &str) -> impl Iterator<Item = DegreeLevel> + '_ {
        DEGREE_PATTERNS
            .iter()
            .filter(|(regex, _)| regex.is_match(text))
            .map(|(_, level)| *level)
    }

    /// Highest level mentioned; what a CV holds.
    pub fn highest_in(text: &str) -> Option<DegreeLevel> {
        Self::mentioned(text).max()
    }

    /// Lowest level mentioned; what a posting requires ("bachelor's required,
    /// master's preferred" requires a bachelor's).
    pub fn required_by(text: &str) -> Option<DegreeLevel> {
        Self::mentioned(text).min()
    }
}

pub fn education_score(required: Option<DegreeLevel>, candidate: Option<DegreeLevel>) -> u8 {
    match (required, candidate) {
        (None, _) => EDUCATION_MAX,
        (Some(required), Some(held)) if held >= required => EDUCATION_MAX,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_title_takes_highest_matching_weight() {
        assert_eq!(title_score("Quant Analyst"), 25);
        assert_eq!(title_score("Quantitative Researcher"), 25);
        assert_eq!(title_score("Machine Learning Engineer"), 22);
        assert_eq!(title_score("Senior Data Scientist"), 20);
        assert_eq!(title_score("Data Engineer II"), 18);
        assert_eq!(title_score("Model Validation Associate"), 16);
        assert_eq!(title_score("Business Analyst"), 12);
        assert_eq!(title_score("Office Manager"), 0);
        assert_eq!(title_score("Quantity Surveyor"), 0);
    }

    #[test]
    fn test_skills_fraction_scaled_to_thirty() {
        let skills = vec!["python".to_string(), "sql".to_string(), "spark".to_string()];
        assert_eq!(skills_score(&skills, "We use Python and SQL daily"), 20);
        assert_eq!(skills_score(&skills, "Python, SQL, Spark"), 30);
        assert_eq!(skills_score(&skills, "PostgreSQL only"), 0);
        assert_eq!(skills_score(&[], "Python"), 0);
    }

    #[test]
    fn test_location_tiers() {
        let targets = LocationTargets {
            primary: vec!["mumbai".into()],
            secondary: vec!["pune".into(), "india".into()],
        };
        assert_eq!(location_score(Some("Mumbai, Maharashtra"), &targets), 20);
        assert_eq!(location_score(Some("Pune"), &targets), 12);
        assert_eq!(location_score(Some("Chennai, India"), &targets), 12);
        assert_eq!(location_score(Some("London"), &targets), 0);
        assert_eq!(location_score(None, &targets), 0);
    }

    #[test]
    fn test_parse_experience_forms() {
        assert_eq!(
            parse_experience_requirement("Requires 2-4 years of experience"),
            Some(ExperienceRange { min: 2.0, max: Some(4.0) })
        );
        assert_eq!(
            parse_experience_requirement("5+ years in finance"),
            Some(ExperienceRange { min: 5.0, max: None })
        );
        assert_eq!(
            parse_experience_requirement("at least 3 years"),
            Some(ExperienceRange { min: 3.0, max: Some(3.0) })
        );
        assert_eq!(
            parse_experience_requirement("1 to 3 yrs"),
            Some(ExperienceRange { min: 1.0, max: Some(3.0) })
        );
        assert_eq!(parse_experience_requirement("Python and SQL"), None);
    }

    #[test]
    fn test_experience_score_distance_penalty() {
        let range = Some(ExperienceRange { min: 2.0, max: Some(4.0) });
        assert_eq!(experience_score(range, 3.0), 10);
        assert_eq!(experience_score(range, 1.0), 8);
        assert_eq!(experience_score(range, 7.0), 4);
        assert_eq!(experience_score(range, 0.0), 6);
        assert_eq!(experience_score(Some(ExperienceRange { min: 10.0, max: None }), 0.0), 0);
        assert_eq!(experience_score(Some(ExperienceRange { min: 5.0, max: None }), 20.0), 10);
        assert_eq!(experience_score(None, 0.0), 10);
    }

    #[test]
    fn test_recency_decays_over_ninety_days() {
        let today = date(2024, 6, 30);
        assert_eq!(recency_score(Some(today), today), 10);
        assert_eq!(recency_score(Some(date(2024, 7, 5)), today), 10);
        assert_eq!(recency_score(Some(date(2024, 5, 31)), today), 7);
        assert_eq!(recency_score(Some(date(2024, 4, 1)), today), 0);
        assert_eq!(recency_score(Some(date(2023, 1, 1)), today), 0);
        assert_eq!(recency_score(None, today), 5);
    }

    #[test]
    fn test_degree_detection() {
        assert_eq!(
            DegreeLevel::highest_in("B.Tech in CS, Master's in Finance"),
            Some(DegreeLevel::Master)
        );
        assert_eq!(DegreeLevel::highest_in("PhD, Statistics"), Some(DegreeLevel::Doctorate));
        assert_eq!(
            DegreeLevel::required_by("Bachelor's degree required; Master's preferred"),
            Some(DegreeLevel::Bachelor)
        );
        assert_eq!(DegreeLevel::highest_in("Self-taught developer"), None);
        assert_eq!(DegreeLevel::highest_in("Mastered Python quickly"), None);
    }

    #[test]
    fn test_education_score() {
        use DegreeLevel::*;
        assert_eq!(education_score(None, None), 5);
        assert_eq!(education_score(Some(Master), Some(Doctorate)), 5);
        assert_eq!(education_score(Some(Master), Some(Master)), 5);
        assert_eq!(education_score(Some(Master), Some(Bachelor)), 0);
        assert_eq!(education_score(Some(Bachelor), None), 0);
    }
}

//! Pattern heuristics that structure raw CV text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::scoring::rules::DegreeLevel;
use crate::text::{collapse_whitespace, contains_term};

/// Canonical skill name and the spellings that map to it.
const SKILLS: &[(&str, &[&str])] = &[
    ("python", &[]),
    ("sql", &[]),
    ("pandas", &[]),
    ("numpy", &[]),
    ("scikit-learn", &["sklearn", "scikit learn"]),
    ("pytorch", &[]),
    ("tensorflow", &[]),
    ("keras", &[]),
    ("xgboost", &[]),
    ("catboost", &[]),
    ("lightgbm", &[]),
    ("spark", &["pyspark", "apache spark", "spark sql"]),
    ("hadoop", &[]),
    ("hive", &["apache hive", "hiveql", "hive sql"]),
    ("kafka", &[]),
    ("airflow", &[]),
    ("dbt", &[]),
    ("snowflake", &[]),
    ("databricks", &[]),
    ("aws", &["amazon web services"]),
    ("gcp", &["google cloud"]),
    ("azure", &[]),
    ("docker", &[]),
    ("kubernetes", &["k8s"]),
    ("git", &["github", "gitlab", "git/github", "git version control"]),
    ("linux", &[]),
    ("java", &[]),
    ("scala", &[]),
    ("c++", &["cpp"]),
    ("rust", &["rustlang", "rust programming", "rust language"]),
    ("go", &["golang"]),
    ("matlab", &[]),
    ("sas", &[]),
    ("stata", &[]),
    ("vba", &[]),
    ("excel", &["ms excel", "microsoft excel", "advanced excel", "excel vba"]),
    ("tableau", &[]),
    ("power bi", &["powerbi"]),
    ("looker", &[]),
    ("postgresql", &["postgres"]),
    ("mysql", &[]),
    ("mongodb", &[]),
    ("machine learning", &[]),
    ("deep learning", &[]),
    ("nlp", &["natural language processing"]),
    ("llm", &["large language models"]),
    ("time series", &[]),
    ("feature engineering", &[]),
    ("statistics", &["statistical modeling", "statistical modelling"]),
    ("probability", &[]),
    ("regression", &[]),
    ("classification", &[]),
    ("clustering", &[]),
    ("econometrics", &[]),
    ("stochastic calculus", &[]),
    ("derivatives pricing", &["derivatives"]),
    ("risk management", &[]),
    ("data visualization", &["data visualisation"]),
    ("etl", &[]),
];

/// Skill names that are also everyday English ("go live", "excel at").
/// Only their aliases count as a mention in free text.
const AMBIGUOUS_NAMES: &[&str] = &["go", "excel", "git", "spark", "hive", "rust"];

/// Lowercased, whitespace-collapsed form used for every stored skill.
pub fn normalize_skill(raw: &str) -> String {
    collapse_whitespace(&raw.to_lowercase())
}

/// Canonical form for a known spelling, or the normalized input.
pub fn canonical_skill(raw: &str) -> String {
    let normalized = normalize_skill(raw);
    SKILLS
        .iter()
        .find(|(name, aliases)| *name == normalized || aliases.contains(&normalized.as_str()))
        .map(|(name, _)| name.to_string())
        .unwrap_or(normalized)
}

/// Vocabulary skills mentioned in the text, sorted and deduplicated.
pub fn detect_skills(text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    SKILLS
        .iter()
        .filter(|(name, aliases)| {
            let bare = !AMBIGUOUS_NAMES.contains(name) && contains_term(&haystack, name);
            bare || aliases.iter().any(|a| contains_term(&haystack, a))
        })
        .map(|(name, _)| name.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

static RE_YEARS_EXPERIENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2}(?:\.\d)?)\s*\+?\s*(?:years?|yrs?)(?:\s+of)?(?:\s+[a-z/-]+){0,3}?\s+experience",
    )
    .expect("static experience regex")
});
static RE_EXPERIENCE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bexperience\s*[:\-–]?\s*(\d{1,2}(?:\.\d)?)\s*\+?\s*(?:years?|yrs?)\b")
        .expect("static experience regex")
});

/// Largest "N years ... experience" figure in the text; 0 when none.
pub fn detect_years_experience(text: &str) -> f64 {
    RE_YEARS_EXPERIENCE
        .captures_iter(text)
        .chain(RE_EXPERIENCE_LABEL.captures_iter(text))
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .filter(|years| *years <= 50.0)
        .fold(0.0, f64::max)
}

pub fn detect_education(text: &str) -> Option<DegreeLevel> {
    DegreeLevel::highest_in(text)
}

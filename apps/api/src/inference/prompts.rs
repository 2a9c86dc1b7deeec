use super::MatchPrompt;
use crate::text::truncate_chars;

/// CV characters sent when asking for profile hints.
pub const PROFILE_HINT_CV_CHARS: usize = 3000;

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

pub fn match_prompt(prompt: &MatchPrompt) -> String {
    let skills = if prompt.skills.is_empty() {
        "Not specified".to_string()
    } else {
        prompt.skills.join(", ")
    };

    format!(
        r#"You are a career advisor. Rate how well this job matches the candidate's profile.

Candidate:
- Skills: {skills}
- Experience: {years} years
- Education: {education}

Job to evaluate:
- Title: {title}
- Location: {location}
- Description: {description}

Return ONLY valid JSON with an integer score from 0 to 100 and a one or two sentence reasoning:
{{
  "score": 85,
  "reasoning": "Strong match: the role requires Python and SQL, which the candidate has."
}}"#,
        years = prompt.years_experience,
        education = prompt.education.as_deref().unwrap_or("Not specified"),
        title = prompt.title,
        location = prompt.location.as_deref().unwrap_or("Not specified"),
        description = prompt.description,
    )
}

pub fn profile_hints_prompt(cv_text: &str) -> String {
    format!(
        r#"Analyze this CV and extract information in JSON format.

CV Text:
{cv}

Extract:
1. technical_skills: list of technical skills (programming languages, tools, frameworks)
2. years_experience: total years of professional experience (number)
3. education: highest education level

Return ONLY valid JSON:
{{
  "technical_skills": ["Python", "SQL", "Machine Learning"],
  "years_experience": 3,
  "education": "Bachelor's in Computer Science"
}}"#,
        cv = truncate_chars(cv_text, PROFILE_HINT_CV_CHARS),
    )
}

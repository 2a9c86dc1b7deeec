//! Raw connector output → `NewPosting`.

use std::sync::LazyLock;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::Html;
use tracing::warn;

use super::RawPosting;
use crate::models::posting::NewPosting;
use crate::scoring::{rules, LocationTargets};
use crate::text::{collapse_whitespace, truncate_chars};

pub const DESCRIPTION_MAX_CHARS: usize = 4000;

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*[^<>]*>").expect("static markup regex"));

static DAYS_AGO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\+?\s*days?\s+ago").expect("static relative date regex")
});

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%b %d, %Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Builds the stored form of a raw posting. `None` when nothing usable remains.
pub fn normalize(source_id: &str, raw: RawPosting, today: NaiveDate) -> Option<NewPosting> {
    let title = collapse_whitespace(&raw.title);
    let description = raw
        .description
        .as_deref()
        .map(strip_html)
        .map(|text| truncate_chars(&text, DESCRIPTION_MAX_CHARS).to_string())
        .filter(|text| !text.is_empty());

    if title.is_empty() && description.is_none() {
        warn!(source_id, "Skipping posting with neither title nor description");
        return None;
    }

    let location = raw
        .location
        .as_deref()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty());
    let url = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let posted_at = raw
        .posted
        .as_deref()
        .and_then(|p| parse_posted_date(p, today));

    let external_ref = dedup_key(
        raw.requisition_id.as_deref(),
        &title,
        location.as_deref(),
        url.as_deref(),
    );

    Some(NewPosting {
        source_id: source_id.to_string(),
        external_ref,
        title,
        location,
        description,
        posted_at,
        url,
        raw_fields: raw.raw,
    })
}

/// Requisition id when present, else the lowercase `title::location::url`.
pub fn dedup_key(
    requisition_id: Option<&str>,
    title: &str,
    location: Option<&str>,
    url: Option<&str>,
) -> String {
    match requisition_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => format!(
            "{}::{}::{}",
            collapse_whitespace(title),
            collapse_whitespace(location.unwrap_or_default()),
            url.unwrap_or_default().trim()
        )
        .to_lowercase(),
    }
}

/// Postings without a location are kept; the rest must name a target location.
pub fn location_allowed(location: Option<&str>, targets: &LocationTargets) -> bool {
    location.is_none() || rules::location_score(location, targets) > 0
}

/// Visible text of an HTML fragment, whitespace-collapsed.
///
/// Some boards entity-escape their HTML (`&lt;p&gt;`), so the first pass yields
/// markup; that is parsed once more.
pub fn strip_html(input: &str) -> String {
    let text = html_text(input);
    if MARKUP.is_match(&text) {
        html_text(&text)
    } else {
        text
    }
}

fn html_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in fragment.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|el| matches!(el.name(), "script" | "style"));
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Parses the date formats seen across boards: ISO dates and datetimes, epoch
/// milliseconds, `30 Jun 2024`, `Jun 30, 2024`, and Workday's "Posted N Days Ago".
pub fn parse_posted_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = raw.parse().ok()?;
        // Ten digits or fewer are epoch seconds.
        let millis = if raw.len() <= 10 { value * 1000 } else { value };
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    let naive = raw.trim_end_matches('Z');
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    relative_date(&raw.to_lowercase(), today)
}

fn relative_date(lower: &str, today: NaiveDate) -> Option<NaiveDate> {
    if lower.contains("today") || lower.contains("just posted") {
        return Some(today);
    }
    if lower.contains("yesterday") {
        return today.checked_sub_days(Days::new(1));
    }
    let days: u64 = DAYS_AGO.captures(lower)?.get(1)?.as_str().parse().ok()?;
    today.checked_sub_days(Days::new(days))
}

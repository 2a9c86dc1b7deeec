use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A stored job posting. `(source_id, external_ref)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostingRow {
    pub id: i64,
    pub source_id: String,
    pub external_ref: String,
    pub title: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub posted_at: Option<NaiveDate>,
    pub url: Option<String>,
    pub raw_fields: Value,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized posting ready to be upserted. Produced from a connector's raw output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub source_id: String,
    pub external_ref: String,
    pub title: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub posted_at: Option<NaiveDate>,
    pub url: Option<String>,
    pub raw_fields: Value,
}

/// Posting joined with its current match, as listed by the dashboard API.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PostingListItem {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub posting: PostingRow,
    pub match_score: Option<i16>,
    pub match_reasoning: Option<String>,
}

//! Persistence boundary for postings, match results and the candidate profile.
//!
//! `AppState` carries an `Arc<dyn JobStore>`: Postgres when `DATABASE_URL` is set,
//! the in-memory store otherwise (local runs and tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::match_result::MatchResult;
use crate::models::posting::{NewPosting, PostingListItem, PostingRow};
use crate::models::profile::CandidateProfile;

pub mod memory;
pub mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Posting {0} does not exist")]
    UnknownPosting(i64),
}

/// Result of upserting one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

/// Listing filters. `page` is 1-based.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostingQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub min_score: Option<i16>,
    pub search: Option<String>,
}

impl PostingQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip. Widened so that any `page` a client sends stays in range.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1).saturating_mul(u64::from(self.per_page()))
    }

    /// Trimmed, lowercased search term; `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostingPage {
    pub items: Vec<PostingListItem>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub postings: i64,
    pub sources: i64,
    pub matched: i64,
    pub high_matches: i64,
}

/// Stored postings for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SourceSummary {
    pub source_id: String,
    pub postings: i64,
    pub high_matches: i64,
    /// Latest `updated_at` among the source's postings.
    pub last_seen_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upserts one source's batch atomically, keyed by `(source_id, external_ref)`.
    /// Existing rows keep their id and `first_seen_at`.
    async fn upsert_postings(&self, batch: &[NewPosting]) -> Result<Vec<UpsertOutcome>, StoreError>;

    async fn posting_count(&self) -> Result<i64, StoreError>;

    /// Postings without a match result for `profile_version`, ordered by id.
    async fn postings_pending_match(
        &self,
        profile_version: DateTime<Utc>,
    ) -> Result<Vec<PostingRow>, StoreError>;

    /// Replaces the posting's current match result.
    async fn save_match(&self, result: &MatchResult) -> Result<(), StoreError>;

    async fn current_profile(&self) -> Result<Option<CandidateProfile>, StoreError>;

    /// Overwrites the stored profile wholesale.
    async fn replace_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError>;

    async fn list_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError>;

    async fn stats(&self, high_match_threshold: u8) -> Result<StoreStats, StoreError>;

    /// One entry per source that has stored postings, ordered by source id.
    async fn source_summaries(
        &self,
        high_match_threshold: u8,
    ) -> Result<Vec<SourceSummary>, StoreError>;

    /// Short backend name for /health.
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posting_query_defaults_and_clamps() {
        let query = PostingQuery::default();
        assert_eq!((query.page(), query.per_page(), query.offset()), (1, 20, 0));

        let query = PostingQuery {
            page: Some(0),
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!((query.page(), query.per_page(), query.offset()), (1, 100, 0));

        let query = PostingQuery {
            page: Some(3),
            per_page: Some(25),
            ..Default::default()
        };
        assert_eq!(query.offset(), 50);
    }

    #[test]
    fn test_offset_of_last_page_does_not_overflow() {
        let query = PostingQuery {
            page: Some(u32::MAX),
            per_page: Some(100),
            ..Default::default()
        };
        assert_eq!(query.offset(), (u64::from(u32::MAX) - 1) * 100);
    }

    #[test]
    fn test_search_term_is_trimmed_and_lowercased() {
        let query = PostingQuery {
            search: Some("  Quant ".into()),
            ..Default::default()
        };
        assert_eq!(query.search_term().as_deref(), Some("quant"));
        let blank = PostingQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(blank.search_term(), None);
    }
}

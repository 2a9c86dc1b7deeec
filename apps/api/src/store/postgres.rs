use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use super::{
    JobStore, PostingPage, PostingQuery, SourceSummary, StoreError, StoreStats, UpsertOutcome,
};
use crate::models::match_result::MatchResult;
use crate::models::posting::{NewPosting, PostingListItem, PostingRow};
use crate::models::profile::CandidateProfile;

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

const LIST_FILTER: &str = r#"
    FROM postings p
    LEFT JOIN match_results m ON m.posting_id = p.id
    WHERE ($1::smallint IS NULL OR m.score >= $1)
      AND ($2::text IS NULL
           OR p.title ILIKE $2
           OR p.description ILIKE $2
           OR p.location ILIKE $2)
"#;

#[async_trait]
impl JobStore for PgJobStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_postings(&self, batch: &[NewPosting]) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(batch.len());

        for posting in batch {
            // xmax is zero only for rows created by this statement.
            let (id, inserted): (i64, bool) = sqlx::query_as(
                r#"
                INSERT INTO postings
                    (source_id, external_ref, title, location, description, posted_at, url, raw_fields)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (source_id, external_ref) DO UPDATE SET
                    title = EXCLUDED.title,
                    location = EXCLUDED.location,
                    description = EXCLUDED.description,
                    posted_at = EXCLUDED.posted_at,
                    url = EXCLUDED.url,
                    raw_fields = EXCLUDED.raw_fields,
                    updated_at = NOW()
                RETURNING id, (xmax = 0) AS inserted
                "#,
            )
            .bind(&posting.source_id)
            .bind(&posting.external_ref)
            .bind(&posting.title)
            .bind(&posting.location)
            .bind(&posting.description)
            .bind(posting.posted_at)
            .bind(&posting.url)
            .bind(&posting.raw_fields)
            .fetch_one(&mut *tx)
            .await?;

            outcomes.push(if inserted {
                UpsertOutcome::Inserted(id)
            } else {
                UpsertOutcome::Updated(id)
            });
        }

        tx.commit().await?;
        debug!("Upserted {} postings", outcomes.len());
        Ok(outcomes)
    }

    async fn posting_count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM postings")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn postings_pending_match(
        &self,
        profile_version: DateTime<Utc>,
    ) -> Result<Vec<PostingRow>, StoreError> {
        Ok(sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT p.*
            FROM postings p
            LEFT JOIN match_results m ON m.posting_id = p.id
            WHERE m.posting_id IS NULL OR m.profile_version <> $1
            ORDER BY p.id
            "#,
        )
        .bind(profile_version)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn save_match(&self, result: &MatchResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_results
                (posting_id, profile_version, score, reasoning, sub_scores, ai_score, scorer, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (posting_id) DO UPDATE SET
                profile_version = EXCLUDED.profile_version,
                score = EXCLUDED.score,
                reasoning = EXCLUDED.reasoning,
                sub_scores = EXCLUDED.sub_scores,
                ai_score = EXCLUDED.ai_score,
                scorer = EXCLUDED.scorer,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(result.posting_id)
        .bind(result.profile_version)
        .bind(i16::from(result.score))
        .bind(&result.reasoning)
        .bind(Json(&result.sub_scores))
        .bind(result.ai_score.map(i16::from))
        .bind(result.scorer.as_str())
        .bind(result.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn current_profile(&self) -> Result<Option<CandidateProfile>, StoreError> {
        Ok(sqlx::query_as::<_, CandidateProfile>(
            r#"
            SELECT filename, raw_text, skills, years_experience, education, extracted_at
            FROM candidate_profile
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn replace_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO candidate_profile
                (id, filename, raw_text, skills, years_experience, education, extracted_at)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                filename = EXCLUDED.filename,
                raw_text = EXCLUDED.raw_text,
                skills = EXCLUDED.skills,
                years_experience = EXCLUDED.years_experience,
                education = EXCLUDED.education,
                extracted_at = EXCLUDED.extracted_at
            "#,
        )
        .bind(&profile.filename)
        .bind(&profile.raw_text)
        .bind(&profile.skills)
        .bind(profile.years_experience)
        .bind(&profile.education)
        .bind(profile.extracted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError> {
        let pattern = query.search_term().map(|t| like_pattern(&t));

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {LIST_FILTER}"))
            .bind(query.min_score)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, PostingListItem>(&format!(
            r#"
            SELECT p.*, m.score AS match_score, m.reasoning AS match_reasoning
            {LIST_FILTER}
            ORDER BY p.first_seen_at DESC, p.id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(query.min_score)
        .bind(&pattern)
        .bind(i64::from(query.per_page()))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(PostingPage { items, total })
    }

    async fn stats(&self, high_match_threshold: u8) -> Result<StoreStats, StoreError> {
        let (postings, sources, matched, high_matches): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM postings),
                (SELECT COUNT(DISTINCT source_id) FROM postings),
                (SELECT COUNT(*) FROM match_results),
                (SELECT COUNT(*) FROM match_results WHERE score >= $1)
            "#,
        )
        .bind(i16::from(high_match_threshold))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            postings,
            sources,
            matched,
            high_matches,
        })
    }

    async fn source_summaries(
        &self,
        high_match_threshold: u8,
    ) -> Result<Vec<SourceSummary>, StoreError> {
        let summaries = sqlx::query_as::<_, SourceSummary>(
            r#"
            SELECT
                p.source_id,
                COUNT(*) AS postings,
                COUNT(m.posting_id) FILTER (WHERE m.score >= $1) AS high_matches,
                MAX(p.updated_at) AS last_seen_at
            FROM postings p
            LEFT JOIN match_results m ON m.posting_id = p.id
            GROUP BY p.source_id
            ORDER BY p.source_id
            "#,
        )
        .bind(i16::from(high_match_threshold))
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }
}

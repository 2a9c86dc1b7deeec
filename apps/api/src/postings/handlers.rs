use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::posting::PostingListItem;
use crate::state::{AppState, ConfiguredSource};
use crate::store::{PostingQuery, SourceSummary};

#[derive(Debug, Serialize)]
pub struct PostingListResponse {
    pub items: Vec<PostingListItem>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// GET /api/v1/postings?page=&per_page=&min_score=&search=
///
/// Newest first. `per_page` is clamped to 1..=100; `min_score` keeps only
/// postings whose current match is at least that score.
pub async fn handle_list_postings(
    State(state): State<AppState>,
    Query(query): Query<PostingQuery>,
) -> Result<Json<PostingListResponse>, AppError> {
    if let Some(min) = query.min_score {
        if !(0..=100).contains(&min) {
            return Err(AppError::Validation(format!(
                "min_score must be between 0 and 100, got {min}"
            )));
        }
    }

    let page = state.store.list_postings(&query).await?;
    Ok(Json(PostingListResponse {
        items: page.items,
        total: page.total,
        page: query.page(),
        per_page: query.per_page(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_postings: i64,
    pub matched: i64,
    pub high_matches: i64,
    pub sources: i64,
    pub high_match_threshold: u8,
}

/// GET /api/v1/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let threshold = state.pipeline.high_match_threshold();
    let stats = state.store.stats(threshold).await?;
    Ok(Json(StatsResponse {
        total_postings: stats.postings,
        matched: stats.matched,
        high_matches: stats.high_matches,
        sources: stats.sources,
        high_match_threshold: threshold,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyEntry {
    pub source_id: String,
    /// Company name from the sources file; `None` for sources no longer configured.
    pub name: Option<String>,
    pub configured: bool,
    pub postings: i64,
    pub high_matches: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CompaniesResponse {
    pub companies: Vec<CompanyEntry>,
}

/// Configured sources first, in scrape order, then sources that only have stored
/// postings.
fn merge_companies(
    configured: &[ConfiguredSource],
    mut summaries: Vec<SourceSummary>,
) -> Vec<CompanyEntry> {
    let mut companies: Vec<CompanyEntry> = configured
        .iter()
        .map(|source| {
            let summary = summaries
                .iter()
                .position(|s| s.source_id == source.source_id)
                .map(|i| summaries.remove(i));
            CompanyEntry {
                source_id: source.source_id.clone(),
                name: Some(source.name.clone()),
                configured: true,
                postings: summary.as_ref().map_or(0, |s| s.postings),
                high_matches: summary.as_ref().map_or(0, |s| s.high_matches),
                last_seen_at: summary.map(|s| s.last_seen_at),
            }
        })
        .collect();

    companies.extend(summaries.into_iter().map(|s| CompanyEntry {
        source_id: s.source_id,
        name: None,
        configured: false,
        postings: s.postings,
        high_matches: s.high_matches,
        last_seen_at: Some(s.last_seen_at),
    }));
    companies
}

/// GET /api/v1/companies
pub async fn handle_companies(
    State(state): State<AppState>,
) -> Result<Json<CompaniesResponse>, AppError> {
    let threshold = state.pipeline.high_match_threshold();
    let summaries = state.store.source_summaries(threshold).await?;
    Ok(Json(CompaniesResponse {
        companies: merge_companies(&state.sources, summaries),
    }))
}

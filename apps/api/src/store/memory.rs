use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    JobStore, PostingPage, PostingQuery, SourceSummary, StoreError, StoreStats, UpsertOutcome,
};
use crate::models::match_result::MatchResult;
use crate::models::posting::{NewPosting, PostingListItem, PostingRow};
use crate::models::profile::CandidateProfile;

#[derive(Default)]
struct Tables {
    postings: BTreeMap<i64, PostingRow>,
    keys: HashMap<(String, String), i64>,
    matches: HashMap<i64, MatchResult>,
    profile: Option<CandidateProfile>,
    next_id: i64,
}

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: RwLock<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(posting: &PostingRow, term: &str) -> bool {
    [
        Some(posting.title.as_str()),
        posting.description.as_deref(),
        posting.location.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(term))
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert_postings(&self, batch: &[NewPosting]) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(batch.len());

        for new in batch {
            let key = (new.source_id.clone(), new.external_ref.clone());
            match tables.keys.get(&key).copied() {
                Some(id) => {
                    if let Some(existing) = tables.postings.get_mut(&id) {
                        existing.title = new.title.clone();
                        existing.location = new.location.clone();
                        existing.description = new.description.clone();
                        existing.posted_at = new.posted_at;
                        existing.url = new.url.clone();
                        existing.raw_fields = new.raw_fields.clone();
                        existing.updated_at = now;
                    }
                    outcomes.push(UpsertOutcome::Updated(id));
                }
                None => {
                    tables.next_id += 1;
                    let id = tables.next_id;
                    tables.postings.insert(
                        id,
                        PostingRow {
                            id,
                            source_id: new.source_id.clone(),
                            external_ref: new.external_ref.clone(),
                            title: new.title.clone(),
                            location: new.location.clone(),
                            description: new.description.clone(),
                            posted_at: new.posted_at,
                            url: new.url.clone(),
                            raw_fields: new.raw_fields.clone(),
                            first_seen_at: now,
                            updated_at: now,
                        },
                    );
                    tables.keys.insert(key, id);
                    outcomes.push(UpsertOutcome::Inserted(id));
                }
            }
        }

        Ok(outcomes)
    }

    async fn posting_count(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.postings.len() as i64)
    }

    async fn postings_pending_match(
        &self,
        profile_version: DateTime<Utc>,
    ) -> Result<Vec<PostingRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .postings
            .values()
            .filter(|p| {
                tables
                    .matches
                    .get(&p.id)
                    .map(|m| m.profile_version != profile_version)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn save_match(&self, result: &MatchResult) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.postings.contains_key(&result.posting_id) {
            return Err(StoreError::UnknownPosting(result.posting_id));
        }
        tables.matches.insert(result.posting_id, result.clone());
        Ok(())
    }

    async fn current_profile(&self) -> Result<Option<CandidateProfile>, StoreError> {
        Ok(self.tables.read().await.profile.clone())
    }

    async fn replace_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError> {
        self.tables.write().await.profile = Some(profile.clone());
        Ok(())
    }

    async fn list_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError> {
        let tables = self.tables.read().await;
        let term = query.search_term();

        let mut filtered: Vec<PostingListItem> = tables
            .postings
            .values()
            .rev()
            .filter(|p| term.as_deref().map(|t| matches_search(p, t)).unwrap_or(true))
            .map(|p| {
                let current = tables.matches.get(&p.id);
                PostingListItem {
                    posting: p.clone(),
                    match_score: current.map(|m| i16::from(m.score)),
                    match_reasoning: current.map(|m| m.reasoning.clone()),
                }
            })
            .filter(|item| match query.min_score {
                Some(min) => item.match_score.map(|s| s >= min).unwrap_or(false),
                None => true,
            })
            .collect();

        let total = filtered.len() as i64;
        let items = filtered
            .drain(..)
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.per_page() as usize)
            .collect();

        Ok(PostingPage { items, total })
    }

    async fn stats(&self, high_match_threshold: u8) -> Result<StoreStats, StoreError> {
        let tables = self.tables.read().await;
        let sources: HashSet<&str> = tables
            .postings
            .values()
            .map(|p| p.source_id.as_str())
            .collect();
        Ok(StoreStats {
            postings: tables.postings.len() as i64,
            sources: sources.len() as i64,
            matched: tables.matches.len() as i64,
            high_matches: tables
                .matches
                .values()
                .filter(|m| m.score >= high_match_threshold)
                .count() as i64,
        })
    }

    async fn source_summaries(
        &self,
        high_match_threshold: u8,
    ) -> Result<Vec<SourceSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut by_source: BTreeMap<&str, SourceSummary> = BTreeMap::new();

        for posting in tables.postings.values() {
            let high = tables
                .matches
                .get(&posting.id)
                .is_some_and(|m| m.score >= high_match_threshold);
            let entry = by_source
                .entry(posting.source_id.as_str())
                .or_insert_with(|| SourceSummary {
                    source_id: posting.source_id.clone(),
                    postings: 0,
                    high_matches: 0,
                    last_seen_at: posting.updated_at,
                });
            entry.postings += 1;
            entry.high_matches += i64::from(high);
            entry.last_seen_at = entry.last_seen_at.max(posting.updated_at);
        }

        Ok(by_source.into_values().collect())
    }
}

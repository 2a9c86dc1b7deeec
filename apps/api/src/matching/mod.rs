//! Match orchestration: score every posting that lacks a result for the current
//! profile version, persisting each result as it is produced.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::models::profile::CandidateProfile;
use crate::notify::{DisabledNotifier, MatchAlert, MatchNotifier};
use crate::scoring::ScoringEngine;
use crate::store::{JobStore, StoreError};
use crate::tasks::{MatchCounters, ProgressUpdate, TaskHandle};

pub mod handlers;

pub const HIGH_MATCH_THRESHOLD: u8 = 70;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("No CV uploaded")]
    NoProfile,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct MatchOrchestrator {
    store: Arc<dyn JobStore>,
    engine: ScoringEngine,
    notifier: Arc<dyn MatchNotifier>,
    high_match_threshold: u8,
}

impl MatchOrchestrator {
    pub fn new(store: Arc<dyn JobStore>, engine: ScoringEngine) -> Self {
        Self {
            store,
            engine,
            notifier: Arc::new(DisabledNotifier),
            high_match_threshold: HIGH_MATCH_THRESHOLD,
        }
    }

    /// Alerts every high match a run produces.
    pub fn with_notifier(mut self, notifier: Arc<dyn MatchNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn high_match_threshold(&self) -> u8 {
        self.high_match_threshold
    }

    /// The stored profile, or `NoProfile`. Checked before a match task is created.
    pub async fn require_profile(&self) -> Result<CandidateProfile, MatchError> {
        self.store
            .current_profile()
            .await?
            .ok_or(MatchError::NoProfile)
    }

    /// `match` task body.
    #[instrument(skip_all, fields(task_id = %handle.id(), profile_version = %profile.extracted_at))]
    pub async fn run(
        &self,
        handle: TaskHandle,
        profile: CandidateProfile,
    ) -> Result<ProgressUpdate, MatchError> {
        let pending = self
            .store
            .postings_pending_match(profile.extracted_at)
            .await?;
        let mut counters = MatchCounters {
            total: pending.len() as u64,
            ..Default::default()
        };

        if pending.is_empty() {
            info!("No postings need matching");
            return Ok(
                ProgressUpdate::message("Complete! No postings need matching").with_counters(counters)
            );
        }

        handle
            .update(
                ProgressUpdate::message(format!("Matching {} postings...", pending.len()))
                    .with_counters(counters.clone()),
            )
            .await;

        let mut alerts_sent = 0u64;

        for (index, posting) in pending.iter().enumerate() {
            match self.engine.score(posting, &profile).await {
                Ok(result) => match self.store.save_match(&result).await {
                    Ok(()) => {
                        counters.matched += 1;
                        if result.score >= self.high_match_threshold {
                            counters.high_matches += 1;
                            let alert = MatchAlert::new(posting, result.score);
                            match self.notifier.notify(&alert).await {
                                Ok(()) => alerts_sent += 1,
                                Err(e) => {
                                    warn!(posting_id = posting.id, "High-match alert failed: {e}")
                                }
                            }
                        }
                        debug!(
                            posting_id = posting.id,
                            score = result.score,
                            scorer = result.scorer.as_str(),
                            "Posting matched"
                        );
                    }
                    Err(e) => {
                        warn!(posting_id = posting.id, "Saving match failed: {e}");
                        counters.skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(posting_id = posting.id, "Scoring failed: {e}");
                    counters.skipped += 1;
                }
            }

            handle
                .update(
                    ProgressUpdate::message(format!(
                        "Matched {}/{} postings",
                        index + 1,
                        pending.len()
                    ))
                    .with_counters(counters.clone()),
                )
                .await;
        }

        info!(
            matched = counters.matched,
            high_matches = counters.high_matches,
            skipped = counters.skipped,
            alerts_sent,
            notifier = self.notifier.backend(),
            "Match run complete"
        );

        Ok(ProgressUpdate::message(format!(
            "Complete! Matched {} jobs ({} high matches, {} skipped)",
            counters.matched, counters.high_matches, counters.skipped
        ))
        .with_counters(counters))
    }
}

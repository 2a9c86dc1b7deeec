//! Scrape orchestration: drain every configured source connector and persist.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::posting::NewPosting;
use crate::scoring::LocationTargets;
use crate::sources::normalize::{location_allowed, normalize};
use crate::sources::{SourceConnector, SourceError};
use crate::store::{JobStore, StoreError};
use crate::tasks::{ProgressUpdate, ScrapeCounters, TaskHandle};

pub mod handlers;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("All {count} sources failed: {details}")]
    AllSourcesFailed { count: usize, details: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one source contributed before persistence.
struct SourceBatch {
    seen: u64,
    postings: Vec<NewPosting>,
}

pub struct ScrapeOrchestrator {
    connectors: Vec<Arc<dyn SourceConnector>>,
    store: Arc<dyn JobStore>,
    /// When set, raw postings outside these locations are dropped.
    location_filter: Option<LocationTargets>,
}

impl ScrapeOrchestrator {
    pub fn new(
        connectors: Vec<Arc<dyn SourceConnector>>,
        store: Arc<dyn JobStore>,
        location_filter: Option<LocationTargets>,
    ) -> Self {
        Self {
            connectors,
            store,
            location_filter,
        }
    }

    /// `scrape` task body. Sources run in configuration order; each source's
    /// postings are written in one batch after its stream is fully drained, so a
    /// source that fails midway writes nothing.
    #[instrument(skip_all, fields(task_id = %handle.id(), sources = self.connectors.len()))]
    pub async fn run(&self, handle: TaskHandle) -> Result<ProgressUpdate, ScrapeError> {
        let total = self.connectors.len();
        let mut counters = ScrapeCounters {
            sources_total: total as u64,
            ..Default::default()
        };

        if total == 0 {
            info!("No sources configured; nothing to scrape");
            return Ok(ProgressUpdate::message("No sources configured").with_counters(counters));
        }

        handle
            .update(
                ProgressUpdate::message(format!("Scraping {total} sources..."))
                    .with_counters(counters.clone()),
            )
            .await;

        let today = Utc::now().date_naive();
        let mut failures: Vec<String> = Vec::new();

        for (index, connector) in self.connectors.iter().enumerate() {
            let mut message = format!("Scraped {}/{total} sources", index + 1);

            match self.drain(connector.as_ref(), today).await {
                Ok(batch) => {
                    let outcomes = self.store.upsert_postings(&batch.postings).await?;
                    let new = outcomes.iter().filter(|o| o.is_new()).count() as u64;
                    counters.postings_seen += batch.seen;
                    counters.new_postings += new;
                    info!(
                        source = connector.source_id(),
                        seen = batch.seen,
                        stored = outcomes.len(),
                        new,
                        "Source scraped"
                    );
                }
                Err(e) => {
                    warn!(source = connector.source_id(), "Source failed: {e}");
                    counters.sources_failed += 1;
                    message.push_str(&format!(" ({} failed: {e})", connector.name()));
                    failures.push(format!("{}: {e}", connector.name()));
                }
            }

            counters.sources_done += 1;
            handle
                .update(ProgressUpdate::message(message).with_counters(counters.clone()))
                .await;
        }

        if failures.len() == total {
            return Err(ScrapeError::AllSourcesFailed {
                count: total,
                details: failures.join("; "),
            });
        }

        Ok(ProgressUpdate::message(format!(
            "Complete! {} new postings from {} seen ({} of {total} sources failed)",
            counters.new_postings, counters.postings_seen, counters.sources_failed
        ))
        .with_counters(counters))
    }

    async fn drain(
        &self,
        connector: &dyn SourceConnector,
        today: NaiveDate,
    ) -> Result<SourceBatch, SourceError> {
        let mut stream = connector.fetch();
        let mut batch = SourceBatch {
            seen: 0,
            postings: Vec::new(),
        };

        while let Some(raw) = stream.try_next().await? {
            batch.seen += 1;
            if let Some(targets) = &self.location_filter {
                if !location_allowed(raw.location.as_deref(), targets) {
                    continue;
                }
            }
            if let Some(posting) = normalize(connector.source_id(), raw, today) {
                batch.postings.push(posting);
            }
        }
        Ok(batch)
    }
}

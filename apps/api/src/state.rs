use std::sync::Arc;

use crate::config::Config;
use crate::inference::InferenceClient;
use crate::matching::MatchOrchestrator;
use crate::notify::MatchNotifier;
use crate::pipeline::Pipeline;
use crate::profile::archive::UploadArchive;
use crate::profile::extract::DocumentTextExtractor;
use crate::profile::ProfileExtractor;
use crate::scoring::ScoringEngine;
use crate::scrape::ScrapeOrchestrator;
use crate::sources::SourceConnector;
use crate::store::JobStore;
use crate::tasks::TaskManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres-backed, or in-memory when no database is configured.
    pub store: Arc<dyn JobStore>,
    pub tasks: TaskManager,
    pub pipeline: Pipeline,
    pub profiles: ProfileExtractor,
    /// CV archive. `None` when S3 is not configured.
    pub archive: Option<UploadArchive>,
    pub config: Config,
    /// Configured sources in scrape order.
    pub sources: Arc<Vec<ConfiguredSource>>,
    /// Reported by /health.
    pub inference_backend: &'static str,
    pub notifier_backend: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredSource {
    pub source_id: String,
    pub name: String,
}

impl AppState {
    /// Wires orchestrators, scoring and profile extraction around one store and
    /// one inference client.
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        connectors: Vec<Arc<dyn SourceConnector>>,
        inference: Arc<dyn InferenceClient>,
        notifier: Arc<dyn MatchNotifier>,
        archive: Option<UploadArchive>,
    ) -> Self {
        let tasks = TaskManager::new(config.task_retention);

        let engine = ScoringEngine::new(
            inference.clone(),
            config.blend_weights,
            config.locations.clone(),
            config.inference_timeout,
        );
        let location_filter = config
            .scrape_location_filter
            .then(|| config.locations.clone());
        let sources = connectors
            .iter()
            .map(|c| ConfiguredSource {
                source_id: c.source_id().to_string(),
                name: c.name().to_string(),
            })
            .collect();
        let scrape = ScrapeOrchestrator::new(connectors, store.clone(), location_filter);
        let notifier_backend = notifier.backend();
        let matcher = MatchOrchestrator::new(store.clone(), engine).with_notifier(notifier);
        let pipeline = Pipeline::new(tasks.clone(), Arc::new(scrape), Arc::new(matcher));

        let profiles = ProfileExtractor::new(
            Arc::new(DocumentTextExtractor::default()),
            inference.clone(),
            config.inference_timeout,
        );

        Self {
            store,
            tasks,
            pipeline,
            profiles,
            archive,
            config,
            sources: Arc::new(sources),
            inference_backend: inference.backend(),
            notifier_backend,
        }
    }
}

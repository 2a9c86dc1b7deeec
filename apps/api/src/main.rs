mod config;
mod db;
mod errors;
mod inference;
mod matching;
mod models;
mod notify;
mod pipeline;
mod postings;
mod profile;
mod routes;
mod scoring;
mod scrape;
mod sources;
mod state;
mod store;
mod tasks;
mod text;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::inference::{DisabledInference, InferenceClient, OllamaClient};
use crate::notify::{DisabledNotifier, MatchNotifier, TelegramNotifier};
use crate::profile::archive::UploadArchive;
use crate::routes::build_router;
use crate::sources::{build_connectors, load_sources, HttpFetcher};
use crate::state::AppState;
use crate::store::{JobStore, MemoryJobStore, PgJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Malformed settings fail startup; missing ones fall back to defaults.
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobScout API v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => Arc::new(PgJobStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on restart)");
            Arc::new(MemoryJobStore::new())
        }
    };

    let inference: Arc<dyn InferenceClient> = if config.inference_enabled {
        let client = OllamaClient::new(
            &config.ollama_url,
            &config.ollama_model,
            config.inference_timeout,
        )?;
        info!(
            "Inference via Ollama at {} (model: {})",
            config.ollama_url, config.ollama_model
        );
        Arc::new(client)
    } else {
        info!("Inference disabled; scores are rule-based only");
        Arc::new(DisabledInference)
    };

    let notifier: Arc<dyn MatchNotifier> = match &config.telegram {
        Some(settings) => {
            info!("High-match alerts via Telegram chat {}", settings.chat_id);
            Arc::new(TelegramNotifier::new(settings)?)
        }
        None => {
            info!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set; high-match alerts disabled");
            Arc::new(DisabledNotifier)
        }
    };

    let sources = load_sources(&config.sources_file)?;
    let connectors = build_connectors(&sources, &HttpFetcher::new()?);

    let archive = match &config.s3 {
        Some(settings) => {
            info!("Archiving uploaded CVs to bucket {}", settings.bucket);
            Some(UploadArchive::from_settings(settings).await)
        }
        None => None,
    };

    let state = AppState::new(
        config.clone(),
        store,
        connectors,
        inference,
        notifier,
        archive,
    );

    if let Some(interval) = config.schedule_interval {
        state.pipeline.spawn_schedule(interval);
    }

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the dashboard has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

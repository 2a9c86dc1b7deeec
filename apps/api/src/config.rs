use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::scoring::{BlendWeights, LocationTargets};

/// Application configuration loaded from environment variables.
/// Every setting has a default so the service starts with an empty environment;
/// malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub sources_file: PathBuf,
    pub ollama_url: String,
    pub ollama_model: String,
    pub inference_enabled: bool,
    pub inference_timeout: Duration,
    pub blend_weights: BlendWeights,
    pub locations: LocationTargets,
    pub scrape_location_filter: bool,
    pub task_retention: Duration,
    pub max_upload_bytes: usize,
    pub schedule_interval: Option<Duration>,
    pub s3: Option<S3Settings>,
    pub telegram: Option<TelegramSettings>,
}

/// Archive target for uploaded CVs. Present only when `S3_BUCKET` is set.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// High-match alert channel. Present only when both the bot token and the chat
/// id are set.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8080,
            rust_log: "info".to_string(),
            sources_file: PathBuf::from("config/sources.csv"),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3:latest".to_string(),
            inference_enabled: true,
            inference_timeout: Duration::from_secs(30),
            blend_weights: BlendWeights::default(),
            locations: LocationTargets::default(),
            scrape_location_filter: false,
            task_retention: Duration::from_secs(3600),
            max_upload_bytes: 16 * 1024 * 1024,
            schedule_interval: None,
            s3: None,
            telegram: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();

        let blend_weights = BlendWeights::new(
            parse_env("BLEND_RULES_WEIGHT", defaults.blend_weights.rules)?,
            parse_env("BLEND_AI_WEIGHT", defaults.blend_weights.ai)?,
        )
        .context("BLEND_RULES_WEIGHT and BLEND_AI_WEIGHT must be non-negative and not both zero")?;

        let locations = LocationTargets {
            primary: list_env("TARGET_LOCATIONS_PRIMARY").unwrap_or(defaults.locations.primary),
            secondary: list_env("TARGET_LOCATIONS_SECONDARY")
                .unwrap_or(defaults.locations.secondary),
        };

        let schedule_interval = optional_env("SCHEDULE_INTERVAL_MINUTES")
            .map(|v| {
                v.parse::<u64>()
                    .context("SCHEDULE_INTERVAL_MINUTES must be a whole number of minutes")
            })
            .transpose()?
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(minutes * 60));

        let s3 = optional_env("S3_BUCKET").map(|bucket| S3Settings {
            bucket,
            endpoint: optional_env("S3_ENDPOINT"),
            access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
            secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
        });

        let telegram = match (
            optional_env("TELEGRAM_BOT_TOKEN"),
            optional_env("TELEGRAM_CHAT_ID"),
        ) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramSettings {
                bot_token,
                chat_id,
                api_url: optional_env("TELEGRAM_API_URL")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            port: parse_env("PORT", defaults.port)?,
            rust_log: optional_env("RUST_LOG").unwrap_or(defaults.rust_log),
            sources_file: optional_env("SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_file),
            ollama_url: optional_env("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: optional_env("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            inference_enabled: bool_env("INFERENCE_ENABLED", defaults.inference_enabled),
            inference_timeout: Duration::from_secs(parse_env(
                "INFERENCE_TIMEOUT_SECS",
                defaults.inference_timeout.as_secs(),
            )?),
            blend_weights,
            locations,
            scrape_location_filter: bool_env(
                "SCRAPE_LOCATION_FILTER",
                defaults.scrape_location_filter,
            ),
            task_retention: Duration::from_secs(parse_env(
                "TASK_RETENTION_SECS",
                defaults.task_retention.as_secs(),
            )?),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            schedule_interval,
            s3,
            telegram,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn bool_env(key: &str, default: bool) -> bool {
    optional_env(key)
        .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
        .unwrap_or(default)
}

fn list_env(key: &str) -> Option<Vec<String>> {
    optional_env(key).map(|raw| {
        raw.split(',')
            .map(|item| item.trim().to_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

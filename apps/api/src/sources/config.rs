use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::greenhouse::GreenhouseConnector;
use super::lever::LeverConnector;
use super::workday::WorkdayConnector;
use super::{HttpFetcher, SourceConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Greenhouse,
    Lever,
    Workday,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Greenhouse => "greenhouse",
            SourceKind::Lever => "lever",
            SourceKind::Workday => "workday",
        })
    }
}

/// One row of the sources CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub company: String,
    pub kind: SourceKind,
    pub endpoint_url: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub active: bool,
    /// Workday search text; ignored by other kinds.
    #[serde(default)]
    pub search_text: Option<String>,
}

impl SourceConfig {
    /// `morgan-stanley-workday`
    pub fn source_id(&self) -> String {
        format!("{}-{}", slugify(&self.company), self.kind)
    }
}

fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn lenient_bool<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "y" => Ok(true),
        "false" | "no" | "0" | "n" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected true/false, got '{other}'"
        ))),
    }
}

/// Reads active sources in file order. A missing file means no sources.
pub fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    if !path.exists() {
        warn!("Sources file {} not found; scraping is disabled", path.display());
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open sources file {}", path.display()))?;
    let sources = parse_sources(file)
        .with_context(|| format!("Invalid sources file {}", path.display()))?;
    info!("Loaded {} active sources from {}", sources.len(), path.display());
    Ok(sources)
}

fn parse_sources(reader: impl std::io::Read) -> Result<Vec<SourceConfig>> {
    let mut csv = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut sources = Vec::new();
    for (index, row) in csv.deserialize::<SourceConfig>().enumerate() {
        // Header is line 1.
        let mut source = row.with_context(|| format!("Row {} is malformed", index + 2))?;
        if !source.active {
            continue;
        }
        source.search_text = source.search_text.filter(|s| !s.is_empty());
        sources.push(source);
    }
    Ok(sources)
}

pub fn build_connectors(
    sources: &[SourceConfig],
    http: &HttpFetcher,
) -> Vec<Arc<dyn SourceConnector>> {
    sources
        .iter()
        .map(|source| -> Arc<dyn SourceConnector> {
            match source.kind {
                SourceKind::Greenhouse => Arc::new(GreenhouseConnector::new(source, http.clone())),
                SourceKind::Lever => Arc::new(LeverConnector::new(source, http.clone())),
                SourceKind::Workday => Arc::new(WorkdayConnector::new(source, http.clone())),
            }
        })
        .collect()
}

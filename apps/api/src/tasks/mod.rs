//! Background task tracking.
//!
//! Every long-running orchestration (scrape, match, CV analysis) runs as a `Task`
//! owned by the [`TaskManager`]. Orchestrations write progress through their
//! [`TaskHandle`]; HTTP pollers only ever see immutable snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod handlers;
pub mod manager;

pub use manager::{TaskHandle, TaskManager};

// ────────────────────────────────────────────────────────────────────────────
// Identity and lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Opaque task token handed to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a client-supplied token. Anything malformed is simply unknown.
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| TaskError::NotFound(raw.to_string()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Scrape,
    Match,
    CvAnalysis,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Scrape => "scrape",
            TaskKind::Match => "match",
            TaskKind::CvAnalysis => "cv_analysis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Complete,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("A {0} task is already running")]
    AlreadyRunning(TaskKind),

    #[error("Task {0} not found")]
    NotFound(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Kind-specific counters
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeCounters {
    pub sources_total: u64,
    pub sources_done: u64,
    pub sources_failed: u64,
    pub postings_seen: u64,
    pub new_postings: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounters {
    pub matched: u64,
    pub total: u64,
    pub high_matches: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvAnalysisCounters {
    pub chars_extracted: u64,
    pub skills_found: u64,
}

/// Numeric progress fields. Serialized flat next to `status`/`progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskCounters {
    Scrape(ScrapeCounters),
    Match(MatchCounters),
    CvAnalysis(CvAnalysisCounters),
}

impl TaskCounters {
    pub fn zeroed(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Scrape => TaskCounters::Scrape(ScrapeCounters::default()),
            TaskKind::Match => TaskCounters::Match(MatchCounters::default()),
            TaskKind::CvAnalysis => TaskCounters::CvAnalysis(CvAnalysisCounters::default()),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskCounters::Scrape(_) => TaskKind::Scrape,
            TaskCounters::Match(_) => TaskKind::Match,
            TaskCounters::CvAnalysis(_) => TaskKind::CvAnalysis,
        }
    }

    /// Field-wise max merge, so no poller ever observes a counter going down.
    /// Returns `false` (and changes nothing) when the kinds differ.
    fn merge(&mut self, incoming: &TaskCounters) -> bool {
        match (self, incoming) {
            (TaskCounters::Scrape(cur), TaskCounters::Scrape(new)) => {
                cur.sources_total = cur.sources_total.max(new.sources_total);
                cur.sources_done = cur.sources_done.max(new.sources_done);
                cur.sources_failed = cur.sources_failed.max(new.sources_failed);
                cur.postings_seen = cur.postings_seen.max(new.postings_seen);
                cur.new_postings = cur.new_postings.max(new.new_postings);
                true
            }
            (TaskCounters::Match(cur), TaskCounters::Match(new)) => {
                cur.matched = cur.matched.max(new.matched);
                cur.total = cur.total.max(new.total);
                cur.high_matches = cur.high_matches.max(new.high_matches);
                cur.skipped = cur.skipped.max(new.skipped);
                true
            }
            (TaskCounters::CvAnalysis(cur), TaskCounters::CvAnalysis(new)) => {
                cur.chars_extracted = cur.chars_extracted.max(new.chars_extracted);
                cur.skills_found = cur.skills_found.max(new.skills_found);
                true
            }
            _ => false,
        }
    }
}

impl From<ScrapeCounters> for TaskCounters {
    fn from(c: ScrapeCounters) -> Self {
        TaskCounters::Scrape(c)
    }
}

impl From<MatchCounters> for TaskCounters {
    fn from(c: MatchCounters) -> Self {
        TaskCounters::Match(c)
    }
}

impl From<CvAnalysisCounters> for TaskCounters {
    fn from(c: CvAnalysisCounters) -> Self {
        TaskCounters::CvAnalysis(c)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot + partial updates
// ────────────────────────────────────────────────────────────────────────────

/// A task snapshot. Pollers receive clones; only the manager mutates the original.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: String,
    #[serde(flatten)]
    pub counters: TaskCounters,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bumped on every accepted mutation.
    pub version: u64,
}

impl Task {
    fn new(kind: TaskKind) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            status: TaskStatus::Running,
            progress: format!("Starting {kind}..."),
            counters: TaskCounters::zeroed(kind),
            created_at: Utc::now(),
            finished_at: None,
            error: None,
            version: 1,
        }
    }

    fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(message) = &update.message {
            self.progress = message.clone();
        }
        if let Some(counters) = &update.counters {
            if !self.counters.merge(counters) {
                tracing::warn!(
                    task_id = %self.id,
                    expected = %self.kind,
                    got = %counters.kind(),
                    "Ignoring counters of the wrong kind"
                );
            }
        }
        self.version += 1;
    }
}

/// Partial progress: either field may be omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub message: Option<String>,
    pub counters: Option<TaskCounters>,
}

impl ProgressUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            counters: None,
        }
    }

    pub fn counters(counters: impl Into<TaskCounters>) -> Self {
        Self {
            message: None,
            counters: Some(counters.into()),
        }
    }

    pub fn with_counters(mut self, counters: impl Into<TaskCounters>) -> Self {
        self.counters = Some(counters.into());
        self
    }
}

/// Body returned by every "start task" endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StartTaskResponse {
    pub success: bool,
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars_extracted: Option<usize>,
}

impl StartTaskResponse {
    pub fn started(task_id: TaskId) -> Self {
        Self {
            success: true,
            task_id,
            chars_extracted: None,
        }
    }
}

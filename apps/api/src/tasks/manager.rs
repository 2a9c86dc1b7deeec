use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{ProgressUpdate, Task, TaskError, TaskId, TaskKind, TaskStatus};

#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, Task>,
    /// Single-flight slot per kind: the id of the task currently running.
    running: HashMap<TaskKind, TaskId>,
}

impl Registry {
    fn purge_expired(&mut self, retention: Duration) {
        let now = Utc::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, task| match task.finished_at {
            Some(finished) => (now - finished)
                .to_std()
                .map(|elapsed| elapsed < retention)
                .unwrap_or(true),
            None => true,
        });
        let purged = before - self.tasks.len();
        if purged > 0 {
            debug!(purged, "Purged expired tasks");
        }
    }
}

/// Owns every task in the process. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct TaskManager {
    registry: Arc<RwLock<Registry>>,
    retention: Duration,
}

impl TaskManager {
    /// `retention` is how long a finished task stays pollable.
    pub fn new(retention: Duration) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            retention,
        }
    }

    /// Allocates a running task of `kind`, or `AlreadyRunning` if one is in flight.
    pub async fn create(&self, kind: TaskKind) -> Result<TaskHandle, TaskError> {
        let mut registry = self.registry.write().await;
        registry.purge_expired(self.retention);

        if let Some(existing) = registry.running.get(&kind) {
            debug!(%kind, task_id = %existing, "Rejecting concurrent task");
            return Err(TaskError::AlreadyRunning(kind));
        }

        let task = Task::new(kind);
        let id = task.id.clone();
        registry.running.insert(kind, id.clone());
        registry.tasks.insert(id.clone(), task);
        info!(%kind, task_id = %id, "Task created");

        Ok(TaskHandle {
            id,
            kind,
            manager: self.clone(),
        })
    }

    /// Returns an immutable snapshot of the task.
    pub async fn poll(&self, id: &TaskId) -> Result<Task, TaskError> {
        let mut registry = self.registry.write().await;
        registry.purge_expired(self.retention);
        registry
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// Creates a task and runs `work` on the runtime, off the caller's path.
    ///
    /// `work` reports progress through the handle it receives. Its return value
    /// decides the terminal state: `Ok` completes with the final progress, `Err`
    /// fails with the error's message, a panic fails with an abort message.
    pub async fn spawn<F, Fut, E>(&self, kind: TaskKind, work: F) -> Result<TaskId, TaskError>
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ProgressUpdate, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handle = self.create(kind).await?;
        let id = handle.id().clone();

        let worker = tokio::spawn(work(handle.clone()));
        tokio::spawn(async move {
            match worker.await {
                Ok(Ok(done)) => handle.complete(done).await,
                Ok(Err(e)) => {
                    warn!(task_id = %handle.id(), kind = %handle.kind(), "Task failed: {e}");
                    handle.fail(e.to_string()).await;
                }
                Err(join_error) => {
                    error!(task_id = %handle.id(), kind = %handle.kind(), "Task aborted: {join_error}");
                    handle.fail(format!("{} task aborted unexpectedly", handle.kind())).await;
                }
            }
        });

        Ok(id)
    }

    /// Applies `f` to a running task. Terminal tasks are left untouched.
    async fn mutate(&self, id: &TaskId, f: impl FnOnce(&mut Task)) -> bool {
        let mut registry = self.registry.write().await;
        let Some(task) = registry.tasks.get_mut(id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }

        f(task);

        if task.status.is_terminal() {
            let kind = task.kind;
            if registry.running.get(&kind) == Some(id) {
                registry.running.remove(&kind);
            }
        }
        true
    }
}

/// Write access to one task. Handed only to the orchestration that owns the task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    kind: TaskKind,
    manager: TaskManager,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Merges partial progress. No-op once the task is terminal.
    pub async fn update(&self, update: ProgressUpdate) {
        self.manager.mutate(&self.id, |task| task.apply(&update)).await;
    }

    /// Transitions to `complete`. Only the first terminal transition takes effect.
    pub async fn complete(&self, last: ProgressUpdate) {
        let applied = self
            .manager
            .mutate(&self.id, |task| {
                task.apply(&last);
                task.status = TaskStatus::Complete;
                task.finished_at = Some(Utc::now());
            })
            .await;
        if applied {
            info!(task_id = %self.id, kind = %self.kind, "Task complete");
        }
    }

    /// Transitions to `error`. Only the first terminal transition takes effect.
    pub async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let applied = self
            .manager
            .mutate(&self.id, |task| {
                task.progress = format!("Error: {message}");
                task.error = Some(message.clone());
                task.status = TaskStatus::Error;
                task.finished_at = Some(Utc::now());
                task.version += 1;
            })
            .await;
        if applied {
            info!(task_id = %self.id, kind = %self.kind, "Task failed");
        }
    }

    pub async fn snapshot(&self) -> Result<Task, TaskError> {
        self.manager.poll(&self.id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tasks::{MatchCounters, ScrapeCounters, TaskCounters};

    fn manager() -> TaskManager {
        TaskManager::new(Duration::from_secs(3600))
    }

    /// Polls until the task leaves `running`. Panics after ~5s.
    pub(crate) async fn wait_for_terminal(manager: &TaskManager, id: &TaskId) -> Task {
        for _ in 0..500 {
            let task = manager.poll(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_second_create_of_same_kind_is_rejected() {
        let manager = manager();
        for kind in [TaskKind::Scrape, TaskKind::Match, TaskKind::CvAnalysis] {
            let _first = manager.create(kind).await.unwrap();
            let second = manager.create(kind).await;
            assert_eq!(second.err(), Some(TaskError::AlreadyRunning(kind)));
        }
    }

    #[tokio::test]
    async fn test_different_kinds_run_concurrently() {
        let manager = manager();
        let scrape = manager.create(TaskKind::Scrape).await.unwrap();
        let matching = manager.create(TaskKind::Match).await.unwrap();
        assert_ne!(scrape.id(), matching.id());
    }

    #[tokio::test]
    async fn test_kind_is_free_again_after_terminal_state() {
        let manager = manager();
        let first = manager.create(TaskKind::Scrape).await.unwrap();
        first.complete(ProgressUpdate::message("done")).await;
        let second = manager.create(TaskKind::Scrape).await;
        assert!(second.is_ok());

        let second = second.unwrap();
        second.fail("boom").await;
        assert!(manager.create(TaskKind::Scrape).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_task_starts_running_with_zeroed_counters() {
        let manager = manager();
        let handle = manager.create(TaskKind::Match).await.unwrap();
        let task = manager.poll(handle.id()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.counters, TaskCounters::Match(MatchCounters::default()));
        assert!(task.finished_at.is_none());
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn test_update_merges_progress_and_bumps_version() {
        let manager = manager();
        let handle = manager.create(TaskKind::Scrape).await.unwrap();
        let before = handle.snapshot().await.unwrap();

        handle
            .update(
                ProgressUpdate::message("Scraped 1/2 sources").with_counters(ScrapeCounters {
                    sources_total: 2,
                    sources_done: 1,
                    ..Default::default()
                }),
            )
            .await;
        handle.update(ProgressUpdate::message("still going")).await;

        let after = handle.snapshot().await.unwrap();
        assert_eq!(after.progress, "still going");
        assert!(after.version > before.version);
        match after.counters {
            TaskCounters::Scrape(c) => {
                assert_eq!(c.sources_total, 2);
                assert_eq!(c.sources_done, 1);
            }
            other => panic!("unexpected counters {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_task_is_immutable() {
        let manager = manager();
        let handle = manager.create(TaskKind::Match).await.unwrap();
        handle
            .complete(ProgressUpdate::message("Complete!").with_counters(MatchCounters {
                matched: 3,
                total: 3,
                high_matches: 1,
                skipped: 0,
            }))
            .await;
        let frozen = manager.poll(handle.id()).await.unwrap();

        handle
            .update(ProgressUpdate::message("late").with_counters(MatchCounters {
                matched: 9,
                ..Default::default()
            }))
            .await;
        handle.fail("late failure").await;
        handle.complete(ProgressUpdate::message("again")).await;

        let after = manager.poll(handle.id()).await.unwrap();
        assert_eq!(after, frozen);
        assert_eq!(after.status, TaskStatus::Complete);
        assert!(after.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_fail_records_message() {
        let manager = manager();
        let handle = manager.create(TaskKind::Scrape).await.unwrap();
        handle.fail("all sources failed").await;
        let task = manager.poll(handle.id()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("all sources failed"));
        assert!(task.progress.contains("all sources failed"));
    }

    #[tokio::test]
    async fn test_poll_unknown_id_is_not_found() {
        let manager = manager();
        let id = TaskId::new();
        assert!(matches!(
            manager.poll(&id).await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finished_tasks_expire_after_retention() {
        let manager = TaskManager::new(Duration::ZERO);
        let handle = manager.create(TaskKind::Scrape).await.unwrap();
        assert!(manager.poll(handle.id()).await.is_ok());

        handle.complete(ProgressUpdate::default()).await;
        assert!(matches!(
            manager.poll(handle.id()).await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_completes_with_returned_progress() {
        let manager = manager();
        let id = manager
            .spawn(TaskKind::Match, |handle| async move {
                handle
                    .update(ProgressUpdate::counters(MatchCounters {
                        total: 2,
                        ..Default::default()
                    }))
                    .await;
                Ok::<_, String>(ProgressUpdate::message("Complete! Matched 2 jobs").with_counters(
                    MatchCounters {
                        matched: 2,
                        total: 2,
                        high_matches: 1,
                        skipped: 0,
                    },
                ))
            })
            .await
            .unwrap();

        let task = wait_for_terminal(&manager, &id).await;
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.progress, "Complete! Matched 2 jobs");
        assert_eq!(
            task.counters,
            TaskCounters::Match(MatchCounters {
                matched: 2,
                total: 2,
                high_matches: 1,
                skipped: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_spawn_fails_task_on_error() {
        let manager = manager();
        let id = manager
            .spawn(TaskKind::Scrape, |_handle| async move {
                Err::<ProgressUpdate, _>("every source failed".to_string())
            })
            .await
            .unwrap();

        let task = wait_for_terminal(&manager, &id).await;
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("every source failed"));
    }

    #[tokio::test]
    async fn test_spawn_fails_task_on_panic() {
        let manager = manager();
        let id = manager
            .spawn(TaskKind::CvAnalysis, |_handle| async move {
                if true {
                    panic!("extractor blew up");
                }
                Ok::<_, String>(ProgressUpdate::default())
            })
            .await
            .unwrap();

        let task = wait_for_terminal(&manager, &id).await;
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.error.unwrap().contains("aborted"));
        // The slot is released so a new run can start.
        assert!(manager.create(TaskKind::CvAnalysis).await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_rejects_while_same_kind_running() {
        let manager = manager();
        let _held = manager.create(TaskKind::Scrape).await.unwrap();
        let result = manager
            .spawn(TaskKind::Scrape, |_handle| async move {
                Ok::<_, String>(ProgressUpdate::default())
            })
            .await;
        assert_eq!(result, Err(TaskError::AlreadyRunning(TaskKind::Scrape)));
    }
}

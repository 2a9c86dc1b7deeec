//! Starts scrape and match runs through the task manager, on request or on a
//! fixed schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::matching::MatchOrchestrator;
use crate::scrape::ScrapeOrchestrator;
use crate::tasks::{Task, TaskError, TaskId, TaskKind, TaskManager};

const SCHEDULE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Task ids started by one scheduled tick. `None` means that step was skipped.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScheduledRun {
    pub scrape: Option<TaskId>,
    pub matched: Option<TaskId>,
}

#[derive(Clone)]
pub struct Pipeline {
    tasks: TaskManager,
    scrape: Arc<ScrapeOrchestrator>,
    matcher: Arc<MatchOrchestrator>,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(
        tasks: TaskManager,
        scrape: Arc<ScrapeOrchestrator>,
        matcher: Arc<MatchOrchestrator>,
    ) -> Self {
        Self {
            tasks,
            scrape,
            matcher,
            poll_interval: SCHEDULE_POLL_INTERVAL,
        }
    }

    pub fn high_match_threshold(&self) -> u8 {
        self.matcher.high_match_threshold()
    }

    pub async fn start_scrape(&self) -> Result<TaskId, TaskError> {
        let scrape = self.scrape.clone();
        self.tasks
            .spawn(TaskKind::Scrape, move |handle| async move {
                scrape.run(handle).await
            })
            .await
    }

    /// Fails with `NoProfile` before any task is created.
    pub async fn start_match(&self) -> Result<TaskId, AppError> {
        let profile = self.matcher.require_profile().await?;
        let matcher = self.matcher.clone();
        let id = self
            .tasks
            .spawn(TaskKind::Match, move |handle| async move {
                matcher.run(handle, profile).await
            })
            .await?;
        Ok(id)
    }

    /// Runs one scheduled tick per `interval`, the first one `interval` after start.
    pub fn spawn_schedule(&self, interval: Duration) -> JoinHandle<()> {
        let pipeline = self.clone();
        info!(
            "Scheduled scrape+match every {} minutes",
            interval.as_secs() / 60
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pipeline.run_scheduled().await;
            }
        })
    }

    /// Scrape, wait for it to finish, then match if a CV exists.
    /// A kind that is already running is skipped for this tick.
    pub async fn run_scheduled(&self) -> ScheduledRun {
        let mut run = ScheduledRun::default();

        match self.start_scrape().await {
            Ok(id) => {
                info!(task_id = %id, "Scheduled scrape started");
                if let Some(task) = self.wait_for(&id).await {
                    info!(task_id = %id, status = ?task.status, "Scheduled scrape finished");
                }
                run.scrape = Some(id);
            }
            Err(TaskError::AlreadyRunning(_)) => {
                info!("Scrape already running; skipping scheduled scrape");
            }
            Err(e) => warn!("Scheduled scrape not started: {e}"),
        }

        match self.start_match().await {
            Ok(id) => {
                info!(task_id = %id, "Scheduled match started");
                run.matched = Some(id);
            }
            Err(AppError::NoProfile) => info!("No CV uploaded; skipping scheduled match"),
            Err(AppError::AlreadyRunning(_)) => {
                info!("Match already running; skipping scheduled match");
            }
            Err(e) => warn!("Scheduled match not started: {e}"),
        }

        run
    }

    /// Polls until the task is terminal. `None` if it was purged meanwhile.
    async fn wait_for(&self, id: &TaskId) -> Option<Task> {
        loop {
            match self.tasks.poll(id).await {
                Ok(task) if task.status.is_terminal() => return Some(task),
                Ok(_) => tokio::time::sleep(self.poll_interval).await,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::DisabledInference;
    use crate::models::profile::CandidateProfile;
    use crate::scoring::tests::engine;
    use crate::scrape::tests::FakeConnector;
    use crate::store::{JobStore, MemoryJobStore};
    use crate::tasks::manager::tests::wait_for_terminal;
    use crate::tasks::TaskStatus;
    use chrono::{SubsecRound, Utc};

    fn pipeline(store: Arc<dyn JobStore>) -> Pipeline {
        let scrape = ScrapeOrchestrator::new(
            vec![Arc::new(FakeConnector::ok("acme-lever", &["Quant Analyst", "Data Analyst"]))],
            store.clone(),
            None,
        );
        let matcher = MatchOrchestrator::new(store, engine(Arc::new(DisabledInference)));
        let mut pipeline = Pipeline::new(
            TaskManager::new(Duration::from_secs(60)),
            Arc::new(scrape),
            Arc::new(matcher),
        );
        pipeline.poll_interval = Duration::from_millis(10);
        pipeline
    }

    fn profile() -> CandidateProfile {
        CandidateProfile {
            filename: "cv.txt".into(),
            raw_text: "Python SQL".into(),
            skills: vec!["python".into(), "sql".into()],
            years_experience: 3.0,
            education: None,
            extracted_at: Utc::now().trunc_subsecs(6),
        }
    }

    #[tokio::test]
    async fn test_start_match_without_profile_creates_no_task() {
        let pipeline = pipeline(Arc::new(MemoryJobStore::new()));
        let err = pipeline.start_match().await.unwrap_err();
        assert!(matches!(err, AppError::NoProfile));
        // The match slot is still free.
        assert!(pipeline.tasks.create(TaskKind::Match).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_scrape_is_rejected_while_first_runs() {
        let pipeline = pipeline(Arc::new(MemoryJobStore::new()));
        let _held = pipeline.tasks.create(TaskKind::Scrape).await.unwrap();
        assert_eq!(
            pipeline.start_scrape().await.unwrap_err(),
            TaskError::AlreadyRunning(TaskKind::Scrape)
        );
    }

    #[tokio::test]
    async fn test_scheduled_run_scrapes_then_matches() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        store.replace_profile(&profile()).await.unwrap();
        let pipeline = pipeline(store.clone());

        let run = pipeline.run_scheduled().await;
        let scrape_id = run.scrape.expect("scrape started");
        let match_id = run.matched.expect("match started");

        let scrape = pipeline.tasks.poll(&scrape_id).await.unwrap();
        assert_eq!(scrape.status, TaskStatus::Complete);

        let matched = wait_for_terminal(&pipeline.tasks, &match_id).await;
        assert_eq!(matched.status, TaskStatus::Complete);
        assert_eq!(store.stats(70).await.unwrap().matched, 2);
    }

    #[tokio::test]
    async fn test_scheduled_run_skips_busy_scrape_and_missing_profile() {
        let pipeline = pipeline(Arc::new(MemoryJobStore::new()));
        let _held = pipeline.tasks.create(TaskKind::Scrape).await.unwrap();

        let run = pipeline.run_scheduled().await;
        assert_eq!(run, ScheduledRun::default());
    }
}

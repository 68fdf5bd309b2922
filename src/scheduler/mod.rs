//! Scheduler / Fetcher (C6): polls the Asset API, classifies every
//! observed job, and enqueues eligible ones for the worker pool. See
//! `spec.md` §4.6 / SPEC_FULL §4.6.
//!
//! Classification is split from the I/O that executes it: `classify` is a
//! pure function over `(&Job, now, &Config, in-flight membership)` so the
//! invariants in `spec.md` §8 are unit-testable without a fake HTTP
//! server — grounded on the teacher's `should_update_cached` in
//! `ingestor/scheduler.rs`, which is the same "pure decision, impure
//! executor" shape.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::AssetApi;
use crate::config::Config;
use crate::models::{Job, JobStatus, PatchJobBody};
use crate::registry::InFlightRegistry;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const INTER_JOB_YIELD: Duration = Duration::from_secs(3);
const BACKOFF_ON_ERROR: Duration = Duration::from_secs(3);

/// The action the scheduler takes for one observed job, per the
/// classification table in `spec.md` §4.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Enqueue,
    MarkStuck,
    MarkMaxAttempts,
    /// `max_attempts_exceeded` always drops the id from `inFlight`, even
    /// though it's otherwise a no-op toward the server (the patch was
    /// already applied on a prior cycle).
    ForgetMaxAttemptsExceeded,
    NoOp,
}

/// Pure classification per `spec.md` §4.6's table. `is_in_flight` reports
/// whether `job.id` is already tracked locally; callers look this up from
/// `InFlightRegistry` before calling `classify`.
pub fn classify(job: &Job, now: DateTime<Utc>, config: &Config, is_in_flight: bool) -> Action {
    let stale = (now - job.last_heart_beat).num_seconds().unsigned_abs()
        > config.stuck_job_threshold_seconds;
    let over_attempts = job.attempts >= config.max_job_attempts;

    match job.status {
        JobStatus::InProgress => {
            if stale && !over_attempts {
                Action::MarkStuck
            } else if over_attempts {
                Action::MarkMaxAttempts
            } else {
                Action::NoOp
            }
        }
        JobStatus::Created | JobStatus::Failed | JobStatus::Stuck => {
            if over_attempts {
                Action::MarkMaxAttempts
            } else if !is_in_flight {
                Action::Enqueue
            } else {
                Action::NoOp
            }
        }
        JobStatus::MaxAttemptsExceeded => Action::ForgetMaxAttemptsExceeded,
        JobStatus::Completed | JobStatus::Unknown => Action::NoOp,
    }
}

/// Single long-running task. Polls, classifies, and dispatches per the
/// table above; tolerates `ListJobs` returning empty on transient API
/// failure (the API client's own contract), and backs off on an
/// unexpected error in the outer loop rather than crashing the process.
pub struct Scheduler {
    api: Arc<dyn AssetApi>,
    config: Arc<Config>,
    registry: InFlightRegistry,
    queue: mpsc::Sender<Job>,
}

impl Scheduler {
    pub fn new(
        api: Arc<dyn AssetApi>,
        config: Arc<Config>,
        registry: InFlightRegistry,
        queue: mpsc::Sender<Job>,
    ) -> Self {
        Self {
            api,
            config,
            registry,
            queue,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("scheduler starting");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler received shutdown signal");
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if let Err(()) = self.poll_once(&shutdown).await {
                warn!("scheduler cycle failed, backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(BACKOFF_ON_ERROR) => {}
                }
            }
        }
    }

    async fn poll_once(&self, shutdown: &CancellationToken) -> Result<(), ()> {
        let jobs = self.api.list_jobs().await;

        for job in jobs {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let is_in_flight = self.registry.contains(&job.id).await;
            let action = classify(&job, Utc::now(), &self.config, is_in_flight);
            self.apply(&job, action).await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(INTER_JOB_YIELD) => {}
            }
        }

        Ok(())
    }

    async fn apply(&self, job: &Job, action: Action) {
        match action {
            Action::Enqueue => {
                if self.registry.insert(&job.id).await {
                    if self.queue.send(job.clone()).await.is_err() {
                        // Queue receiver gone — the worker pool is
                        // shutting down; undo the optimistic insert so a
                        // restart doesn't see a phantom in-flight id.
                        self.registry.remove(&job.id).await;
                    }
                }
            }
            Action::MarkStuck => {
                self.registry.remove(&job.id).await;
                self.api
                    .patch_job(
                        &job.id,
                        PatchJobBody::status(JobStatus::Stuck)
                            .with_attempts(job.attempts + 1)
                            .with_heartbeat(Utc::now())
                            .with_error_message("Job is stuck"),
                    )
                    .await;
            }
            Action::MarkMaxAttempts => {
                self.api
                    .patch_job(
                        &job.id,
                        PatchJobBody::status(JobStatus::MaxAttemptsExceeded)
                            .with_attempts(job.attempts)
                            .with_error_message("Max attempts exceeded"),
                    )
                    .await;
            }
            Action::ForgetMaxAttemptsExceeded => {
                self.registry.remove(&job.id).await;
            }
            Action::NoOp => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn config() -> Config {
        Config {
            server_api_key: "key".to_string(),
            api_base_url: "http://localhost".to_string(),
            stuck_job_threshold_seconds: 30,
            max_job_attempts: 3,
            max_num_workers: 2,
            heartbeat_interval_seconds: 10,
            max_chunk_size_bytes: 25 * 1024 * 1024,
            temp_dir: std::env::temp_dir(),
            request_timeout_seconds: 30,
            transcode_timeout_seconds: 3600,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    fn job(status: JobStatus, attempts: u32, heartbeat_age_secs: i64) -> Job {
        let now = Utc::now();
        Job {
            id: "j1".to_string(),
            asset_id: "a1".to_string(),
            status,
            attempts,
            last_heart_beat: now - ChronoDuration::seconds(heartbeat_age_secs),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stuck_in_progress_job_is_marked_stuck() {
        let cfg = config();
        let j = job(JobStatus::InProgress, 0, 120);
        assert_eq!(classify(&j, Utc::now(), &cfg, true), Action::MarkStuck);
    }

    #[test]
    fn in_progress_over_attempts_is_max_attempts_regardless_of_staleness() {
        let cfg = config();
        let j = job(JobStatus::InProgress, 3, 120);
        assert_eq!(classify(&j, Utc::now(), &cfg, true), Action::MarkMaxAttempts);
    }

    #[test]
    fn fresh_in_progress_job_is_noop() {
        let cfg = config();
        let j = job(JobStatus::InProgress, 0, 5);
        assert_eq!(classify(&j, Utc::now(), &cfg, true), Action::NoOp);
    }

    #[test]
    fn created_job_not_in_flight_is_enqueued() {
        let cfg = config();
        let j = job(JobStatus::Created, 0, 0);
        assert_eq!(classify(&j, Utc::now(), &cfg, false), Action::Enqueue);
    }

    #[test]
    fn created_job_already_in_flight_is_noop() {
        let cfg = config();
        let j = job(JobStatus::Created, 0, 0);
        assert_eq!(classify(&j, Utc::now(), &cfg, true), Action::NoOp);
    }

    #[test]
    fn failed_job_at_max_attempts_is_max_attempts_exceeded() {
        let cfg = config();
        let j = job(JobStatus::Failed, 3, 0);
        assert_eq!(classify(&j, Utc::now(), &cfg, false), Action::MarkMaxAttempts);
    }

    #[test]
    fn stuck_status_is_eligible_for_reenqueue_like_failed() {
        let cfg = config();
        let j = job(JobStatus::Stuck, 1, 0);
        assert_eq!(classify(&j, Utc::now(), &cfg, false), Action::Enqueue);
    }

    #[test]
    fn max_attempts_exceeded_is_always_forgotten() {
        let cfg = config();
        let j = job(JobStatus::MaxAttemptsExceeded, 3, 0);
        assert_eq!(
            classify(&j, Utc::now(), &cfg, true),
            Action::ForgetMaxAttemptsExceeded
        );
        assert_eq!(
            classify(&j, Utc::now(), &cfg, false),
            Action::ForgetMaxAttemptsExceeded
        );
    }

    #[test]
    fn classification_is_idempotent_across_repeated_observations() {
        let cfg = config();
        let j = job(JobStatus::InProgress, 3, 0);
        let first = classify(&j, Utc::now(), &cfg, true);
        let second = classify(&j, Utc::now(), &cfg, true);
        assert_eq!(first, Action::MarkMaxAttempts);
        assert_eq!(first, second);
    }
}

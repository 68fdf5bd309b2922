//! Worker pool (C7): a fixed set of consumers draining the shared queue,
//! exclusive per job id via the registry's keyed lock. See `spec.md` §4.7
//! / SPEC_FULL §4.7.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::AssetApi;
use crate::config::Config;
use crate::models::{Job, JobStatus, PatchJobBody};
use crate::processor::JobProcessor;
use crate::registry::InFlightRegistry;

const CRASH_LOOP_BACKOFF: Duration = Duration::from_secs(3);

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One worker loop: dequeue, acquire the per-job lock, run the processor,
/// and unconditionally release the in-flight entry and the lock on exit —
/// regardless of whether the run succeeded.
pub struct Worker {
    id: usize,
    api: Arc<dyn AssetApi>,
    processor: Arc<JobProcessor>,
    registry: InFlightRegistry,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
}

impl Worker {
    pub fn new(
        id: usize,
        api: Arc<dyn AssetApi>,
        config: &Config,
        registry: InFlightRegistry,
        queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    ) -> Self {
        Self {
            id,
            api: api.clone(),
            processor: Arc::new(JobProcessor::new(api, config)),
            registry,
            queue,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = self.id, "worker starting");
        loop {
            let job = {
                let mut queue = self.queue.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(worker_id = self.id, "shutdown signal received, worker exiting");
                        return;
                    }
                    received = queue.recv() => match received {
                        Some(job) => job,
                        None => {
                            info!(worker_id = self.id, "queue closed, worker exiting");
                            return;
                        }
                    },
                }
            };

            let job_id = job.id.clone();
            // §4.7 step 5: anything outside the per-job try/catch boundary
            // (a panic inside the processor or its dependencies) must not
            // take the whole worker down with it — catch it, log, and
            // back off before re-entering the loop.
            let outcome = std::panic::AssertUnwindSafe(self.run_one(job))
                .catch_unwind()
                .await;

            if let Err(panic) = outcome {
                let message = panic_message(&panic);
                error!(worker_id = self.id, job_id = %job_id, error = %message, "worker hit an unexpected error outside the job boundary");
                self.registry.remove(&job_id).await;
                self.registry.forget_lock_if_unused(&job_id).await;
                tokio::time::sleep(CRASH_LOOP_BACKOFF).await;
            }
        }
    }

    /// Runs a single dequeued job end to end. Errors from `Process` itself
    /// are fully handled here (patched as `failed`); a panic anywhere in
    /// this path is caught by the caller's `catch_unwind`, per §4.7 step 5.
    async fn run_one(&self, job: Job) {
        let lock = self.registry.job_lock(&job.id).await;
        let _guard = lock.lock().await;

        match self.processor.process(&job).await {
            Ok(()) => {}
            Err(e) => {
                self.api
                    .patch_job(
                        &job.id,
                        PatchJobBody::status(JobStatus::Failed)
                            .with_error_message(e.message())
                            .with_attempts(job.attempts + 1),
                    )
                    .await;
                warn!(job_id = %job.id, error = %e, "job failed");
            }
        }

        self.registry.remove(&job.id).await;
        drop(_guard);
        // `lock` is a second strong reference to the same Arc the map holds;
        // drop it too, or `forget_lock_if_unused`'s strong_count == 1 check
        // never fires and `job_locks` leaks one entry per distinct job id
        // for the life of the process.
        drop(lock);
        self.registry.forget_lock_if_unused(&job.id).await;
    }
}

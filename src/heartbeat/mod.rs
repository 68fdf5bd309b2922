//! Heartbeat companion (C4): a task whose lifetime is tied to a worker's
//! exclusive hold on a job, patching `lastHeartBeat` on a fixed cadence so
//! the scheduler's stuck-job detector (`spec.md` §4.6) sees liveness.
//!
//! Named `HeartbeatCompanion` here — the reference implementation's
//! cosmetic `heeatbeat_updater` typo (called out in `spec.md` §9) is not
//! reproduced.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::AssetApi;
use crate::models::PatchJobBody;

/// Spawned when a worker begins executing a job, cancelled before the
/// worker releases it. Loops `patch(lastHeartBeat=now) -> sleep`, observing
/// cancellation at either suspension point so the task never outlives the
/// job it watches over.
pub struct HeartbeatCompanion {
    handle: tokio::task::JoinHandle<()>,
    token: CancellationToken,
}

impl HeartbeatCompanion {
    /// Starts the companion for `job_id`. `api` and `job_id` are cloned
    /// into the spawned task; the returned handle owns the cancellation
    /// token and the task's `JoinHandle`.
    pub fn spawn(api: Arc<dyn AssetApi>, job_id: String, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!(job_id = %job_id, "heartbeat cancelled");
                        return;
                    }
                    _ = Self::beat(&api, &job_id) => {}
                }

                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!(job_id = %job_id, "heartbeat cancelled during sleep");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Self { handle, token }
    }

    async fn beat(api: &Arc<dyn AssetApi>, job_id: &str) {
        let ok = api
            .patch_job(job_id, PatchJobBody::default().with_heartbeat(Utc::now()))
            .await;
        if !ok {
            // Best-effort: the authoritative liveness signal is the
            // server's own clock comparison, not this patch succeeding.
            warn!(job_id, "heartbeat patch failed, will retry next cycle");
        }
    }

    /// Signals cancellation and awaits termination. Callers must await
    /// this before issuing a job's terminal status patch, so no heartbeat
    /// patch can arrive after it (`spec.md` §5's ordering guarantee).
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "heartbeat task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::errors::ApiError;
    use crate::models::{Asset, Job};

    #[derive(Default)]
    struct CountingApi {
        patches: AtomicUsize,
    }

    #[async_trait]
    impl AssetApi for CountingApi {
        async fn list_jobs(&self) -> Vec<Job> {
            Vec::new()
        }
        async fn patch_job(&self, _id: &str, _body: PatchJobBody) -> bool {
            self.patches.fetch_add(1, Ordering::SeqCst);
            true
        }
        async fn fetch_asset(&self, _asset_id: &str) -> Option<Asset> {
            None
        }
        async fn fetch_blob(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
            Ok(Vec::new())
        }
        async fn patch_asset_content(&self, _asset_id: &str, _content: String) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn heartbeat_patches_at_least_once_then_stops_cleanly() {
        let counting = Arc::new(CountingApi::default());
        let api: Arc<dyn AssetApi> = counting.clone();
        let companion =
            HeartbeatCompanion::spawn(api, "job-1".to_string(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(50)).await;
        companion.stop().await;

        assert!(counting.patches.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn stop_prevents_further_patches() {
        let counting = Arc::new(CountingApi::default());
        let api: Arc<dyn AssetApi> = counting.clone();
        let companion =
            HeartbeatCompanion::spawn(api, "job-2".to_string(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(15)).await;
        companion.stop().await;
        let after_stop = counting.patches.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counting.patches.load(Ordering::SeqCst), after_stop);
    }
}

//! Job processor (C5): the per-job pipeline — fetch asset, dispatch by
//! file type, write the result back. See `spec.md` §4.5 / SPEC_FULL §4.5.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::api::AssetApi;
use crate::config::Config;
use crate::errors::JobError;
use crate::heartbeat::HeartbeatCompanion;
use crate::media::MediaSegmenter;
use crate::models::{ChunkDescriptor, FileType, Job, JobStatus, PatchJobBody, SegmentationSummary};
use crate::workspace::JobWorkspace;

/// Runs a single job to a terminal, server-visible outcome. `process`
/// itself issues the `completed` patch on success, after the heartbeat
/// companion has fully stopped; on failure it returns the error and leaves
/// the `failed` patch to the caller (the worker), which also stops the
/// heartbeat before patching — so the terminal patch is always the last
/// API call for a run, success or failure (spec.md §5 / §8 property 3).
///
/// Heartbeat start/stop and workspace cleanup happen on every exit path
/// from `process`, success or failure, matching §4.5 step 7.
pub struct JobProcessor {
    api: Arc<dyn AssetApi>,
    segmenter: MediaSegmenter,
    temp_dir: std::path::PathBuf,
    heartbeat_interval: Duration,
}

impl JobProcessor {
    pub fn new(api: Arc<dyn AssetApi>, config: &Config) -> Self {
        Self {
            api,
            segmenter: MediaSegmenter::new(config),
            temp_dir: config.temp_dir.clone(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
        }
    }

    pub async fn process(&self, job: &Job) -> Result<(), JobError> {
        let heartbeat =
            HeartbeatCompanion::spawn(self.api.clone(), job.id.clone(), self.heartbeat_interval);

        let result = self.run(job).await;

        // Await heartbeat termination before any terminal patch goes out,
        // so no `lastHeartBeat` patch can arrive after it (spec.md §5's
        // ordering guarantee). The `completed` patch itself is issued below,
        // after this await, not inside `run` — it must be the last API call
        // for the run just like the `failed` patch the worker issues after
        // `process` returns.
        heartbeat.stop().await;

        if result.is_ok() {
            self.complete(job).await;
        }

        result
    }

    async fn run(&self, job: &Job) -> Result<(), JobError> {
        self.api
            .patch_job(&job.id, PatchJobBody::status(JobStatus::InProgress))
            .await;

        let asset = self
            .api
            .fetch_asset(&job.asset_id)
            .await
            .ok_or_else(|| JobError::AssetNotFound(job.asset_id.clone()))?;

        let blob = self.api.fetch_blob(&asset.file_url).await?;

        let mut workspace = JobWorkspace::for_job(&self.temp_dir, &job.id);

        let outcome = self.dispatch(&asset, blob, &mut workspace).await;

        workspace.cleanup().await;
        outcome
    }

    async fn dispatch(
        &self,
        asset: &crate::models::Asset,
        blob: Vec<u8>,
        workspace: &mut JobWorkspace,
    ) -> Result<(), JobError> {
        match asset.file_type {
            FileType::Text | FileType::Markdown => {
                let text = String::from_utf8(blob)?;
                self.api
                    .patch_asset_content(&asset.id, text)
                    .await;
                Ok(())
            }
            FileType::Audio => {
                let chunks = self
                    .segmenter
                    .segment_audio(workspace, &asset.file_name, &blob)
                    .await?;
                self.write_summary(asset, &chunks).await
            }
            FileType::Video => {
                let chunks = self
                    .segmenter
                    .segment_video(workspace, &asset.file_name, &blob)
                    .await?;
                self.write_summary(asset, &chunks).await
            }
            FileType::Unknown(ref raw) => Err(JobError::UnsupportedFileType(raw.clone())),
        }
    }

    /// Stage 1 (segmentation) is the only stage this service implements;
    /// per the reference behavior adopted in `spec.md` §9's open question,
    /// the job is marked `completed` once segmentation succeeds (by the
    /// caller, after the heartbeat has stopped), with a small JSON summary
    /// written as the asset's content here.
    async fn write_summary(
        &self,
        asset: &crate::models::Asset,
        chunks: &[crate::models::AudioChunk],
    ) -> Result<(), JobError> {
        let summary = SegmentationSummary {
            stage: "segmentation",
            chunk_count: chunks.len(),
            total_bytes: chunks.iter().map(|c| c.size).sum(),
            chunks: chunks.iter().map(ChunkDescriptor::from).collect(),
        };
        let content = serde_json::to_string(&summary)
            .expect("SegmentationSummary always serializes");

        self.api.patch_asset_content(&asset.id, content).await;
        Ok(())
    }

    async fn complete(&self, job: &Job) {
        self.api
            .patch_job(&job.id, PatchJobBody::status(JobStatus::Completed))
            .await;
        info!(job_id = %job.id, "job completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::errors::ApiError;
    use crate::models::Asset;

    #[derive(Default)]
    struct FakeApi {
        patched_jobs: Mutex<Vec<(String, PatchJobBody)>>,
        patched_assets: Mutex<Vec<(String, String)>>,
        asset: Mutex<Option<Asset>>,
        blob: Mutex<Result<Vec<u8>, String>>,
    }

    #[async_trait]
    impl AssetApi for FakeApi {
        async fn list_jobs(&self) -> Vec<Job> {
            Vec::new()
        }
        async fn patch_job(&self, id: &str, body: PatchJobBody) -> bool {
            self.patched_jobs.lock().unwrap().push((id.to_string(), body));
            true
        }
        async fn fetch_asset(&self, _asset_id: &str) -> Option<Asset> {
            self.asset.lock().unwrap().clone()
        }
        async fn fetch_blob(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
            match &*self.blob.lock().unwrap() {
                Ok(bytes) => Ok(bytes.clone()),
                Err(_) => Err(ApiError::Status {
                    context: "fetch_blob",
                    status: 500,
                }),
            }
        }
        async fn patch_asset_content(&self, asset_id: &str, content: String) -> bool {
            self.patched_assets
                .lock()
                .unwrap()
                .push((asset_id.to_string(), content));
            true
        }
    }

    fn test_job() -> Job {
        Job {
            id: "job-1".to_string(),
            asset_id: "asset-1".to_string(),
            status: JobStatus::Created,
            attempts: 0,
            last_heart_beat: Utc::now(),
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_config() -> Config {
        Config {
            server_api_key: "key".to_string(),
            api_base_url: "http://localhost".to_string(),
            stuck_job_threshold_seconds: 30,
            max_job_attempts: 3,
            max_num_workers: 2,
            heartbeat_interval_seconds: 10,
            max_chunk_size_bytes: 25 * 1024 * 1024,
            temp_dir: std::env::temp_dir().join("asset-worker-processor-test"),
            request_timeout_seconds: 30,
            transcode_timeout_seconds: 3600,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    #[tokio::test]
    async fn happy_text_path_patches_in_progress_then_content_then_completed() {
        let fake = Arc::new(FakeApi {
            asset: Mutex::new(Some(Asset {
                id: "asset-1".to_string(),
                file_name: "doc.txt".to_string(),
                file_url: "http://example/doc.txt".to_string(),
                file_type: FileType::Text,
                mime_type: None,
                size: None,
                content: None,
            })),
            blob: Mutex::new(Ok(b"hello".to_vec())),
            ..Default::default()
        });
        let api: Arc<dyn AssetApi> = fake.clone();
        let processor = JobProcessor::new(api, &test_config());

        let job = test_job();
        processor.process(&job).await.expect("text path succeeds");

        let patched_jobs = fake.patched_jobs.lock().unwrap();
        assert_eq!(patched_jobs.len(), 2);
        assert_eq!(patched_jobs[0].1.status, Some(JobStatus::InProgress));
        assert_eq!(patched_jobs[1].1.status, Some(JobStatus::Completed));

        let patched_assets = fake.patched_assets.lock().unwrap();
        assert_eq!(patched_assets.len(), 1);
        assert_eq!(patched_assets[0].1, "hello");
    }

    #[tokio::test]
    async fn missing_asset_fails_job() {
        let fake = Arc::new(FakeApi::default());
        let api: Arc<dyn AssetApi> = fake.clone();
        let processor = JobProcessor::new(api, &test_config());

        let job = test_job();
        let err = processor.process(&job).await.unwrap_err();
        assert!(matches!(err, JobError::AssetNotFound(id) if id == "asset-1"));
    }

    #[tokio::test]
    async fn unsupported_file_type_fails_with_message() {
        let fake = Arc::new(FakeApi {
            asset: Mutex::new(Some(Asset {
                id: "asset-1".to_string(),
                file_name: "pic.png".to_string(),
                file_url: "http://example/pic.png".to_string(),
                file_type: FileType::Unknown("image".to_string()),
                mime_type: None,
                size: None,
                content: None,
            })),
            blob: Mutex::new(Ok(Vec::new())),
            ..Default::default()
        });
        let api: Arc<dyn AssetApi> = fake.clone();
        let processor = JobProcessor::new(api, &test_config());

        let job = test_job();
        let err = processor.process(&job).await.unwrap_err();
        assert!(matches!(err, JobError::UnsupportedFileType(ref t) if t == "image"));
    }
}

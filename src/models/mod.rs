//! Wire types shared between the API client, scheduler, and job processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    InProgress,
    Failed,
    Stuck,
    MaxAttemptsExceeded,
    /// Terminal success status patched by the job processor (`spec.md`
    /// §4.5). Not one of the statuses the scheduler classifies over in
    /// §4.6 — a completed job is simply never observed as eligible for
    /// any scheduler action again.
    Completed,
    /// Any status value the server sends that this worker doesn't know
    /// about. Per the error-handling design, unknown statuses are logged
    /// and skipped rather than failing the whole `ListJobs` decode.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(rename = "lastHeartBeat")]
    pub last_heart_beat: DateTime<Utc>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// `#[serde(other)]` can only tag a unit variant, which would discard the
/// actual wire value for an unrecognized `fileType` — and the job
/// processor needs that value verbatim for its "Unsupported content type:
/// {type}" error message (`spec.md` §4.5 step 5 / scenario 2 in §8). So
/// `FileType` deserializes by hand instead of deriving, keeping the raw
/// string in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileType {
    Text,
    Markdown,
    Audio,
    Video,
    Unknown(String),
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Text => write!(f, "text"),
            FileType::Markdown => write!(f, "markdown"),
            FileType::Audio => write!(f, "audio"),
            FileType::Video => write!(f, "video"),
            FileType::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for FileType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "text" => FileType::Text,
            "markdown" => FileType::Markdown,
            "audio" => FileType::Audio,
            "video" => FileType::Video,
            _ => FileType::Unknown(raw),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "fileType")]
    pub file_type: FileType,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub content: Option<String>,
}

/// A size-bounded MP3 segment produced by the media segmenter, in ascending
/// index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub file_name: String,
    pub size: u64,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Sparse update sent to `PATCH /asset-processing-job/{id}`. Only fields
/// that are `Some` are serialized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchJobBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(rename = "lastHeartBeat", skip_serializing_if = "Option::is_none")]
    pub last_heart_beat: Option<DateTime<Utc>>,
}

impl PatchJobBody {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_heartbeat(mut self, when: DateTime<Utc>) -> Self {
        self.last_heart_beat = Some(when);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchAssetBody {
    pub content: String,
}

/// The segmentation summary written into `Asset.content` once Stage 1
/// completes (see SPEC_FULL §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationSummary {
    pub stage: &'static str,
    pub chunk_count: usize,
    pub total_bytes: u64,
    pub chunks: Vec<ChunkDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkDescriptor {
    pub file_name: String,
    pub size: u64,
}

impl From<&AudioChunk> for ChunkDescriptor {
    fn from(chunk: &AudioChunk) -> Self {
        Self {
            file_name: chunk.file_name.clone(),
            size: chunk.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_status_does_not_fail_decode() {
        let json = r#"{
            "id": "j1", "assetId": "a1", "status": "archived", "attempts": 0,
            "lastHeartBeat": "2024-01-01T00:00:00Z",
            "errorMessage": null,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
    }

    #[test]
    fn unknown_file_type_does_not_fail_decode() {
        let json = r#"{
            "id": "a1", "fileName": "x", "fileUrl": "http://x", "fileType": "image",
            "mimeType": null, "size": null, "content": null
        }"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.file_type, FileType::Unknown("image".to_string()));
    }

    #[test]
    fn patch_job_body_omits_unset_fields() {
        let body = PatchJobBody::status(JobStatus::InProgress);
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"status":"in_progress"}"#);
    }
}

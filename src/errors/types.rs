//! Error type definitions for the asset processing worker.
//!
//! Mirrors the taxonomy in the design notes: configuration errors are
//! fatal at startup, API errors are mostly transient and recovered from
//! locally, media errors and job errors are surfaced to the server as a
//! `failed` status patch.

use thiserror::Error;

/// Startup-time configuration failures. Fatal — the process exits non-zero.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("TEMP_DIR must be an absolute path, got '{0}'")]
    TempDirNotAbsolute(String),

    #[error("TEMP_DIR '{path}' is not writable: {source}")]
    TempDirNotWritable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the Asset API HTTP surface.
///
/// Most call sites catch these and degrade to a soft failure (empty list,
/// `false`, `None`) per the API client's contract; `fetch_blob` is the one
/// call site that propagates this type to its caller.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error calling {context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context} returned non-2xx status {status}")]
    Status { context: &'static str, status: u16 },

    #[error("failed to decode response from {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context} received a malformed or non-absolute URL '{url}': {source}")]
    InvalidUrl {
        context: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors from the media segmenter (C2).
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} exited with status {exit_code}: {stderr_excerpt}")]
    TranscoderFailed {
        stage: &'static str,
        exit_code: i32,
        stderr_excerpt: String,
    },

    #[error("{stage} timed out after {timeout_secs}s")]
    TranscoderTimeout { stage: &'static str, timeout_secs: u64 },

    #[error("could not parse ffprobe output: {0}")]
    ProbeDecode(#[source] serde_json::Error),

    #[error("input has no audio stream")]
    NoAudioStream,

    #[error("input has no video stream")]
    NoVideoStream,

    #[error(
        "chunk '{file_name}' is {actual_bytes} bytes, exceeding the {max_bytes} byte limit"
    )]
    ChunkTooLarge {
        file_name: String,
        actual_bytes: u64,
        max_bytes: u64,
    },

    #[error("I/O error while segmenting: {0}")]
    Io(#[from] std::io::Error),
}

/// A hard, job-specific failure. The worker converts this into
/// `PatchJob(status=failed, errorMessage=.., attempts+=1)`.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("asset {0} not found")]
    AssetNotFound(String),

    #[error("unsupported content type: {0}")]
    UnsupportedFileType(String),

    #[error("asset content is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl JobError {
    /// Short human-readable message suitable for the server's `errorMessage` field.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

//! Process-wide configuration, populated once from the environment at
//! startup. Treated as an immutable value passed by reference — there is
//! no hot-reload, and a validation failure aborts startup rather than
//! falling back silently.

use std::path::PathBuf;

use crate::errors::ConfigError;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STUCK_JOB_THRESHOLD_SECONDS: u64 = 30;
const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_NUM_WORKERS: usize = 2;
const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_MAX_CHUNK_SIZE_BYTES: u64 = 26_214_400;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_TRANSCODE_TIMEOUT_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_api_key: String,
    pub api_base_url: String,
    pub stuck_job_threshold_seconds: u64,
    pub max_job_attempts: u32,
    pub max_num_workers: usize,
    pub heartbeat_interval_seconds: u64,
    pub max_chunk_size_bytes: u64,
    pub temp_dir: PathBuf,
    pub request_timeout_seconds: u64,
    pub transcode_timeout_seconds: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Config {
    /// Load configuration from the process environment, applying defaults
    /// and rejecting startup on the first validation failure.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_api_key = require_var("SERVER_API_KEY")?;

        let api_base_url = optional_var("API_BASE_URL", DEFAULT_API_BASE_URL.to_string());

        let stuck_job_threshold_seconds = parse_optional_var(
            "STUCK_JOB_THRESHOLD_SECONDS",
            DEFAULT_STUCK_JOB_THRESHOLD_SECONDS,
        )?;
        let max_job_attempts = parse_optional_var("MAX_JOB_ATTEMPTS", DEFAULT_MAX_JOB_ATTEMPTS)?;
        let max_num_workers = parse_optional_var("MAX_NUM_WORKERS", DEFAULT_MAX_NUM_WORKERS)?;
        let heartbeat_interval_seconds = parse_optional_var(
            "HEARTBEAT_INTERVAL_SECONDS",
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        )?;
        let max_chunk_size_bytes =
            parse_optional_var("MAX_CHUNK_SIZE_BYTES", DEFAULT_MAX_CHUNK_SIZE_BYTES)?;

        let temp_dir = match std::env::var("TEMP_DIR") {
            Ok(value) => PathBuf::from(value),
            Err(_) => std::env::temp_dir().join("asset-processing-worker"),
        };

        let config = Self {
            server_api_key,
            api_base_url,
            stuck_job_threshold_seconds,
            max_job_attempts,
            max_num_workers,
            heartbeat_interval_seconds,
            max_chunk_size_bytes,
            temp_dir,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            transcode_timeout_seconds: DEFAULT_TRANSCODE_TIMEOUT_SECONDS,
            ffmpeg_path: optional_var("FFMPEG_PATH", "ffmpeg".to_string()),
            ffprobe_path: optional_var("FFPROBE_PATH", "ffprobe".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.temp_dir.is_absolute() {
            return Err(ConfigError::TempDirNotAbsolute(
                self.temp_dir.display().to_string(),
            ));
        }
        Ok(())
    }

    /// Create `TEMP_DIR` if missing and confirm it is writable. Called once
    /// at startup, before any worker or fetcher task is spawned.
    pub async fn ensure_temp_dir_writable(&self) -> Result<(), ConfigError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|source| ConfigError::TempDirNotWritable {
                path: self.temp_dir.display().to_string(),
                source,
            })?;

        let probe = self.temp_dir.join(".write-probe");
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|source| ConfigError::TempDirNotWritable {
                path: self.temp_dir.display().to_string(),
                source,
            })?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_var(name: &'static str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn parse_optional_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable access is process-global; serialize tests that
    // mutate it so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "SERVER_API_KEY",
            "API_BASE_URL",
            "STUCK_JOB_THRESHOLD_SECONDS",
            "MAX_JOB_ATTEMPTS",
            "MAX_NUM_WORKERS",
            "HEARTBEAT_INTERVAL_SECONDS",
            "MAX_CHUNK_SIZE_BYTES",
            "TEMP_DIR",
            "FFMPEG_PATH",
            "FFPROBE_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("SERVER_API_KEY")));
    }

    #[test]
    fn defaults_applied_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("SERVER_API_KEY", "secret");
        std::env::set_var("TEMP_DIR", "/tmp/asset-processing-worker-test");
        let config = Config::from_env().unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(
            config.stuck_job_threshold_seconds,
            DEFAULT_STUCK_JOB_THRESHOLD_SECONDS
        );
        assert_eq!(config.max_job_attempts, DEFAULT_MAX_JOB_ATTEMPTS);
        assert_eq!(config.max_num_workers, DEFAULT_MAX_NUM_WORKERS);
        clear_env();
    }

    #[test]
    fn relative_temp_dir_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("SERVER_API_KEY", "secret");
        std::env::set_var("TEMP_DIR", "relative/path");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::TempDirNotAbsolute(_)));
        clear_env();
    }
}

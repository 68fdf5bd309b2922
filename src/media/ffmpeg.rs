//! External transcoder invocation, grounded directly on
//! `run_ffmpeg_command` in the ferrex transcoding-worker reference: spawn
//! with stdout discarded and stderr piped, drain stderr into a bounded
//! buffer on a side task, check the exit status, and surface a trimmed
//! stderr excerpt on failure.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use crate::errors::MediaError;

const STDERR_EXCERPT_MAX_LINES: usize = 40;

/// Runs `ffmpeg_path` with `args`, enforcing `stage_timeout` as a
/// wall-clock bound. `stage` names the operation for error messages and
/// logs (e.g. `"transcode"`, `"extract_audio"`, `"slice"`).
pub async fn run(
    ffmpeg_path: &str,
    args: &[impl AsRef<OsStr>],
    stage: &'static str,
    stage_timeout: Duration,
) -> Result<(), MediaError> {
    let mut cmd = Command::new(ffmpeg_path);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    info!(stage, ?ffmpeg_path, "starting transcoder");

    let mut child = cmd.spawn().map_err(|source| MediaError::Spawn {
        binary: "ffmpeg",
        source,
    })?;

    let stderr_buffer = Arc::new(Mutex::new(String::new()));
    let drain_handle = child.stderr.take().map(|stderr| {
        let buffer = stderr_buffer.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut buffer = buffer.lock().await;
                buffer.push_str(&line);
                buffer.push('\n');
            }
        })
    });

    let wait_result = timeout(stage_timeout, child.wait()).await;

    let status = match wait_result {
        Ok(status) => status.map_err(MediaError::Io)?,
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            if let Some(handle) = drain_handle {
                handle.abort();
            }
            return Err(MediaError::TranscoderTimeout {
                stage,
                timeout_secs: stage_timeout.as_secs(),
            });
        }
    };

    if let Some(handle) = drain_handle {
        let _ = handle.await;
    }

    if !status.success() {
        let stderr_excerpt = {
            let buffer = stderr_buffer.lock().await;
            buffer
                .lines()
                .rev()
                .take(STDERR_EXCERPT_MAX_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Err(MediaError::TranscoderFailed {
            stage,
            exit_code: status.code().unwrap_or(-1),
            stderr_excerpt,
        });
    }

    Ok(())
}

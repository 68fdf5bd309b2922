//! Container probing via `ffprobe`, grounded on the ffprobe-driven
//! duration probing used by the video-analysis reference in the example
//! pack: shell out, parse JSON, extract duration and stream kinds.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::MediaError;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeInfo {
    pub duration_secs: f64,
    pub has_audio: bool,
    pub has_video: bool,
}

/// Probes `path` for container metadata: duration and which stream kinds
/// are present. Does not fail on a missing stream kind — callers decide
/// whether that's fatal for the operation they're performing.
pub async fn probe(
    ffprobe_path: &str,
    path: &Path,
    probe_timeout: Duration,
) -> Result<ProbeInfo, MediaError> {
    let mut cmd = Command::new(ffprobe_path);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path)
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::piped())
    .stderr(std::process::Stdio::piped())
    .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| MediaError::Spawn {
        binary: "ffprobe",
        source,
    })?;

    let output = timeout(probe_timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::TranscoderTimeout {
            stage: "probe",
            timeout_secs: probe_timeout.as_secs(),
        })?
        .map_err(MediaError::Io)?;

    if !output.status.success() {
        return Err(MediaError::TranscoderFailed {
            stage: "probe",
            exit_code: output.status.code().unwrap_or(-1),
            stderr_excerpt: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let parsed: ProbeOutput =
        serde_json::from_slice(&output.stdout).map_err(MediaError::ProbeDecode)?;

    let duration_secs = parsed
        .format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let has_audio = parsed.streams.iter().any(|s| s.codec_type == "audio");
    let has_video = parsed.streams.iter().any(|s| s.codec_type == "video");

    Ok(ProbeInfo {
        duration_secs,
        has_audio,
        has_video,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_and_streams() {
        let raw = r#"{
            "streams": [
                {"codec_type": "video"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "123.456000"}
        }"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.format.duration.as_deref(), Some("123.456000"));
        assert_eq!(parsed.streams.len(), 2);
    }

    #[test]
    fn missing_duration_defaults_handled_by_caller() {
        let raw = r#"{"streams": [], "format": {}}"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        assert!(parsed.format.duration.is_none());
    }
}

//! Media segmentation (C2): given a downloaded blob, produce ordered,
//! size-bounded MP3 chunks via the external transcoder. See SPEC_FULL
//! §4.2 for the full algorithm and its grounding.

pub mod ffmpeg;
pub mod probe;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::errors::MediaError;
use crate::models::AudioChunk;
use crate::workspace::JobWorkspace;

#[derive(Clone)]
pub struct MediaSegmenter {
    ffmpeg_path: String,
    ffprobe_path: String,
    max_chunk_bytes: u64,
    transcode_timeout: Duration,
}

impl MediaSegmenter {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            max_chunk_bytes: config.max_chunk_size_bytes,
            transcode_timeout: Duration::from_secs(config.transcode_timeout_seconds),
        }
    }

    /// Audio path: persist the blob, transcode to MP3 if necessary, slice
    /// into size-bounded chunks.
    pub async fn segment_audio(
        &self,
        workspace: &mut JobWorkspace,
        file_name: &str,
        data: &[u8],
    ) -> Result<Vec<AudioChunk>, MediaError> {
        let input_path = workspace.write(file_name, data).await?;
        let mp3_path = self.ensure_mp3(workspace, &input_path, file_name).await?;
        self.slice_mp3(workspace, &mp3_path).await
    }

    /// Video path: persist the blob, extract its audio track to MP3
    /// (dropping the video stream), then slice that MP3 the same way the
    /// audio path does.
    pub async fn segment_video(
        &self,
        workspace: &mut JobWorkspace,
        file_name: &str,
        data: &[u8],
    ) -> Result<Vec<AudioChunk>, MediaError> {
        let input_path = workspace.write(file_name, data).await?;

        let info = probe::probe(&self.ffprobe_path, &input_path, self.transcode_timeout).await?;
        if !info.has_video {
            return Err(MediaError::NoVideoStream);
        }

        let stem = stem_of(file_name);
        let mp3_path = workspace.path(&format!("{stem}.mp3"));

        ffmpeg::run(
            &self.ffmpeg_path,
            &[
                "-y".as_ref(),
                "-i".as_ref(),
                input_path.as_os_str(),
                "-vn".as_ref(),
                "-b:a".as_ref(),
                "192k".as_ref(),
                mp3_path.as_os_str(),
            ],
            "extract_audio",
            self.transcode_timeout,
        )
        .await?;
        workspace.track(mp3_path.clone());

        self.slice_mp3(workspace, &mp3_path).await
    }

    /// Transcodes `input_path` to MP3 at 192 kbit/s if it isn't already
    /// one; returns the path to the MP3 either way.
    async fn ensure_mp3(
        &self,
        workspace: &mut JobWorkspace,
        input_path: &Path,
        file_name: &str,
    ) -> Result<PathBuf, MediaError> {
        if file_name.to_ascii_lowercase().ends_with(".mp3") {
            return Ok(input_path.to_path_buf());
        }

        let stem = stem_of(file_name);
        let mp3_path = workspace.path(&format!("{stem}.mp3"));

        ffmpeg::run(
            &self.ffmpeg_path,
            &[
                "-y".as_ref(),
                "-i".as_ref(),
                input_path.as_os_str(),
                "-b:a".as_ref(),
                "192k".as_ref(),
                mp3_path.as_os_str(),
            ],
            "transcode",
            self.transcode_timeout,
        )
        .await?;
        workspace.track(mp3_path.clone());

        Ok(mp3_path)
    }

    /// Probes `mp3_path` for duration, computes the chunk count implied
    /// by `max_chunk_bytes`, and slices it with stream-copy (no
    /// re-encoding). Fails the whole run if a produced chunk exceeds the
    /// size ceiling — see SPEC_FULL §4.2 for why this is a hard
    /// post-condition rather than an estimate.
    async fn slice_mp3(
        &self,
        workspace: &mut JobWorkspace,
        mp3_path: &Path,
    ) -> Result<Vec<AudioChunk>, MediaError> {
        let info = probe::probe(&self.ffprobe_path, mp3_path, self.transcode_timeout).await?;
        if !info.has_audio {
            return Err(MediaError::NoAudioStream);
        }

        let total_bytes = tokio::fs::metadata(mp3_path).await?.len();
        let chunk_count = chunk_count(total_bytes, self.max_chunk_bytes);
        let chunk_duration = info.duration_secs / chunk_count as f64;

        let stem = stem_of(
            mp3_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("output"),
        );

        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for i in 0..chunk_count {
            let start = i as f64 * chunk_duration;
            let length = if i == chunk_count - 1 {
                info.duration_secs - start
            } else {
                chunk_duration
            };

            let chunk_name = format!("{stem}_chunk_{i:03}.mp3");
            let chunk_path = workspace.path(&chunk_name);

            ffmpeg::run(
                &self.ffmpeg_path,
                &[
                    "-y".as_ref(),
                    "-ss".as_ref(),
                    start.to_string().as_ref(),
                    "-i".as_ref(),
                    mp3_path.as_os_str(),
                    "-t".as_ref(),
                    length.to_string().as_ref(),
                    "-c".as_ref(),
                    "copy".as_ref(),
                    chunk_path.as_os_str(),
                ],
                "slice",
                self.transcode_timeout,
            )
            .await?;
            workspace.track(chunk_path.clone());

            let size = tokio::fs::metadata(&chunk_path).await?.len();
            if size > self.max_chunk_bytes {
                return Err(MediaError::ChunkTooLarge {
                    file_name: chunk_name,
                    actual_bytes: size,
                    max_bytes: self.max_chunk_bytes,
                });
            }

            let data = tokio::fs::read(&chunk_path).await?;
            chunks.push(AudioChunk {
                file_name: chunk_name,
                size,
                data,
            });
        }

        Ok(chunks)
    }
}

/// `N = ceil(S / MaxChunkBytes)`, floored at 1 so a zero-byte or
/// sub-threshold file still produces a single chunk.
fn chunk_count(total_bytes: u64, max_chunk_bytes: u64) -> u64 {
    if total_bytes == 0 {
        return 1;
    }
    total_bytes.div_ceil(max_chunk_bytes).max(1)
}

fn stem_of(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_matches_ceiling_division() {
        assert_eq!(chunk_count(70 * 1024 * 1024, 25 * 1024 * 1024), 3);
        assert_eq!(chunk_count(25 * 1024 * 1024, 25 * 1024 * 1024), 1);
        assert_eq!(chunk_count(1, 25 * 1024 * 1024), 1);
        assert_eq!(chunk_count(0, 25 * 1024 * 1024), 1);
    }

    #[test]
    fn chunk_names_are_zero_padded_for_lexicographic_order() {
        let names: Vec<String> = (0..3).map(|i| format!("clip_chunk_{i:03}.mp3")).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn stem_of_strips_extension() {
        assert_eq!(stem_of("clip.mp4"), "clip");
        assert_eq!(stem_of("clip.tar.gz"), "clip.tar");
        assert_eq!(stem_of("noext"), "noext");
    }
}

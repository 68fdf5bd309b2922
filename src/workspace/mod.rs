//! Per-job scoped scratch directory with guaranteed cleanup (C3).
//!
//! Grounded on the file-registry pattern in the sibling
//! `sandboxed-file-manager` crate this repo's teacher ships: a manager
//! tracks every path it creates so cleanup never has to guess what
//! belongs to it. The scope here is much smaller — no retention policy,
//! no background sweep — just "track what this run created, delete it
//! all on the terminal exit path."

use std::path::{Path, PathBuf};

use tracing::warn;

/// Creates and owns `TempDir/<jobId>` for the duration of one job run.
pub struct JobWorkspace {
    dir: PathBuf,
    created: Vec<PathBuf>,
}

impl JobWorkspace {
    /// Returns a handle for `job_id`'s scratch directory. The directory
    /// itself is created lazily on first write, not here.
    pub fn for_job(temp_dir: &Path, job_id: &str) -> Self {
        Self {
            dir: temp_dir.join(job_id),
            created: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a file named `name` inside this job's scratch directory.
    /// Does not create anything; use `write` or `track` once the file
    /// actually exists.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Ensures the scratch directory exists, writes `contents` to
    /// `name` within it, and records the path for cleanup.
    pub async fn write(&mut self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, contents).await?;
        self.created.push(path.clone());
        Ok(path)
    }

    /// Records a path as created by this run without writing to it —
    /// used when an external process (the transcoder) produces the file
    /// directly rather than this process writing the bytes itself.
    pub fn track(&mut self, path: PathBuf) {
        self.created.push(path);
    }

    /// Removes every tracked path, then removes the directory itself if
    /// it is now empty. Called from the job processor's single terminal
    /// exit path, on both success and failure.
    pub async fn cleanup(&mut self) {
        for path in self.created.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove workspace file");
                }
            }
        }

        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut entries) => {
                if entries.next_entry().await.ok().flatten().is_none() {
                    if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(dir = %self.dir.display(), error = %e, "failed to remove workspace directory");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to inspect workspace directory for cleanup");
            }
        }
    }
}

//! Payload staging: wraps submitted source into a single-entry tar archive
//!
//! The container substrate only accepts files as tar streams, so every
//! submission passes through a transient archive on the host. Archive names
//! combine a nanosecond timestamp with a random UUID, which keeps concurrent
//! requests from ever writing to the same path.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes staged archives into a scratch directory.
#[derive(Debug, Clone)]
pub struct PayloadStager {
    scratch_dir: PathBuf,
}

impl Default for PayloadStager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl PayloadStager {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Writes `content` as the only entry `filename` of a fresh archive.
    ///
    /// The returned archive is complete and closed. Removing it is the
    /// caller's job; see [`StagedArchive::remove`].
    pub async fn stage(&self, filename: &str, content: &str) -> io::Result<StagedArchive> {
        if filename.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive entry name must not be empty",
            ));
        }

        let bytes = build_single_entry_tar(filename, content.as_bytes())?;
        let path = self.scratch_dir.join(unique_archive_name());

        // Track the path before writing so a partial file is cleaned up too.
        let archive = StagedArchive {
            path,
            removed: false,
        };
        tokio::fs::write(&archive.path, &bytes).await?;

        log::debug!(
            "Staged {} ({} bytes) into {}",
            filename,
            content.len(),
            archive.path.display()
        );
        Ok(archive)
    }
}

fn unique_archive_name() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    format!("coderun-{}-{}.tar", nanos, Uuid::new_v4().simple())
}

fn build_single_entry_tar(filename: &str, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(payload.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, filename, payload)?;
    builder.into_inner()
}

/// A staged archive on host storage.
///
/// Call [`remove`](Self::remove) once the sandbox no longer needs it. An
/// archive dropped without being removed is deleted best-effort so early
/// returns cannot leak files.
#[derive(Debug)]
pub struct StagedArchive {
    path: PathBuf,
    removed: bool,
}

impl StagedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the archive. A file that is already gone counts as removed.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed abandoned archive {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove abandoned archive {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

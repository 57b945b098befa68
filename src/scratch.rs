//! Request-scoped scratch storage.
//!
//! A [`ScratchArea`] owns one temporary directory. Everything a request writes
//! lives under it, and the directory is removed when the area is dropped, on
//! success, on error, and when the owning future is abandoned.

use crate::error::{Result, RevoiceError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const PREFIX: &str = "revoice-";

#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchArea {
    /// Create a fresh directory under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix(PREFIX);
            b
        };

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| RevoiceError::Internal(format!("Failed to create scratch area: {e}")))?;

        let path = dir.path().to_path_buf();
        debug!("Created scratch area {}", path.display());

        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file directly inside the area. Nothing is created.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove the area now. Failures are logged, never returned.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed scratch area {}", self.path.display()),
                Err(e) => warn!(
                    "Failed to remove scratch area {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        self.remove();
    }
}

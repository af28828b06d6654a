//! Request-scoped scratch directories.
//!
//! Each download gets its own `<root>/<uuid>` directory. The [`ScratchDir`]
//! guard removes it exactly once: through [`ScratchDir::release`] on the
//! normal path, or from `Drop` when the owning future is cancelled.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DownloadError, DownloadResult};

pub const SCRATCH_NAMESPACE: &str = "ytune-downloads";

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn acquire(&self) -> DownloadResult<ScratchDir> {
        let path = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await.map_err(|error| {
            DownloadError::filesystem("could not create scratch directory", error)
        })?;

        debug!("Scratch directory ready at {:?}", path);
        Ok(ScratchDir {
            path,
            released: false,
        })
    }

    /// Removes scratch directories under the root that are older than `max_age`.
    ///
    /// Only entries shaped like the ones [`ScratchSpace::acquire`] creates
    /// (a directory named by a UUID) are touched; anything else is left alone.
    pub async fn sweep_stale(&self, max_age: Duration) {
        if max_age.is_zero() {
            return;
        }

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    warn!("Could not open scratch root for cleanup: {error}");
                }
                return;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0usize;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    warn!("Could not iterate scratch root for cleanup: {error}");
                    break;
                }
            };

            let path = entry.path();
            if !is_scratch_name(&entry.file_name().to_string_lossy()) {
                debug!("Sweep skips foreign entry {:?}", path);
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!("Could not read metadata of {:?}: {error}", path);
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified_at| now.duration_since(modified_at).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!("Could not remove stale scratch directory {:?}: {error}", path),
            }
        }

        if removed > 0 {
            info!("Removed {removed} stale scratch directories from {:?}", self.root);
        }
    }
}

#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    released: bool,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively removes the directory. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(error) = tokio::fs::remove_dir_all(&self.path).await
            && error.kind() != ErrorKind::NotFound
        {
            warn!("Could not remove scratch directory {:?}: {error}", self.path);
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        debug!("Scratch directory {:?} dropped before release", self.path);
        let path = std::mem::take(&mut self.path);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_blocking(&path));
            }
            Err(_) => remove_blocking(&path),
        }
    }
}

fn remove_blocking(path: &Path) {
    if let Err(error) = std::fs::remove_dir_all(path)
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not remove scratch directory {:?}: {error}", path);
    }
}

fn is_scratch_name(name: &str) -> bool {
    Uuid::parse_str(name).is_ok()
}

//! Per-request scratch ownership and guaranteed cleanup.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::allocator::{Release, TempPathAllocator};
use crate::converter::ConvertError;
use crate::metrics;

/// A scratch file owned by one request.
#[derive(Debug, Clone)]
pub struct ScratchFile {
    pub path: PathBuf,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

/// Result of releasing a scope.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Every file the scope owned, with `released_at` set.
    pub files: Vec<ScratchFile>,
    /// Files that were already gone.
    pub absent: usize,
    /// Paths that could not be removed, with the error text.
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns every scratch file allocated for one request.
///
/// Call [`release_all`](Self::release_all) once the engine is done. If the
/// scope is dropped first (the request future was cancelled, or a panic
/// unwound through it) the same files are removed synchronously in `Drop`.
/// Either way each file is deleted exactly once and failures never surface
/// as the request's error.
#[derive(Debug)]
pub struct ScratchScope {
    allocator: Arc<TempPathAllocator>,
    request_id: Uuid,
    dir: PathBuf,
    dir_created: bool,
    files: Vec<ScratchFile>,
}

impl ScratchScope {
    pub(crate) fn new(allocator: Arc<TempPathAllocator>, request_id: Uuid, dir: PathBuf) -> Self {
        Self {
            allocator,
            request_id,
            dir,
            dir_created: false,
            files: Vec::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Directory holding this request's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files registered so far.
    pub fn files(&self) -> &[ScratchFile] {
        &self.files
    }

    /// Reserves a new path and registers it for cleanup.
    pub async fn allocate(&mut self, extension: &str) -> Result<PathBuf, ConvertError> {
        if !self.dir_created {
            self.allocator.ensure_root().await?;
            // Set first: the mkdir may complete even if this future is dropped.
            self.dir_created = true;
            tokio::fs::create_dir_all(&self.dir).await?;
        }
        let path = self.allocator.allocate_in(&self.dir, extension).await?;
        self.files.push(ScratchFile {
            path: path.clone(),
            request_id: self.request_id,
            created_at: Utc::now(),
            released_at: None,
        });
        Ok(path)
    }

    /// Reserves a path and writes `bytes` to it.
    pub async fn write(&mut self, extension: &str, bytes: &[u8]) -> Result<PathBuf, ConvertError> {
        let path = self.allocate(extension).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Deletes every registered file and the request directory.
    pub async fn release_all(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for mut file in std::mem::take(&mut self.files) {
            match self.allocator.release(&file.path).await {
                Ok(Release::Removed) => {}
                Ok(Release::Absent) => report.absent += 1,
                Err(e) => {
                    metrics::SCRATCH_CLEANUP_FAILURES.inc();
                    tracing::warn!(
                        request_id = %self.request_id,
                        path = %file.path.display(),
                        error = %e,
                        "Failed to remove scratch file"
                    );
                    report.failures.push((file.path.clone(), e.to_string()));
                }
            }
            file.released_at = Some(Utc::now());
            report.files.push(file);
        }

        if self.dir_created {
            self.dir_created = false;
            if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
                if e.kind() != ErrorKind::NotFound {
                    metrics::SCRATCH_CLEANUP_FAILURES.inc();
                    tracing::warn!(
                        request_id = %self.request_id,
                        dir = %self.dir.display(),
                        error = %e,
                        "Failed to remove scratch directory"
                    );
                    report.failures.push((self.dir.clone(), e.to_string()));
                }
            }
        }

        tracing::debug!(
            request_id = %self.request_id,
            files = report.files.len(),
            absent = report.absent,
            failures = report.failures.len(),
            "Released scratch scope"
        );
        report
    }
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        if self.files.is_empty() && !self.dir_created {
            return;
        }

        tracing::debug!(
            request_id = %self.request_id,
            files = self.files.len(),
            "Scratch scope dropped before release, cleaning up"
        );

        for file in self.files.drain(..) {
            if let Err(e) = std::fs::remove_file(&file.path) {
                if e.kind() != ErrorKind::NotFound {
                    metrics::SCRATCH_CLEANUP_FAILURES.inc();
                    tracing::warn!(
                        path = %file.path.display(),
                        error = %e,
                        "Failed to remove scratch file"
                    );
                }
            }
        }

        if self.dir_created {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != ErrorKind::NotFound {
                    metrics::SCRATCH_CLEANUP_FAILURES.inc();
                    tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove scratch directory");
                }
            }
        }
    }
}

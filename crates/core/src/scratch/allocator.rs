//! Collision-free scratch path allocation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::scope::ScratchScope;
use crate::converter::ConvertError;

/// Attempts before giving up on finding a free name. A clash needs both the
/// counter and a v4 UUID to collide, so one attempt is the norm.
const MAX_NAME_ATTEMPTS: usize = 4;

/// Outcome of releasing a scratch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The file existed and was deleted.
    Removed,
    /// Nothing was there; the engine never wrote it or it was already gone.
    Absent,
}

/// Hands out unique scratch paths under a process-scoped directory.
///
/// The directory is `{temp_root}/{pid}-{instance}` and is created on first
/// use. Paths are never reused within a process: each name carries a
/// monotonically increasing counter plus a random UUID.
#[derive(Debug)]
pub struct TempPathAllocator {
    root: PathBuf,
    counter: AtomicU64,
    created: OnceCell<()>,
}

impl TempPathAllocator {
    /// Creates an allocator rooted under `temp_root`. Nothing touches disk yet.
    pub fn new(temp_root: impl AsRef<Path>) -> Self {
        let instance = Uuid::new_v4().simple().to_string();
        let root = temp_root
            .as_ref()
            .join(format!("{}-{}", std::process::id(), &instance[..12]));
        Self {
            root,
            counter: AtomicU64::new(0),
            created: OnceCell::new(),
        }
    }

    /// Process-scoped directory all scratch files live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a cleanup scope for one request.
    ///
    /// The scope gets its own freshly named directory, so two scopes opened
    /// with the same `request_id` never share files.
    pub fn scope(self: &Arc<Self>, request_id: Uuid) -> ScratchScope {
        let dir = self.root.join(self.next_name());
        ScratchScope::new(Arc::clone(self), request_id, dir)
    }

    /// `{counter:08}-{uuid}`, unique for the lifetime of this allocator.
    fn next_name(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:08}-{}", seq, Uuid::new_v4().simple())
    }

    /// Creates the process-scoped directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<&Path, ConvertError> {
        self.created
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root).await?;
                tracing::debug!(root = %self.root.display(), "Created scratch directory");
                Ok::<(), ConvertError>(())
            })
            .await?;
        Ok(&self.root)
    }

    /// Allocates a path directly under the process-scoped directory.
    ///
    /// The file itself is not created.
    pub async fn allocate(&self, extension: &str) -> Result<PathBuf, ConvertError> {
        let root = self.ensure_root().await?.to_path_buf();
        self.allocate_in(&root, extension).await
    }

    /// Allocates a fresh path inside `dir`, which must already exist.
    pub(crate) async fn allocate_in(
        &self,
        dir: &Path,
        extension: &str,
    ) -> Result<PathBuf, ConvertError> {
        let extension = sanitize_extension(extension);
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(format!("{}.{}", self.next_name(), extension));
            if !tokio::fs::try_exists(&path).await? {
                return Ok(path);
            }
            tracing::warn!(path = %path.display(), "Scratch name already taken, retrying");
        }
        Err(ConvertError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free scratch name in {}", dir.display()),
        )))
    }

    /// Deletes a scratch file.
    pub async fn release(&self, path: &Path) -> std::io::Result<Release> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(Release::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Release::Absent),
            Err(e) => Err(e),
        }
    }

    /// Removes the whole process-scoped directory. Meant for shutdown.
    pub async fn purge(&self) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn sanitize_extension(extension: &str) -> String {
    let clean: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    if clean.is_empty() {
        "bin".to_string()
    } else {
        clean.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_root_created_lazily() {
        let temp = TempDir::new().unwrap();
        let allocator = TempPathAllocator::new(temp.path());
        assert!(!allocator.root().exists());

        let path = allocator.allocate("mp3").await.unwrap();
        assert!(allocator.root().is_dir());
        assert_eq!(path.parent().unwrap(), allocator.root());
        assert_eq!(path.extension().unwrap(), "mp3");
        // Allocation never creates the file.
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let temp = TempDir::new().unwrap();
        let allocator = Arc::new(TempPathAllocator::new(temp.path()));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move { allocator.allocate("webp").await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 64);
    }

    #[tokio::test]
    async fn test_release_reports_absent() {
        let temp = TempDir::new().unwrap();
        let allocator = TempPathAllocator::new(temp.path());
        let path = allocator.allocate("tmp").await.unwrap();

        tokio::fs::write(&path, b"x").await.unwrap();
        assert_eq!(allocator.release(&path).await.unwrap(), Release::Removed);
        assert_eq!(allocator.release(&path).await.unwrap(), Release::Absent);
    }

    #[tokio::test]
    async fn test_root_creation_failure_is_io_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let allocator = TempPathAllocator::new(&blocker);
        let err = allocator.allocate("png").await.unwrap_err();
        assert!(matches!(err, ConvertError::Io(_)));
    }

    #[test]
    fn test_scopes_with_same_request_id_get_distinct_dirs() {
        let temp = TempDir::new().unwrap();
        let allocator = Arc::new(TempPathAllocator::new(temp.path()));
        let id = Uuid::new_v4();

        let a = allocator.scope(id);
        let b = allocator.scope(id);
        assert_ne!(a.dir(), b.dir());
        assert_eq!(a.dir().parent().unwrap(), allocator.root());
        assert!(!a.dir().to_string_lossy().contains(&id.simple().to_string()));
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension(".MP4"), "mp4");
        assert_eq!(sanitize_extension("../etc"), "etc");
        assert_eq!(sanitize_extension(""), "bin");
    }
}

//! Bundle staging
//!
//! Copies an inbound bundle into a process-private staging directory so the
//! rest of the pipeline works on a stable file. Every staged file gets a name
//! that is never reused, and the [`StagedBundle`] guard deletes it when the
//! owning operation lets go of it.

use chrono::Utc;
use sideload_errors::{Error, StageError};
use sideload_events::{EventEmitter, EventSender, FailureContext, LifecycleEvent};
use sideload_hash::Hash;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Copies bundles into the staging directory
#[derive(Debug, Clone)]
pub struct BundleStager {
    dir: PathBuf,
    max_size: Option<u64>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for BundleStager {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl BundleStager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size: None,
            event_sender: None,
        }
    }

    /// Reject bundles larger than `limit` bytes; 0 disables the check
    #[must_use]
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.max_size = (limit > 0).then_some(limit);
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: Option<EventSender>) -> Self {
        self.event_sender = sender;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the staging directory, readable only by this user
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or restricted.
    pub async fn prepare(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.dir_error(&e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|e| self.dir_error(&e))?;
        }

        Ok(())
    }

    /// Stage the bundle at `source`
    ///
    /// # Errors
    ///
    /// Returns `StageError::SourceUnavailable` if the source cannot be opened,
    /// and any error [`stage_reader`](Self::stage_reader) returns.
    pub async fn stage(&self, source: &Path) -> Result<StagedBundle, Error> {
        self.emit_lifecycle(LifecycleEvent::StagingStarted {
            source: source.to_path_buf(),
        });

        let result = match fs::File::open(source).await {
            Ok(file) => self.copy_in(file).await,
            Err(e) => Err(StageError::SourceUnavailable {
                source_path: source.display().to_string(),
                message: e.to_string(),
            }
            .into()),
        };

        match &result {
            Ok(staged) => self.emit_lifecycle(LifecycleEvent::StagingCompleted {
                path: staged.path().to_path_buf(),
                size: staged.size(),
                content_hash: staged.hash().to_hex(),
            }),
            Err(e) => self.emit_lifecycle(LifecycleEvent::StagingFailed {
                failure: FailureContext::from_error(e),
            }),
        }
        result
    }

    /// Stage a bundle supplied as a byte stream
    ///
    /// # Errors
    ///
    /// Returns an error if the staging file cannot be created, the copy is
    /// interrupted, or the stream exceeds the configured size limit. The
    /// partial file is removed in every failure case.
    pub async fn stage_reader<R>(&self, reader: R) -> Result<StagedBundle, Error>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.copy_in(reader).await
    }

    async fn copy_in<R>(&self, reader: R) -> Result<StagedBundle, Error>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.unique_path();
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| self.dir_error(&e))?;

        // Owns the path from here on; dropping it on any early return removes
        // the partial file.
        let mut staged = StagedBundle::new(path);

        let limit = self.max_size.map_or(u64::MAX, |max| max.saturating_add(1));
        let (hash, size) = Hash::hash_and_copy(reader.take(limit), file)
            .await
            .map_err(|e| StageError::CopyInterrupted {
                path: staged.path.display().to_string(),
                message: e.to_string(),
            })?;

        if let Some(max) = self.max_size {
            if size > max {
                return Err(StageError::TooLarge { size, limit: max }.into());
            }
        }

        staged.size = size;
        staged.hash = hash;
        tracing::debug!(path = %staged.path.display(), size, "staged bundle");
        Ok(staged)
    }

    fn unique_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        self.dir
            .join(format!("bundle-{stamp}-{}.bundle", Uuid::new_v4().simple()))
    }

    fn dir_error(&self, err: &std::io::Error) -> Error {
        StageError::StagingDirectory {
            path: self.dir.display().to_string(),
            message: err.to_string(),
        }
        .into()
    }
}

/// RAII guard for a staged bundle file
///
/// The file is deleted when the guard is dropped unless it was released
/// with [`into_path`](Self::into_path).
#[derive(Debug)]
pub struct StagedBundle {
    path: PathBuf,
    size: u64,
    hash: Hash,
    released: bool,
}

impl StagedBundle {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            size: 0,
            hash: Hash::from_data(&[]),
            released: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Keep the file on disk and hand its path to the caller
    #[must_use]
    pub fn into_path(mut self) -> PathBuf {
        self.released = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedBundle {
    fn drop(&mut self) {
        if !self.released {
            // Best effort cleanup - ignore errors in destructor
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stage_copies_and_hashes() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("app.bundle");
        std::fs::write(&source, b"bundle bytes").unwrap();

        let stager = BundleStager::new(temp.path().join("staging"));
        stager.prepare().await.unwrap();
        let staged = stager.stage(&source).await.unwrap();

        assert_eq!(staged.size(), 12);
        assert_eq!(staged.hash(), &Hash::from_data(b"bundle bytes"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"bundle bytes");

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_names_are_never_reused() {
        let temp = TempDir::new().unwrap();
        let stager = BundleStager::new(temp.path());
        let a = stager.stage_reader(&b"one"[..]).await.unwrap();
        let b = stager.stage_reader(&b"one"[..]).await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let temp = TempDir::new().unwrap();
        let stager = BundleStager::new(temp.path());
        let err = stager
            .stage(&temp.path().join("absent.bundle"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Stage(StageError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_size_limit_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let stager = BundleStager::new(temp.path()).with_size_limit(4);
        let err = stager.stage_reader(&b"too large"[..]).await.unwrap_err();
        assert!(matches!(err, Error::Stage(StageError::TooLarge { limit: 4, .. })));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_into_path_keeps_file() {
        let temp = TempDir::new().unwrap();
        let stager = BundleStager::new(temp.path());
        let path = stager.stage_reader(&b"keep"[..]).await.unwrap().into_path();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_staging_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("private");
        BundleStager::new(&dir).prepare().await.unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}

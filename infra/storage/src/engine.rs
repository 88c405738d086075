//! Core engine: sandboxed, atomic file I/O under a single root directory.
//!
//! [`Storage`] is the only handle. Every relative path handed to it is resolved through
//! the sandbox before touching the disk, and every write goes through a temp file that
//! is renamed into place, so readers never observe a half-written file.

use crate::builder::StorageBuilder;
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance::{self, TMP_MARKER};
use crate::security;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// The shared state behind a [`Storage`] handle.
#[derive(Debug)]
pub struct StorageInner {
    /// Canonical physical root; nothing outside it is ever touched.
    pub(crate) root: PathBuf,
    /// Whether file contents are `fsync`ed before the rename.
    pub(crate) sync: bool,
    /// Age after which orphaned temp files are purged.
    pub(crate) tmp_max_age: Duration,
    /// Per-handle counter used to build unique temp file names.
    pub(crate) tmp_counter: AtomicU64,
}

/// A cheaply clonable handle to a sandboxed directory.
///
/// # Example
///
/// ```rust
/// use wheel_storage::{Storage, StorageError};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), StorageError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let storage = Storage::builder().root(tmp.path().join("data")).connect().await?;
///
///     storage.write("objects/greeting", b"hello").await?;
///     assert_eq!(storage.read("objects/greeting").await?, b"hello");
///
///     assert!(storage.resolve("../outside").is_err());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Deref for Storage {
    type Target = StorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Storage {
    #[must_use = "The storage engine is not initialized until you call .connect()"]
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    /// The canonical root directory of this sandbox.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Resolves a relative path to a physical path inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathTraversalAttempt`] for absolute paths, `..` escapes and
    /// symlinks leading outside the root; [`StorageError::Io`] if an ancestor cannot be
    /// verified.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        security::resolve_path(&self.root, path)
    }

    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if the file does not exist and
    /// [`StorageError::Io`] on any other read failure.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, StorageError> {
        let resolved = self.resolve(path)?;

        match fs::read(&resolved).await {
            Ok(data) => {
                debug!(path = %resolved.display(), bytes = data.len(), "File read");
                Ok(data)
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound {
                    message: resolved.display().to_string().into(),
                    context: None,
                })
            },
            Err(source) => Err(StorageError::Io {
                source,
                context: Some(format!("Read failed: {}", resolved.display()).into()),
            }),
        }
    }

    /// Replaces the file's contents atomically.
    ///
    /// The data goes to a unique sibling temp file (`<name>.wheeltmp.<pid>.<n>`), is
    /// synced when `sync` is enabled, then renamed over the target. Parent directories
    /// are created on demand. A failed swap removes its temp file before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathTraversalAttempt`] if the path escapes the sandbox and
    /// [`StorageError::Io`] if any step of the swap fails (including a directory sitting
    /// at the target path).
    pub async fn write(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create parent of {}", resolved.display()))?;
        }

        let temp = unique_tmp_path(&resolved, &self.tmp_counter);
        if let Err(err) = self.write_temp(&temp, data).await {
            discard(&temp).await;
            return Err(err);
        }

        if let Err(source) = fs::rename(&temp, &resolved).await {
            discard(&temp).await;
            return Err(StorageError::Io {
                source,
                context: Some(
                    format!("Atomic swap failed: {} -> {}", temp.display(), resolved.display())
                        .into(),
                ),
            });
        }

        if self.sync {
            if let Some(parent) = resolved.parent() {
                Self::sync_dir(parent).await;
            }
        }

        debug!(path = %resolved.display(), bytes = data.len(), "File saved atomically");
        Ok(())
    }

    async fn write_temp(&self, temp: &Path, data: &[u8]) -> Result<(), StorageError> {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp)
            .await
            .context(format!("Temp creation failed: {}", temp.display()))?;
        file.write_all(data).await.context("Write failed")?;
        if self.sync {
            file.sync_all().await.context("Hardware sync failed")?;
        } else {
            file.flush().await.context("Flush failed")?;
        }
        Ok(())
    }

    /// Creates an empty file unless one already exists.
    ///
    /// Returns `true` when the file was created and `false` when a regular file was
    /// already present (its contents are left untouched).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotAFile`] if something other than a regular file occupies
    /// the path, and [`StorageError::Io`] if creation fails.
    pub async fn create_empty(&self, path: impl AsRef<Path>) -> Result<bool, StorageError> {
        let resolved = self.resolve(path)?;

        match fs::OpenOptions::new().create_new(true).write(true).open(&resolved).await {
            Ok(_) => {
                debug!(path = %resolved.display(), "Empty file created");
                Ok(true)
            },
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let meta = fs::metadata(&resolved)
                    .await
                    .context(format!("Failed to inspect {}", resolved.display()))?;
                if meta.is_file() {
                    Ok(false)
                } else {
                    Err(StorageError::NotAFile {
                        message: resolved.display().to_string().into(),
                        context: Some("Expected a regular file".into()),
                    })
                }
            },
            Err(source) => Err(StorageError::Io {
                source,
                context: Some(format!("Failed to create {}", resolved.display()).into()),
            }),
        }
    }

    /// Creates a directory (and its parents) unless it exists.
    ///
    /// Returns `true` when the directory was created by this call.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotADirectory`] if something other than a directory
    /// occupies the path, and [`StorageError::Io`] if it cannot be inspected or created.
    pub async fn create_dir(&self, path: impl AsRef<Path>) -> Result<bool, StorageError> {
        let resolved = self.resolve(path)?;

        match fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => return Ok(false),
            Ok(_) => {
                return Err(StorageError::NotADirectory {
                    message: resolved.display().to_string().into(),
                    context: Some("Expected a directory".into()),
                });
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(source) => {
                return Err(StorageError::Io {
                    source,
                    context: Some(format!("Failed to inspect {}", resolved.display()).into()),
                });
            },
        }

        fs::create_dir_all(&resolved)
            .await
            .context(format!("Failed to create directory {}", resolved.display()))?;
        debug!(path = %resolved.display(), "Directory created");
        Ok(true)
    }

    /// Deletes a file from the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if nothing is there and [`StorageError::Io`]
    /// if the removal fails.
    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;

        match fs::remove_file(&resolved).await {
            Ok(()) => {},
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound {
                    message: resolved.display().to_string().into(),
                    context: None,
                });
            },
            Err(source) => {
                return Err(StorageError::Io {
                    source,
                    context: Some(format!("Failed to delete: {}", resolved.display()).into()),
                });
            },
        }
        debug!(path = %resolved.display(), "File deleted");
        Ok(())
    }

    /// Checks whether a path exists inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns an error only when resolution fails or the filesystem cannot answer.
    pub async fn exists(&self, path: impl AsRef<Path>) -> Result<bool, StorageError> {
        let resolved = self.resolve(path)?;
        fs::try_exists(&resolved)
            .await
            .context(format!("Failed to inspect {}", resolved.display()))
    }

    /// Removes temp files orphaned by interrupted writes.
    pub async fn purge_tmp(&self) {
        maintenance::purge_tmp(&self.root, self.tmp_max_age).await;
    }

    async fn sync_dir(path: &Path) {
        match fs::File::open(path).await {
            Ok(dir) => {
                if let Err(err) = dir.sync_all().await {
                    warn!(path = %path.display(), error = %err, "Directory sync failed");
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Directory open failed");
            },
        }
    }
}

async fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %err, "Failed to discard temp file");
        }
    }
}

fn unique_tmp_path(target: &Path, counter: &AtomicU64) -> PathBuf {
    let counter = counter.fetch_add(1, Ordering::Relaxed);
    let file_name = target.file_name().and_then(|s| s.to_str()).unwrap_or("storage");
    let tmp_name = format!("{file_name}{TMP_MARKER}{}.{counter}", std::process::id());
    target.with_file_name(tmp_name)
}

//! Opening a base directory as a [`Storage`] root.
//!
//! The root is fixed by a typestate: [`StorageBuilder::connect`] only exists once
//! [`StorageBuilder::root`] was called. Durability and temp-file cleanup are tuned on
//! either side of that transition.

use crate::engine::{Storage, StorageInner};
use crate::error::{StorageError, StorageErrorExt};
use private::Sealed;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Default age after which an orphaned temp file is considered abandoned.
pub const DEFAULT_TMP_MAX_AGE: Duration = Duration::from_secs(300);

/// Builder state before a base directory was chosen.
#[derive(Debug, Default)]
pub struct Unrooted;

/// Builder state holding the base directory.
#[derive(Debug)]
pub struct Rooted(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for Unrooted {}
impl Sealed for Rooted {}

#[allow(private_bounds)]
#[derive(Debug)]
pub struct StorageBuilder<S: Sealed = Unrooted> {
    root: S,
    create: bool,
    sync: bool,
    tmp_max_age: Duration,
}

impl Default for StorageBuilder<Unrooted> {
    fn default() -> Self {
        Self { root: Unrooted, create: true, sync: true, tmp_max_age: DEFAULT_TMP_MAX_AGE }
    }
}

#[allow(private_bounds)]
impl<S: Sealed> StorageBuilder<S> {
    #[must_use = "create(..) returns the builder; a missing base directory is only created by the returned value"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.create = enable;
        self
    }

    #[must_use = "sync(..) returns the builder; fsync before rename only applies to the returned value"]
    pub const fn sync(mut self, enable: bool) -> Self {
        self.sync = enable;
        self
    }

    #[must_use = "tmp_max_age(..) returns the builder; the purge threshold only applies to the returned value"]
    pub const fn tmp_max_age(mut self, age: Duration) -> Self {
        self.tmp_max_age = age;
        self
    }
}

impl StorageBuilder<Unrooted> {
    #[must_use = "a builder does nothing until it is rooted and connected"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "root(..) returns the rooted builder; call connect() on it"]
    pub fn root(self, path: impl Into<PathBuf>) -> StorageBuilder<Rooted> {
        StorageBuilder {
            root: Rooted(path.into()),
            create: self.create,
            sync: self.sync,
            tmp_max_age: self.tmp_max_age,
        }
    }
}

impl StorageBuilder<Rooted> {
    /// Opens the base directory, creating it first unless `create(false)` was set.
    ///
    /// The root is canonicalized so sandbox checks compare physical paths, then temp
    /// files older than `tmp_max_age` are purged. A failing purge is logged only.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] when the directory cannot be created or resolved (including
    /// a missing root with `create(false)`), and [`StorageError::NotADirectory`] when the
    /// root names something other than a directory.
    pub async fn connect(self) -> Result<Storage, StorageError> {
        let root = self.root.0.as_path();

        if self.create {
            fs::create_dir_all(root)
                .await
                .context(format!("Failed to create base directory {}", root.display()))?;
            info!(path = %root.display(), "Base directory created");
        }

        let canonical = resolve_root(root).await?;
        debug!(path = %canonical.display(), sync = self.sync, "Storage root resolved");

        let storage = Storage {
            inner: Arc::new(StorageInner {
                root: canonical,
                sync: self.sync,
                tmp_max_age: self.tmp_max_age,
                tmp_counter: AtomicU64::new(1),
            }),
        };
        storage.purge_tmp().await;
        Ok(storage)
    }
}

async fn resolve_root(root: &Path) -> Result<PathBuf, StorageError> {
    let canonical = fs::canonicalize(root)
        .await
        .context(format!("Failed to resolve base directory {}", root.display()))?;
    let meta = fs::metadata(&canonical)
        .await
        .context(format!("Failed to inspect base directory {}", root.display()))?;
    if meta.is_dir() {
        Ok(canonical)
    } else {
        Err(StorageError::NotADirectory {
            message: root.display().to_string().into(),
            context: Some("Base directory".into()),
        })
    }
}

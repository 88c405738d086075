//! The shed: a directory of wheels plus the catalog that indexes them.
//!
//! Opening a shed spawns a one-shot initialization task that walks four stages:
//! 1. base directory present (created when allowed),
//! 2. `objects/` present,
//! 3. metadata file present and the [`Catalog`] constructed,
//! 4. catalog loaded and wheels reconstructed.
//!
//! Stages 2 and 3 run concurrently once the base directory exists. The outcome is
//! published on a watch channel, so [`Shed::ready`] either resolves or rejects with the
//! failing step; it never hangs on a failed prerequisite. Registry operations issued
//! before stage 4 fail fast with [`ShedError::NotReady`].
//!
//! Catalog and registry sit behind one async mutex: every mutation is
//! "edit in memory, rewrite the whole file" and the lock makes those sequences
//! serialize instead of overwriting each other. The shed still assumes a single owning
//! process per directory.

use crate::builder::ShedBuilder;
use crate::catalog::Catalog;
use crate::error::{BoxError, ShedError, ShedErrorExt};
use crate::ids::IdGenerator;
use crate::readiness::{self, Readiness, Stage};
use crate::record::{ContentType, MetadataRecord, now_millis};
use crate::wheel::Wheel;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{Span, debug, error, info, instrument, warn};
use wheel_storage::{Storage, is_plain_file_name};

/// Directory (under the base path) holding one file per wheel.
pub const OBJECTS_DIR: &str = "objects";
/// Catalog file name (under the base path).
pub const METADATA_FILE: &str = ".wheel-metadata.json";

#[derive(Debug, Clone, Copy)]
pub(crate) struct ShedSettings {
    pub(crate) create: bool,
    pub(crate) sync: bool,
    pub(crate) tmp_max_age: Duration,
}

/// Registry and catalog entries replaced by a registration.
#[derive(Debug)]
struct Displaced {
    wheel: Option<Wheel>,
    record: Option<MetadataRecord>,
}

#[derive(Debug, Default)]
struct ShedState {
    catalog: Option<Catalog>,
    registry: Vec<Wheel>,
}

#[derive(Debug)]
pub(crate) struct ShedInner {
    me: Weak<ShedInner>,
    base_path: PathBuf,
    settings: ShedSettings,
    ids: Arc<dyn IdGenerator>,
    span: Span,
    readiness: watch::Sender<Readiness>,
    storage: OnceLock<Storage>,
    state: Mutex<ShedState>,
    ensure: Mutex<()>,
}

impl ShedInner {
    pub(crate) fn new(
        base_path: PathBuf,
        settings: ShedSettings,
        ids: Arc<dyn IdGenerator>,
        span: Span,
    ) -> Arc<Self> {
        let (readiness, _) = watch::channel(Readiness::Initializing(Stage::None));
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base_path,
            settings,
            ids,
            span,
            readiness,
            storage: OnceLock::new(),
            state: Mutex::new(ShedState::default()),
            ensure: Mutex::new(()),
        })
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    fn storage(&self) -> Result<Storage, ShedError> {
        self.storage
            .get()
            .cloned()
            .ok_or_else(|| ShedError::NotReady { stage: self.readiness().stage() })
    }

    /// Body of the initialization task. Publishes success or failure exactly once.
    pub(crate) async fn run_initialization(self: Arc<Self>) {
        match self.initialize().await {
            Ok(()) => info!(path = %self.base_path.display(), "Shed ready"),
            Err(err) => {
                error!(path = %self.base_path.display(), error = %err, "Shed initialization failed");
                readiness::fail(&self.readiness, err.to_string());
            },
        }
    }

    async fn initialize(&self) -> Result<(), ShedError> {
        let storage = Storage::builder()
            .root(&self.base_path)
            .create(self.settings.create)
            .sync(self.settings.sync)
            .tmp_max_age(self.settings.tmp_max_age)
            .connect()
            .await
            .context("Failed to prepare base directory")?;
        let storage = self.storage.get_or_init(|| storage).clone();
        debug!(path = %storage.root().display(), "Base directory ready");
        readiness::advance(&self.readiness, Stage::BaseDirReady);

        let objects = async {
            storage.create_dir(OBJECTS_DIR).await.context("Failed to prepare objects directory")
        };
        let metadata = async {
            let created = storage
                .create_empty(METADATA_FILE)
                .await
                .context("Failed to prepare metadata file")?;
            debug!(created, "Metadata file ready");
            Ok::<_, ShedError>(Catalog::new(storage.clone(), METADATA_FILE))
        };
        let (objects_created, catalog) = tokio::try_join!(objects, metadata)?;
        debug!(created = objects_created, "Objects directory ready");
        readiness::advance(&self.readiness, Stage::ObjectsDirReady);

        let mut state = self.state.lock().await;
        let catalog = state.catalog.insert(catalog);
        readiness::advance(&self.readiness, Stage::CatalogConstructed);

        catalog.load().await?;
        let wheels = catalog.reconstruct(&self.me);
        info!(wheels = wheels.len(), records = catalog.len(), "Catalog loaded");
        state.registry = wheels;
        drop(state);

        readiness::advance(&self.readiness, Stage::Ready);
        Ok(())
    }

    /// Builds an unregistered wheel with a fresh id. Its file does not exist yet and its
    /// readiness stays pending until [`Self::add_wheel`] settles it.
    pub(crate) fn new_wheel(&self, content_type: ContentType) -> Result<Wheel, ShedError> {
        self.readiness().check()?;
        let storage = self.storage()?;
        let record = MetadataRecord::new(self.ids.next_id(), content_type, now_millis());
        if !is_plain_file_name(&record.id) {
            return Err(ShedError::InitFailed {
                message: record.id.into(),
                context: Some("Id generator produced an id that cannot be a file name".into()),
            });
        }
        Ok(Wheel::fresh(self.me.clone(), storage, record))
    }

    #[instrument(parent = &self.span, skip_all, fields(content_type = %content_type))]
    pub(crate) async fn create_wheel(&self, content_type: ContentType) -> Result<Wheel, ShedError> {
        let wheel = self.new_wheel(content_type)?;
        self.add_wheel(&wheel, false).await?;
        Ok(wheel)
    }

    #[instrument(parent = &self.span, skip_all, fields(id = %wheel.id(), write_file = write_file))]
    pub(crate) async fn add_wheel(&self, wheel: &Wheel, write_file: bool) -> Result<(), ShedError> {
        self.readiness().check()?;
        self.check_owner(wheel)?;
        if !wheel.is_good() {
            return Err(ShedError::Removed { message: wheel.id().into(), context: None });
        }

        let mut guard = self.state.lock().await;
        let ShedState { catalog, registry } = &mut *guard;
        let catalog =
            catalog.as_mut().ok_or_else(|| ShedError::NotReady { stage: self.readiness().stage() })?;

        let id = wheel.id();
        let displaced = Self::register(registry, catalog, wheel);

        if let Err(err) = catalog.write().await {
            Self::rollback(registry, catalog, wheel, displaced, &err);
            warn!(id = %id, error = %err, "Catalog write failed, registration rolled back");
            return Err(err);
        }

        let file = if write_file { wheel.flush_buffer().await } else { wheel.ensure_file().await };
        if let Err(err) = file {
            Self::rollback(registry, catalog, wheel, displaced, &err);
            if let Err(restore) = catalog.write().await {
                warn!(id = %id, error = %restore, "Failed to persist rolled back catalog");
            }
            warn!(id = %id, error = %err, "Wheel file write failed, registration rolled back");
            return Err(err);
        }

        wheel.mark_ready();
        debug!(id = %id, "Wheel registered");
        Ok(())
    }

    /// Puts `wheel` into registry and catalog, replacing any entry with the same id in place.
    fn register(registry: &mut Vec<Wheel>, catalog: &mut Catalog, wheel: &Wheel) -> Displaced {
        let id = wheel.id();
        let previous = match registry.iter().position(|w| w.id() == id) {
            Some(index) => Some(std::mem::replace(&mut registry[index], wheel.clone())),
            None => {
                registry.push(wheel.clone());
                None
            },
        };
        let record = catalog.add(wheel.metadata());
        Displaced { wheel: previous, record }
    }

    /// Restores registry and catalog to their state before [`Self::register`]. A wheel
    /// that was live before the failed call stays live.
    fn rollback(
        registry: &mut Vec<Wheel>,
        catalog: &mut Catalog,
        wheel: &Wheel,
        displaced: Displaced,
        cause: &ShedError,
    ) {
        let id = wheel.id();
        let was_live = displaced.wheel.as_ref().is_some_and(|w| w.ptr_eq(wheel));

        match displaced.wheel {
            Some(previous) => {
                if let Some(slot) = registry.iter_mut().find(|w| w.id() == id) {
                    *slot = previous;
                }
            },
            None => registry.retain(|w| w.id() != id),
        }
        match displaced.record {
            Some(record) => {
                catalog.add(record);
            },
            None => {
                catalog.remove_by_id(&id);
            },
        }

        if !was_live {
            wheel.mark_failed(cause.to_string());
        }
    }

    fn unregister(registry: &mut Vec<Wheel>, catalog: &mut Catalog, id: &str) {
        registry.retain(|w| w.id() != id);
        catalog.remove_by_id(id);
    }

    fn check_owner(&self, wheel: &Wheel) -> Result<(), ShedError> {
        if wheel.belongs_to(self) {
            Ok(())
        } else {
            Err(ShedError::NotFound {
                message: wheel.id().into(),
                context: Some("Wheel belongs to a different shed".into()),
            })
        }
    }

    #[instrument(parent = &self.span, skip_all, fields(id = %wheel.id()))]
    pub(crate) async fn remove_wheel(&self, wheel: &Wheel) -> Result<(), ShedError> {
        self.readiness().check()?;
        self.check_owner(wheel)?;
        if !wheel.is_good() {
            return Err(ShedError::Removed { message: wheel.id().into(), context: None });
        }

        let mut guard = self.state.lock().await;
        let ShedState { catalog, registry } = &mut *guard;
        let catalog =
            catalog.as_mut().ok_or_else(|| ShedError::NotReady { stage: self.readiness().stage() })?;

        wheel.discard_file().await?;

        let id = wheel.id();
        Self::unregister(registry, catalog, &id);
        wheel.mark_removed();
        catalog.write().await?;

        info!(id = %id, "Wheel removed");
        Ok(())
    }

    pub(crate) async fn filter<F, E>(&self, mut predicate: F) -> Result<Vec<Wheel>, ShedError>
    where
        F: FnMut(&Wheel) -> Result<bool, E>,
        E: Into<BoxError>,
    {
        let registry = self.snapshot().await?;
        let mut matches = Vec::new();
        for wheel in registry {
            let keep = predicate(&wheel).map_err(|e| ShedError::Predicate {
                source: e.into(),
                context: Some(format!("wheel {}", wheel.id()).into()),
            })?;
            if keep {
                matches.push(wheel);
            }
        }
        Ok(matches)
    }

    /// Registry copy, so callers can inspect wheels without holding the shed lock.
    pub(crate) async fn snapshot(&self) -> Result<Vec<Wheel>, ShedError> {
        self.readiness().check()?;
        Ok(self.state.lock().await.registry.clone())
    }

    #[instrument(parent = &self.span, skip_all, fields(name = %name, content_type = %content_type))]
    pub(crate) async fn ensure_wheel_with_name(
        &self,
        name: &str,
        content_type: ContentType,
    ) -> Result<Wheel, ShedError> {
        self.readiness().check()?;
        let _serialized = self.ensure.lock().await;

        let existing = self
            .snapshot()
            .await?
            .into_iter()
            .find(|w| w.name() == name && w.content_type() == content_type);

        let wheel = match existing {
            Some(wheel) => wheel,
            None => {
                let wheel = self.new_wheel(content_type)?;
                wheel.preset_name(name);
                self.add_wheel(&wheel, false).await?;
                info!(id = %wheel.id(), "Created wheel on demand");
                wheel
            },
        };

        wheel.ready().await?;
        Ok(wheel)
    }

    #[instrument(parent = &self.span, skip_all)]
    pub(crate) async fn write_metadata(&self) -> Result<(), ShedError> {
        if matches!(self.readiness(), Readiness::Closed) {
            return Err(ShedError::closed());
        }

        let mut guard = self.state.lock().await;
        let ShedState { catalog, registry } = &mut *guard;
        let Some(catalog) = catalog.as_mut() else {
            debug!("Catalog not constructed yet, nothing to write");
            return Ok(());
        };

        catalog.sync_from(registry.iter().map(Wheel::metadata));
        catalog.write().await
    }

    #[instrument(parent = &self.span, skip_all)]
    pub(crate) async fn close(&self) -> Result<(), ShedError> {
        if matches!(self.readiness(), Readiness::Closed) {
            return Ok(());
        }
        self.write_metadata().await?;
        self.readiness.send_replace(Readiness::Closed);
        info!(path = %self.base_path.display(), "Shed closed");
        Ok(())
    }
}

/// A directory-backed container of wheels.
///
/// `Shed` is a cheap, clonable handle. Build one with [`Shed::builder`]:
///
/// ```rust
/// use wheel_shed::{ContentType, Json, Shed, ShedError};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), ShedError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let shed = Shed::builder().root(tmp.path().join("shed")).connect().await?;
///
///     let log = shed.ensure_wheel_with_name("log", ContentType::Json).await?;
///     log.set_content_as::<Json>(&serde_json::json!({ "n": 1 })).await?;
///     assert_eq!(log.get_content_as::<Json>(serde_json::Value::Null).await?["n"], 1);
///
///     shed.close().await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Shed {
    pub(crate) inner: Arc<ShedInner>,
}

impl Shed {
    #[must_use = "The shed is not opened until you call .open() or .connect()"]
    pub fn builder() -> ShedBuilder {
        ShedBuilder::new()
    }

    /// Resolves once every initialization stage completed; rejects with the failing
    /// step otherwise.
    ///
    /// # Errors
    /// Returns [`ShedError::InitFailed`] if a stage failed and [`ShedError::Closed`] if
    /// the shed was closed.
    pub async fn ready(&self) -> Result<(), ShedError> {
        readiness::wait(&self.inner.readiness).await
    }

    /// The current lifecycle state, without waiting.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.inner.readiness()
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.inner.readiness().stage()
    }

    /// The base path as configured (not canonicalized).
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    #[must_use]
    pub fn objects_dir(&self) -> PathBuf {
        self.inner.base_path.join(OBJECTS_DIR)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.inner.base_path.join(METADATA_FILE)
    }

    /// The span all shed operations are recorded under.
    #[must_use]
    pub fn span(&self) -> &Span {
        self.inner.span()
    }

    /// Creates a wheel of `content_type`: fresh id, empty file, catalog entry.
    ///
    /// # Errors
    /// Returns [`ShedError::NotReady`]/[`ShedError::Closed`] outside the ready state and
    /// [`ShedError::Storage`] if the file or the catalog cannot be written.
    pub async fn create_wheel(&self, content_type: ContentType) -> Result<Wheel, ShedError> {
        self.inner.create_wheel(content_type).await
    }

    /// Builds a wheel with a fresh id without creating its file or registering it.
    /// Hand it to [`Shed::add_wheel`] to bring it to life.
    ///
    /// # Errors
    /// Returns [`ShedError::NotReady`]/[`ShedError::Closed`] outside the ready state.
    pub fn new_wheel(&self, content_type: ContentType) -> Result<Wheel, ShedError> {
        self.inner.new_wheel(content_type)
    }

    /// Registers `wheel` in the registry and the catalog, persists the catalog, then
    /// writes the wheel's buffer to its file (`write_file`) or creates the file when it
    /// is missing. On success the wheel is ready.
    ///
    /// Any failure restores the registry and catalog entries the call replaced. A wheel
    /// that was not registered before is marked failed; one that was stays usable.
    ///
    /// # Errors
    /// Storage or serialization errors from either write, readiness errors,
    /// [`ShedError::Removed`] for a removed wheel, or [`ShedError::NotFound`] for a
    /// wheel created by another shed.
    pub async fn add_wheel(&self, wheel: &Wheel, write_file: bool) -> Result<(), ShedError> {
        self.inner.add_wheel(wheel, write_file).await
    }

    /// Deletes the wheel's file, then drops it from the registry and the catalog.
    ///
    /// # Errors
    /// If the file cannot be deleted the registry and catalog are left untouched and the
    /// storage error is returned. Removed wheels yield [`ShedError::Removed`].
    pub async fn remove_wheel(&self, wheel: &Wheel) -> Result<(), ShedError> {
        self.inner.remove_wheel(wheel).await
    }

    /// Wheels for which the fallible `predicate` returns `Ok(true)`, in registry order.
    ///
    /// # Errors
    /// The first predicate error is returned as [`ShedError::Predicate`].
    pub async fn filter<F, E>(&self, predicate: F) -> Result<Vec<Wheel>, ShedError>
    where
        F: FnMut(&Wheel) -> Result<bool, E>,
        E: Into<BoxError>,
    {
        self.inner.filter(predicate).await
    }

    /// Infallible variant of [`Shed::filter`].
    ///
    /// # Errors
    /// Readiness errors only.
    pub async fn filter_by(
        &self,
        mut predicate: impl FnMut(&Wheel) -> bool,
    ) -> Result<Vec<Wheel>, ShedError> {
        self.inner.filter(|wheel| Ok::<_, std::convert::Infallible>(predicate(wheel))).await
    }

    /// Returns the wheel named `name` with exactly `content_type`, creating it when
    /// there is none. The returned wheel is ready.
    ///
    /// # Errors
    /// Readiness errors, or creation failures (see [`Shed::create_wheel`]).
    pub async fn ensure_wheel_with_name(
        &self,
        name: &str,
        content_type: ContentType,
    ) -> Result<Wheel, ShedError> {
        self.inner.ensure_wheel_with_name(name, content_type).await
    }

    /// Looks a live wheel up by id.
    ///
    /// # Errors
    /// Returns [`ShedError::NotFound`] when no live wheel has this id.
    pub async fn get(&self, id: &str) -> Result<Wheel, ShedError> {
        self.inner.snapshot().await?.into_iter().find(|w| w.id() == id).ok_or_else(|| {
            ShedError::NotFound { message: id.to_owned().into(), context: None }
        })
    }

    /// All live wheels in registry order.
    ///
    /// # Errors
    /// Readiness errors only.
    pub async fn wheels(&self) -> Result<Vec<Wheel>, ShedError> {
        self.inner.snapshot().await
    }

    /// Number of live wheels.
    ///
    /// # Errors
    /// Readiness errors only.
    pub async fn len(&self) -> Result<usize, ShedError> {
        self.inner.readiness().check()?;
        Ok(self.inner.state.lock().await.registry.len())
    }

    /// Rebuilds the catalog from the live wheels and persists it. Succeeds without
    /// writing when the catalog has not been constructed yet.
    ///
    /// # Errors
    /// Returns [`ShedError::Closed`] after [`Shed::close`], or the catalog write error.
    pub async fn write_metadata(&self) -> Result<(), ShedError> {
        self.inner.write_metadata().await
    }

    /// Flushes the catalog and ends the shed's lifecycle. Later operations on the shed
    /// and on its wheels fail with [`ShedError::Closed`]. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the catalog write error; the shed stays open in that case.
    pub async fn close(&self) -> Result<(), ShedError> {
        self.inner.close().await
    }
}

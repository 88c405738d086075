//! Wheels: single blobs with a metadata record.
//!
//! A [`Wheel`] is a cheap, clonable handle; clones share one underlying object, so the
//! handle returned by [`Shed::ensure_wheel_with_name`](crate::Shed::ensure_wheel_with_name)
//! twice is the same wheel. The file on disk is the source of truth: the in-memory buffer
//! only mirrors it right after a read or a write.

use crate::codec::{self, Codec};
use crate::error::{ShedError, ShedErrorExt};
use crate::readiness::{self, WheelReadiness};
use crate::record::{ContentType, MetadataRecord, now_millis};
use crate::shed::{OBJECTS_DIR, ShedInner};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::debug;
use wheel_storage::Storage;

#[derive(Debug)]
struct WheelState {
    record: MetadataRecord,
    buffer: Vec<u8>,
    good: bool,
}

pub(crate) struct WheelInner {
    shed: Weak<ShedInner>,
    storage: Storage,
    relative: PathBuf,
    path: PathBuf,
    state: Mutex<WheelState>,
    ready: watch::Sender<WheelReadiness>,
}

#[derive(Clone)]
pub struct Wheel {
    inner: Arc<WheelInner>,
}

impl fmt::Debug for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Wheel")
            .field("id", &state.record.id)
            .field("name", &state.record.name)
            .field("content_type", &state.record.content_type)
            .field("good", &state.good)
            .finish_non_exhaustive()
    }
}

impl Wheel {
    fn build(
        shed: Weak<ShedInner>,
        storage: Storage,
        record: MetadataRecord,
        readiness: WheelReadiness,
    ) -> Self {
        let relative = Path::new(OBJECTS_DIR).join(&record.id);
        let path = storage.root().join(&relative);
        let (ready, _) = watch::channel(readiness);
        Self {
            inner: Arc::new(WheelInner {
                shed,
                storage,
                relative,
                path,
                state: Mutex::new(WheelState { record, buffer: Vec::new(), good: true }),
                ready,
            }),
        }
    }

    /// A brand-new wheel whose file does not exist yet; readiness is pending until its
    /// registration settles it.
    pub(crate) fn fresh(shed: Weak<ShedInner>, storage: Storage, record: MetadataRecord) -> Self {
        Self::build(shed, storage, record, WheelReadiness::Pending)
    }

    /// A wheel rebuilt from a catalog record. Its file is assumed to exist already.
    pub(crate) fn restore(shed: Weak<ShedInner>, storage: Storage, record: MetadataRecord) -> Self {
        Self::build(shed, storage, record, WheelReadiness::Ready)
    }

    /// Creates the backing file when it is missing; an existing file is kept as is.
    pub(crate) async fn ensure_file(&self) -> Result<(), ShedError> {
        let created = self
            .inner
            .storage
            .create_empty(&self.inner.relative)
            .await
            .context(format!("Failed to initialize wheel {}", self.id()))?;
        debug!(id = %self.id(), created, "Wheel file initialized");
        Ok(())
    }

    /// Names a wheel that is not registered yet, so registration persists the name.
    pub(crate) fn preset_name(&self, name: &str) {
        name.clone_into(&mut self.inner.state.lock().record.name);
    }

    pub(crate) fn mark_ready(&self) {
        self.inner.ready.send_if_modified(|state| {
            let pending = *state == WheelReadiness::Pending;
            if pending {
                *state = WheelReadiness::Ready;
            }
            pending
        });
    }

    pub(crate) fn mark_failed(&self, reason: String) {
        self.inner.state.lock().good = false;
        self.inner.ready.send_if_modified(|state| {
            let pending = *state == WheelReadiness::Pending;
            if pending {
                *state = WheelReadiness::Failed(reason.into());
            }
            pending
        });
    }

    pub(crate) fn mark_removed(&self) {
        let mut state = self.inner.state.lock();
        state.good = false;
        state.buffer.clear();
    }

    /// Writes the current buffer to disk without touching the catalog.
    pub(crate) async fn flush_buffer(&self) -> Result<(), ShedError> {
        let buffer = self.inner.state.lock().buffer.clone();
        self.inner
            .storage
            .write(&self.inner.relative, &buffer)
            .await
            .context(format!("Failed to write wheel {}", self.id()))
    }

    pub(crate) async fn discard_file(&self) -> Result<(), ShedError> {
        self.inner
            .storage
            .delete(&self.inner.relative)
            .await
            .context(format!("Failed to delete wheel {}", self.id()))
    }

    pub(crate) fn belongs_to(&self, shed: &ShedInner) -> bool {
        std::ptr::eq(self.inner.shed.as_ptr(), shed)
    }

    /// Resolves once the wheel's file is in place; rejects if it could not be created.
    ///
    /// # Errors
    /// Returns [`ShedError::InitFailed`] when initialization failed.
    pub async fn ready(&self) -> Result<(), ShedError> {
        let id = self.id();
        readiness::wait_wheel(&self.inner.ready, &id).await
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow() == WheelReadiness::Ready
    }

    /// `false` once the wheel was removed or failed to initialize.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.inner.state.lock().good
    }

    #[must_use]
    pub fn id(&self) -> String {
        self.inner.state.lock().record.id.clone()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner.state.lock().record.name.clone()
    }

    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.inner.state.lock().record.content_type
    }

    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.inner.state.lock().record.tags.clone()
    }

    /// A copy of the wheel's metadata record.
    #[must_use]
    pub fn metadata(&self) -> MetadataRecord {
        self.inner.state.lock().record.clone()
    }

    /// Absolute path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// `true` when both handles point at the same underlying wheel.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn shed(&self) -> Result<Arc<ShedInner>, ShedError> {
        self.inner.shed.upgrade().ok_or_else(ShedError::closed)
    }

    /// Fails unless the wheel is usable and its shed still open.
    fn live_shed(&self) -> Result<Arc<ShedInner>, ShedError> {
        let (good, id) = {
            let state = self.inner.state.lock();
            (state.good, state.record.id.clone())
        };
        if !good {
            return Err(ShedError::Removed { message: id.into(), context: None });
        }
        let shed = self.shed()?;
        shed.readiness().check()?;
        Ok(shed)
    }

    /// Reads the file into the buffer and returns its bytes.
    ///
    /// # Errors
    /// Returns [`ShedError::Removed`] for removed wheels and [`ShedError::Storage`] when
    /// the file cannot be read.
    pub async fn get_content(&self) -> Result<Vec<u8>, ShedError> {
        self.live_shed()?;
        let bytes = self
            .inner
            .storage
            .read(&self.inner.relative)
            .await
            .context(format!("Failed to read wheel {}", self.id()))?;
        self.inner.state.lock().buffer.clone_from(&bytes);
        Ok(bytes)
    }

    /// Replaces the content: buffer, file, `modified` and the persisted catalog.
    ///
    /// # Errors
    /// Returns [`ShedError::Removed`] for removed wheels, [`ShedError::Closed`] when the
    /// shed is closed, and storage errors from either the file or the catalog write.
    pub async fn set_content(&self, bytes: impl Into<Vec<u8>>) -> Result<(), ShedError> {
        let shed = self.live_shed()?;
        {
            let mut state = self.inner.state.lock();
            state.buffer = bytes.into();
            state.record.touch(now_millis());
        }
        self.flush_buffer().await?;
        shed.write_metadata().await
    }

    /// Reads and decodes the content with codec `C`; empty content yields `default`.
    ///
    /// # Errors
    /// Returns [`ShedError::ContentTypeMismatch`] if `C` does not match the wheel's
    /// content type and [`ShedError::Codec`] if non-empty content fails to decode.
    pub async fn get_content_as<C: Codec>(&self, default: C::Value) -> Result<C::Value, ShedError> {
        self.expect_codec::<C>()?;
        let bytes = self.get_content().await?;
        codec::decode_or::<C>(&bytes, default).context(format!("wheel {}", self.id()))
    }

    /// Encodes `value` with codec `C` and stores it through [`Wheel::set_content`].
    ///
    /// # Errors
    /// Same as [`Wheel::set_content`], plus codec and content-type failures.
    pub async fn set_content_as<C: Codec>(&self, value: &C::Value) -> Result<(), ShedError> {
        self.expect_codec::<C>()?;
        let bytes = C::encode(value).context(format!("wheel {}", self.id()))?;
        self.set_content(bytes).await
    }

    fn expect_codec<C: Codec>(&self) -> Result<(), ShedError> {
        let actual = self.content_type();
        if actual == C::CONTENT_TYPE {
            Ok(())
        } else {
            Err(ShedError::ContentTypeMismatch { expected: C::CONTENT_TYPE, actual })
        }
    }

    /// Renames the wheel and persists the catalog.
    ///
    /// # Errors
    /// Returns [`ShedError::Removed`] or [`ShedError::Closed`] for dead wheels, and
    /// storage errors from the catalog write.
    pub async fn set_name(&self, name: impl Into<String>) -> Result<(), ShedError> {
        let name = name.into();
        self.update_record(|record| record.name = name).await
    }

    /// Adds a tag (no duplicates) and persists the catalog.
    ///
    /// # Errors
    /// Same as [`Wheel::set_name`].
    pub async fn add_tag(&self, tag: impl Into<String>) -> Result<(), ShedError> {
        let tag = tag.into();
        self.update_record(|record| {
            if !record.tags.contains(&tag) {
                record.tags.push(tag);
            }
        })
        .await
    }

    /// Removes a tag if present and persists the catalog.
    ///
    /// # Errors
    /// Same as [`Wheel::set_name`].
    pub async fn remove_tag(&self, tag: &str) -> Result<(), ShedError> {
        self.update_record(|record| record.tags.retain(|t| t != tag)).await
    }

    async fn update_record(&self, edit: impl FnOnce(&mut MetadataRecord)) -> Result<(), ShedError> {
        let shed = self.live_shed()?;
        {
            let mut state = self.inner.state.lock();
            edit(&mut state.record);
            state.record.touch(now_millis());
        }
        shed.write_metadata().await
    }

    /// Deletes the wheel through its shed; afterwards every content operation fails.
    ///
    /// # Errors
    /// See [`Shed::remove_wheel`](crate::Shed::remove_wheel).
    pub async fn remove(&self) -> Result<(), ShedError> {
        let shed = self.shed()?;
        shed.remove_wheel(self).await
    }
}

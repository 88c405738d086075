use crate::config::ShedConfig;
use crate::error::ShedError;
use crate::ids::{IdGenerator, UuidGenerator};
use crate::shed::{Shed, ShedInner, ShedSettings};
use private::Sealed;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{Instrument, Span, info_span};
use wheel_storage::DEFAULT_TMP_MAX_AGE;

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

impl Default for ShedSettings {
    fn default() -> Self {
        Self { create: true, sync: true, tmp_max_age: DEFAULT_TMP_MAX_AGE }
    }
}

#[allow(private_bounds)]
pub struct ShedBuilder<S: Sealed = NoRoot> {
    state: S,
    settings: ShedSettings,
    ids: Arc<dyn IdGenerator>,
    span: Option<Span>,
}

#[allow(private_bounds)]
impl<S: Sealed + fmt::Debug> fmt::Debug for ShedBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShedBuilder")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl Default for ShedBuilder<NoRoot> {
    fn default() -> Self {
        Self {
            state: NoRoot,
            settings: ShedSettings::default(),
            ids: Arc::new(UuidGenerator),
            span: None,
        }
    }
}

#[allow(private_bounds)]
impl<S: Sealed> ShedBuilder<S> {
    #[must_use = "Sets whether the base directory should be created if it does not exist"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.settings.create = enable;
        self
    }

    #[must_use = "Sets whether writes are flushed to hardware before they become visible"]
    pub const fn sync(mut self, enable: bool) -> Self {
        self.settings.sync = enable;
        self
    }

    #[must_use = "Sets the age after which orphaned temp files are purged on open"]
    pub const fn tmp_max_age(mut self, age: Duration) -> Self {
        self.settings.tmp_max_age = age;
        self
    }

    #[must_use = "Replaces the generator used for fresh wheel ids"]
    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Parent span for everything the shed logs. Defaults to a `wheel_shed` info span
    /// carrying the base path.
    #[must_use = "Sets the span shed operations are recorded under"]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    fn transition<N: Sealed>(self, state: N) -> ShedBuilder<N> {
        ShedBuilder { state, settings: self.settings, ids: self.ids, span: self.span }
    }
}

impl ShedBuilder<NoRoot> {
    #[must_use = "Creates a new shed builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the base directory of the shed"]
    pub fn root(self, path: impl Into<PathBuf>) -> ShedBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }

    /// Takes base path and storage settings from a loaded [`ShedConfig`].
    #[must_use = "Applies a loaded configuration to the builder"]
    pub fn config(self, config: &ShedConfig) -> ShedBuilder<WithRoot> {
        self.create(config.create)
            .sync(config.sync)
            .tmp_max_age(config.tmp_max_age())
            .root(config.base_path.clone())
    }
}

impl ShedBuilder<WithRoot> {
    /// Returns the shed handle immediately and prepares the directory in the background.
    ///
    /// Until [`Shed::ready`] resolves, registry operations fail with
    /// [`ShedError::NotReady`].
    ///
    /// # Errors
    /// Returns [`ShedError::InitFailed`] when called outside a Tokio runtime.
    pub fn open(self) -> Result<Shed, ShedError> {
        let handle = Handle::try_current().map_err(|e| ShedError::InitFailed {
            message: e.to_string().into(),
            context: Some("Opening a shed requires a Tokio runtime".into()),
        })?;

        let base_path = self.state.0;
        let span = self
            .span
            .unwrap_or_else(|| info_span!("wheel_shed", root = %base_path.display()));

        let inner = ShedInner::new(base_path, self.settings, self.ids, span.clone());
        handle.spawn(Arc::clone(&inner).run_initialization().instrument(span));

        Ok(Shed { inner })
    }

    /// Opens the shed and waits until it is ready.
    ///
    /// # Errors
    /// Returns the failing initialization step as [`ShedError::InitFailed`].
    pub async fn connect(self) -> Result<Shed, ShedError> {
        let shed = self.open()?;
        shed.ready().await?;
        Ok(shed)
    }
}

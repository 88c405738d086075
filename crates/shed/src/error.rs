use crate::readiness::Stage;
use crate::record::ContentType;
use std::borrow::Cow;
use wheel_storage::StorageError;

/// Boxed error raised by user code (filter predicates) or a codec.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the shed, its catalog and its wheels.
#[derive(Debug, thiserror::Error)]
pub enum ShedError {
    #[error("Storage failure{}: {source}", format_context(.context))]
    Storage { source: StorageError, context: Option<Cow<'static, str>> },

    #[error("Catalog serialization failure{}: {source}", format_context(.context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Content codec failure{}: {source}", format_context(.context))]
    Codec { source: BoxError, context: Option<Cow<'static, str>> },

    #[error("Shed is not ready (stage {stage})")]
    NotReady { stage: Stage },

    #[error("Initialization failed{}: {message}", format_context(.context))]
    InitFailed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Shed is closed{}", format_context(.context))]
    Closed { context: Option<Cow<'static, str>> },

    #[error("Wheel was removed or never became usable{}: {message}", format_context(.context))]
    Removed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Content type mismatch: wheel holds {actual}, codec expects {expected}")]
    ContentTypeMismatch { expected: ContentType, actual: ContentType },

    #[error("Filter predicate failed{}: {source}", format_context(.context))]
    Predicate { source: BoxError, context: Option<Cow<'static, str>> },

    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    #[error("Wheel not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Attaches a human readable context to a failed shed operation.
pub trait ShedErrorExt<T> {
    /// Sets (or overrides) the context of the error carried by `self`.
    ///
    /// # Errors
    /// Returns the original error converted into [`ShedError`] with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShedError>;
}

impl<T> ShedErrorExt<T> for Result<T, ShedError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                ShedError::Storage { context: c, .. }
                | ShedError::Serialization { context: c, .. }
                | ShedError::Codec { context: c, .. }
                | ShedError::InitFailed { context: c, .. }
                | ShedError::Closed { context: c }
                | ShedError::Removed { context: c, .. }
                | ShedError::Predicate { context: c, .. }
                | ShedError::Config { context: c, .. }
                | ShedError::NotFound { context: c, .. } => *c = Some(context.into()),
                ShedError::NotReady { .. } | ShedError::ContentTypeMismatch { .. } => {},
            }
            e
        })
    }
}

macro_rules! source_conversions {
    ($($source:ty => $variant:ident),* $(,)?) => {$(
        impl From<$source> for ShedError {
            #[inline]
            fn from(source: $source) -> Self {
                Self::$variant { source, context: None }
            }
        }

        impl<T> ShedErrorExt<T> for Result<T, $source> {
            #[inline]
            fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShedError> {
                self.map_err(|source| ShedError::$variant { source, context: Some(context.into()) })
            }
        }
    )*};
}

source_conversions! {
    StorageError => Storage,
    serde_json::Error => Serialization,
    config::ConfigError => Config,
}

impl ShedError {
    pub(crate) const fn closed() -> Self {
        Self::Closed { context: None }
    }

    pub(crate) fn codec(source: impl Into<BoxError>) -> Self {
        Self::Codec { source: source.into(), context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

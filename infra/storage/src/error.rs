use std::borrow::Cow;

/// Errors raised by the [`Storage`](crate::Storage) engine.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found{}: {message}", format_context(.context))]
    FileNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Not a regular file{}: {message}", format_context(.context))]
    NotAFile { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Not a directory{}: {message}", format_context(.context))]
    NotADirectory { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },
}

/// Attaches a human readable context to a failed storage operation.
pub trait StorageErrorExt<T> {
    /// Sets (or overrides) the context of the error carried by `self`.
    ///
    /// # Errors
    /// Returns the original error converted into [`StorageError`] with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError>;
}

impl<T> StorageErrorExt<T> for Result<T, StorageError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                StorageError::FileNotFound { context: c, .. }
                | StorageError::NotAFile { context: c, .. }
                | StorageError::NotADirectory { context: c, .. }
                | StorageError::PathTraversalAttempt { context: c, .. }
                | StorageError::Io { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> StorageErrorExt<T> for Result<T, std::io::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::Io { source, context: Some(context.into()) })
    }
}

impl From<std::io::Error> for StorageError {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, context: None }
    }
}

impl StorageError {
    /// Returns `true` when the error means the target file is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

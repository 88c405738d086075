use crate::error::{ShedError, ShedErrorExt};
use config::{Config, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Prefix of environment overrides, e.g. `WHEEL__BASE_PATH=/var/lib/wheels`.
pub const ENV_PREFIX: &str = "WHEEL";

/// Settings for opening a shed. Missing keys fall back to [`ShedConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShedConfig {
    /// Base directory of the shed.
    pub base_path: PathBuf,
    /// Create the base directory when it is missing.
    pub create: bool,
    /// Flush writes to hardware before they become visible.
    pub sync: bool,
    /// Age in seconds after which orphaned temp files are purged on open.
    pub tmp_max_age_secs: u64,
}

impl Default for ShedConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./wheels"),
            create: true,
            sync: true,
            tmp_max_age_secs: wheel_storage::DEFAULT_TMP_MAX_AGE.as_secs(),
        }
    }
}

impl ShedConfig {
    #[must_use]
    pub const fn tmp_max_age(&self) -> Duration {
        Duration::from_secs(self.tmp_max_age_secs)
    }
}

/// Loads a configuration from an optional file overlaid with `WHEEL__`-prefixed
/// environment variables.
///
/// Nested keys use double underscores (`WHEEL__STORE__BASE_PATH` maps to
/// `store.base_path`). Without a file only the environment and the type's defaults
/// apply.
///
/// # Errors
/// Returns [`ShedError::Config`] if a given file is missing or unreadable, or if the
/// merged values do not match `T`.
///
/// # Example
/// ```rust
/// use wheel_shed::{ShedConfig, load_config};
///
/// let cfg: ShedConfig = load_config(None::<&str>).unwrap_or_default();
/// assert!(cfg.create);
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ShedError>
where
    T: DeserializeOwned,
{
    let mut builder = Config::builder();

    if let Some(path) = path {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading shed config");
        builder = builder.add_source(File::from(path).required(true));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX).separator("__").convert_case(config::Case::Snake),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_values_override_defaults() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("shed.toml");
        std::fs::write(&file, "base_path = \"/srv/wheels\"\nsync = false\n").unwrap();

        let cfg: ShedConfig = load_config(Some(&file)).unwrap();

        assert_eq!(cfg.base_path, PathBuf::from("/srv/wheels"));
        assert!(!cfg.sync);
        assert!(cfg.create);
        assert_eq!(cfg.tmp_max_age(), Duration::from_secs(300));
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = load_config::<ShedConfig>(Some(temp.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ShedError::Config { .. }), "unexpected error: {err:?}");
    }

    #[test]
    fn mistyped_value_is_an_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("shed.toml");
        std::fs::write(&file, "tmp_max_age_secs = \"soon\"\n").unwrap();

        assert!(load_config::<ShedConfig>(Some(&file)).is_err());
    }
}

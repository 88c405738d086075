//! Sandboxed file engine used by the wheel shed.
//!
//! It wraps a single root directory and offers whole-file reads, atomic writes and a
//! handful of lifecycle helpers (create-if-missing, delete, directory bootstrap). All
//! examples use temporary directories to avoid writing to the real filesystem.
//!
//! # Core Features
//!
//! - **Sandbox Security**: relative paths are normalized lexically and checked against the
//!   canonical root, including symlinked ancestors.
//! - **Atomic Writes**: unique temp file + optional `fsync` + `rename`, so a crash never
//!   leaves a truncated target behind.
//! - **Self-Healing**: temp files orphaned by a crash are purged when the engine connects.
//!
//! # Examples
//!
//! ```rust
//! use wheel_storage::{Storage, StorageError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     # let root = tmp.path().join("data");
//!     let storage = Storage::builder().root(&root).create(true).connect().await?;
//!
//!     assert!(storage.create_dir("objects").await?);
//!     assert!(storage.create_empty("objects/a1").await?);
//!     storage.write("objects/a1", b"important data").await?;
//!
//!     assert_eq!(storage.read("objects/a1").await?, b"important data");
//!     Ok(())
//! }
//! ```

mod builder;
mod engine;
mod error;
mod maintenance;
mod security;

pub use builder::{DEFAULT_TMP_MAX_AGE, Rooted, StorageBuilder, Unrooted};
pub use engine::Storage;
pub use error::{StorageError, StorageErrorExt};
pub use security::is_plain_file_name;

//! A local, file-backed object store.
//!
//! Each stored object (a [`Wheel`]) is one blob kept as one file under
//! `<base>/objects/<id>`. A pretty-printed JSON catalog at `<base>/.wheel-metadata.json`
//! records every wheel's name, content type, tags and timestamps. The [`Shed`] owns the
//! directory, the catalog and the live wheels.
//!
//! # Lifecycle
//!
//! [`ShedBuilder::open`] returns immediately and prepares the directory in the
//! background; [`Shed::ready`] resolves when the catalog has been loaded, or rejects with
//! the step that failed. [`ShedBuilder::connect`] does both. [`Shed::close`] flushes the
//! catalog and ends the shed's lifecycle.
//!
//! # Content types
//!
//! Wheels store bytes. [`Wheel::get_content_as`] and [`Wheel::set_content_as`] take a
//! [`Codec`] ([`PlainText`] or [`Json`]) matching the wheel's [`ContentType`]:
//!
//! ```rust
//! use wheel_shed::{ContentType, PlainText, Shed, ShedError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ShedError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let shed = Shed::builder().root(tmp.path()).sync(false).connect().await?;
//!
//!     let note = shed.create_wheel(ContentType::PlainText).await?;
//!     note.set_name("todo").await?;
//!     assert_eq!(note.get_content_as::<PlainText>("nothing yet".into()).await?, "nothing yet");
//!
//!     note.set_content_as::<PlainText>(&"water the plants".to_owned()).await?;
//!     assert_eq!(note.get_content().await?, b"water the plants");
//!     Ok(())
//! }
//! ```

mod builder;
mod catalog;
mod codec;
mod config;
mod error;
mod ids;
mod readiness;
mod record;
mod shed;
mod wheel;

pub use builder::{NoRoot, ShedBuilder, WithRoot};
pub use catalog::Catalog;
pub use codec::{Codec, Json, PlainText};
pub use config::{ENV_PREFIX, ShedConfig, load_config};
pub use error::{BoxError, ShedError, ShedErrorExt};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use readiness::{Readiness, Stage};
pub use record::{ContentType, DEFAULT_NAME, MetadataRecord, now_millis};
pub use shed::{METADATA_FILE, OBJECTS_DIR, Shed};
pub use wheel::Wheel;

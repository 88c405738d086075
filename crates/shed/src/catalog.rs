//! The metadata catalog: an ordered list of [`MetadataRecord`]s mirrored to one JSON file.
//!
//! Every [`Catalog::write`] rewrites the whole file through the storage engine's atomic
//! swap. A missing-but-readable file is an error; an empty or unparsable one is not:
//! it loads as an empty catalog so a corrupted index never bricks the shed.

use crate::error::{ShedError, ShedErrorExt};
use crate::record::MetadataRecord;
use crate::shed::ShedInner;
use crate::wheel::Wheel;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use tracing::{debug, warn};
use wheel_storage::{Storage, is_plain_file_name};

#[derive(Debug)]
pub struct Catalog {
    storage: Storage,
    file: PathBuf,
    records: Vec<MetadataRecord>,
}

impl Catalog {
    /// An empty catalog backed by `file` (relative to the storage root). Nothing is read
    /// until [`Catalog::load`].
    #[must_use]
    pub fn new(storage: Storage, file: impl Into<PathBuf>) -> Self {
        Self { storage, file: file.into(), records: Vec::new() }
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Replaces the in-memory records with the file's contents.
    ///
    /// Duplicate ids in the file collapse onto the last occurrence.
    ///
    /// # Errors
    /// Returns [`ShedError::Storage`] when the file cannot be read. Malformed content is
    /// not an error.
    pub async fn load(&mut self) -> Result<(), ShedError> {
        let bytes = self
            .storage
            .read(&self.file)
            .await
            .context(format!("Failed to read catalog {}", self.file.display()))?;

        self.records.clear();

        if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(file = %self.file.display(), "Catalog file is empty");
            return Ok(());
        }

        match serde_json::from_slice::<Vec<MetadataRecord>>(&bytes) {
            Ok(records) => {
                for record in records {
                    self.add(record);
                }
                debug!(file = %self.file.display(), records = self.records.len(), "Catalog loaded");
            },
            Err(e) => {
                warn!(
                    file = %self.file.display(),
                    error = %e,
                    "Catalog is corrupt, starting from an empty catalog"
                );
            },
        }

        Ok(())
    }

    /// Persists the full record list, pretty-printed, replacing the file atomically.
    ///
    /// # Errors
    /// Returns [`ShedError::Serialization`] or [`ShedError::Storage`] on failure.
    pub async fn write(&self) -> Result<(), ShedError> {
        let bytes = serde_json::to_vec_pretty(&self.records).context("Failed to encode catalog")?;
        self.storage
            .write(&self.file, &bytes)
            .await
            .context(format!("Failed to write catalog {}", self.file.display()))?;
        debug!(file = %self.file.display(), records = self.records.len(), "Catalog written");
        Ok(())
    }

    /// Inserts `record`, replacing (in place) any record with the same id.
    /// Returns the replaced record, if any.
    pub fn add(&mut self, record: MetadataRecord) -> Option<MetadataRecord> {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => Some(std::mem::replace(existing, record)),
            None => {
                self.records.push(record);
                None
            },
        }
    }

    /// Removes exactly the record with `id`, keeping the order of the rest.
    pub fn remove_by_id(&mut self, id: &str) -> Option<MetadataRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&MetadataRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overlays records taken from live wheels; they win over whatever is stored.
    pub(crate) fn sync_from(&mut self, live: impl IntoIterator<Item = MetadataRecord>) {
        for record in live {
            self.add(record);
        }
    }

    /// Builds live wheels for every record, keeping ids, timestamps and content types.
    ///
    /// Records whose id could not be a file name inside the objects directory are kept
    /// in the catalog but not brought to life.
    pub(crate) fn reconstruct(&self, shed: &Weak<ShedInner>) -> Vec<Wheel> {
        self.records
            .iter()
            .filter(|record| {
                let usable = is_plain_file_name(&record.id);
                if !usable {
                    warn!(id = %record.id, "Skipping catalog record with an unusable id");
                }
                usable
            })
            .map(|record| Wheel::restore(shed.clone(), self.storage.clone(), record.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ContentType;
    use proptest::prelude::*;
    use tempfile::TempDir;

    async fn catalog(temp: &TempDir, content: &[u8]) -> Catalog {
        let storage = Storage::builder().root(temp.path()).sync(false).connect().await.unwrap();
        storage.write("meta.json", content).await.unwrap();
        Catalog::new(storage, "meta.json")
    }

    fn record(id: &str, name: &str) -> MetadataRecord {
        let mut record = MetadataRecord::new(id, ContentType::PlainText, 1);
        record.name = name.to_owned();
        record
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty_and_stays_writable() {
        let temp = TempDir::new().unwrap();
        let mut catalog = catalog(&temp, b"[{ this is not json").await;
        catalog.add(record("stale", "stale"));

        catalog.load().await.unwrap();
        assert!(catalog.is_empty());

        catalog.add(record("a", "first"));
        catalog.write().await.unwrap();
        catalog.load().await.unwrap();
        assert_eq!(catalog.records(), &[record("a", "first")]);
    }

    #[tokio::test]
    async fn empty_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let mut catalog = catalog(&temp, b"").await;
        catalog.load().await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::builder().root(temp.path()).connect().await.unwrap();
        let mut catalog = Catalog::new(storage, "absent.json");

        let err = catalog.load().await.unwrap_err();
        assert!(matches!(err, ShedError::Storage { .. }), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn written_file_is_a_pretty_json_array() {
        let temp = TempDir::new().unwrap();
        let mut catalog = catalog(&temp, b"").await;
        catalog.add(record("a", "first"));
        catalog.write().await.unwrap();

        let text = std::fs::read_to_string(temp.path().join("meta.json")).unwrap();
        assert!(text.starts_with("[\n"), "expected pretty output, got {text}");
        let parsed: Vec<MetadataRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![record("a", "first")]);
    }

    #[tokio::test]
    async fn duplicate_ids_collapse_on_load() {
        let temp = TempDir::new().unwrap();
        let content = serde_json::to_vec(&[record("a", "old"), record("b", "b"), record("a", "new")])
            .unwrap();
        let mut catalog = catalog(&temp, &content).await;

        catalog.load().await.unwrap();

        assert_eq!(catalog.records(), &[record("a", "new"), record("b", "b")]);
    }

    #[tokio::test]
    async fn remove_by_id_keeps_following_records() {
        let temp = TempDir::new().unwrap();
        let mut catalog = catalog(&temp, b"").await;
        for id in ["a", "b", "c", "d"] {
            catalog.add(record(id, id));
        }

        let removed = catalog.remove_by_id("b").unwrap();

        assert_eq!(removed.id, "b");
        let ids: Vec<&str> = catalog.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "d"]);
        assert!(catalog.remove_by_id("b").is_none());
    }

    proptest! {
        #[test]
        fn ids_stay_unique_and_last_add_wins(
            ops in prop::collection::vec((0u8..6, "[a-z]{1,6}"), 0..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let temp = TempDir::new().unwrap();
            let mut catalog = rt.block_on(catalog(&temp, b""));
            let mut expected = std::collections::HashMap::new();

            for (id, name) in &ops {
                let id = format!("id-{id}");
                catalog.add(record(&id, name));
                expected.insert(id, name.clone());
            }

            prop_assert_eq!(catalog.len(), expected.len());
            for (id, name) in &expected {
                prop_assert_eq!(&catalog.find_by_id(id).unwrap().name, name);
            }
        }
    }
}

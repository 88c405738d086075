use serde::{Deserialize, Serialize};
use std::fmt;

/// Name given to wheels that were never renamed.
pub const DEFAULT_NAME: &str = "New Object";

/// How a wheel's bytes are meant to be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    PlainText,
    #[serde(rename = "JSON")]
    Json,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PlainText => "PlainText",
            Self::Json => "JSON",
        })
    }
}

/// One catalog entry, persisted as an element of the metadata JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created: i64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub modified: i64,
    pub name: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MetadataRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, content_type: ContentType, now: i64) -> Self {
        Self {
            id: id.into(),
            created: now,
            modified: now,
            name: DEFAULT_NAME.to_owned(),
            content_type,
            tags: Vec::new(),
        }
    }

    /// Bumps `modified`, never moving it backwards.
    pub fn touch(&mut self, now: i64) {
        self.modified = self.modified.max(now);
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_catalog_field_names() {
        let mut record = MetadataRecord::new("a1", ContentType::Json, 1_000);
        record.tags.push("daily".to_owned());

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "id": "a1",
                "created": 1000,
                "modified": 1000,
                "name": "New Object",
                "contentType": "JSON",
                "tags": ["daily"]
            })
        );
    }

    #[test]
    fn missing_optional_fields_default() {
        let record: MetadataRecord =
            serde_json::from_str(r#"{"id":"x","created":1,"modified":2,"name":"n"}"#).unwrap();

        assert_eq!(record.content_type, ContentType::PlainText);
        assert!(record.tags.is_empty());
    }

    #[test]
    fn touch_is_monotonic() {
        let mut record = MetadataRecord::new("a1", ContentType::PlainText, 500);
        record.touch(400);
        assert_eq!(record.modified, 500);
        record.touch(900);
        assert_eq!(record.modified, 900);
        assert_eq!(record.created, 500);
    }
}

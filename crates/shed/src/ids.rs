use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh wheel ids. Ids become file names, so implementations must return
/// plain, separator-free strings that are unique within a shed.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs in hyphenated form. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `<prefix>-1`, `<prefix>-2`, ... for reproducible tests.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: Cow<'static, str>,
    counter: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(prefix: impl Into<Cow<'static, str>>) -> Self {
        Self { prefix: prefix.into(), counter: AtomicU64::new(1) }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheel_storage::is_plain_file_name;

    #[test]
    fn uuids_are_plain_file_names() {
        let id = UuidGenerator.next_id();
        assert!(is_plain_file_name(&id));
        assert_ne!(id, UuidGenerator.next_id());
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new("wheel");
        assert_eq!(ids.next_id(), "wheel-1");
        assert_eq!(ids.next_id(), "wheel-2");
    }
}

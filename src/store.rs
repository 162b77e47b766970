//! Document store seam for ledger records.
//!
//! A store holds one document per [`LedgerKey`]. Writes are conditional on the
//! version the writer last read, which is what lets the ledger detect and retry
//! lost updates instead of silently overwriting a concurrent append.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{LedgerKey, LedgerRecord};

pub trait DocumentStore {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, StoreError>;

    /// Writes `record` if the stored version is still `expected`.
    ///
    /// `expected == None` means the key must not exist yet. A mismatch is
    /// reported as [`StoreError::Conflict`] and nothing is written.
    fn put(&self, record: &LedgerRecord, expected: Option<u64>) -> Result<(), StoreError>;

    /// Returns false when there was nothing to delete.
    fn delete(&self, key: &LedgerKey) -> Result<bool, StoreError>;

    /// All records ordered by key.
    fn list_all(&self) -> Result<Vec<LedgerRecord>, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, StoreError> {
        (**self).get(key)
    }
    fn put(&self, record: &LedgerRecord, expected: Option<u64>) -> Result<(), StoreError> {
        (**self).put(record, expected)
    }
    fn delete(&self, key: &LedgerKey) -> Result<bool, StoreError> {
        (**self).delete(key)
    }
    fn list_all(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        (**self).list_all()
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, StoreError> {
        (**self).get(key)
    }
    fn put(&self, record: &LedgerRecord, expected: Option<u64>) -> Result<(), StoreError> {
        (**self).put(record, expected)
    }
    fn delete(&self, key: &LedgerKey) -> Result<bool, StoreError> {
        (**self).delete(key)
    }
    fn list_all(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        (**self).list_all()
    }
}

/// In-process store. Safe to share between threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<LedgerKey, LedgerRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<LedgerKey, LedgerRecord>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, record: &LedgerRecord, expected: Option<u64>) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        let found = docs.get(&record.key).map(|r| r.version);
        if found != expected {
            return Err(StoreError::Conflict {
                key: record.key.clone(),
                expected,
                found,
            });
        }
        docs.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &LedgerKey) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn list_all(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterMeta, EntryKind, ProgressEntry};
    use chrono::Utc;

    fn record(chapter: &str) -> LedgerRecord {
        let entry = ProgressEntry {
            faculty_name: "A".to_string(),
            faculty_code: None,
            subject: None,
            content_taught: "intro".to_string(),
            kind: EntryKind::Regular,
            substitute: None,
            submitted_at: Utc::now(),
        };
        LedgerRecord::create(
            LedgerKey::new(chapter, "CSE").expect("key"),
            &ChapterMeta::default(),
            entry,
            Utc::now(),
        )
    }

    #[test]
    fn create_requires_absent_key() {
        let store = MemoryDocumentStore::new();
        let rec = record("Optics");
        store.put(&rec, None).expect("create");
        let err = store.put(&rec, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: None,
                found: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn update_requires_matching_version() {
        let store = MemoryDocumentStore::new();
        let rec = record("Optics");
        store.put(&rec, None).expect("create");

        let mut next = rec.clone();
        next.version = 2;
        assert!(store.put(&next, Some(7)).is_err());
        store.put(&next, Some(1)).expect("update");
        assert_eq!(store.get(&rec.key).expect("get").map(|r| r.version), Some(2));
    }

    #[test]
    fn list_is_ordered_and_delete_reports_presence() {
        let store = MemoryDocumentStore::new();
        store.put(&record("Waves"), None).expect("waves");
        store.put(&record("Optics"), None).expect("optics");
        let chapters: Vec<String> = store
            .list_all()
            .expect("list")
            .into_iter()
            .map(|r| r.key.chapter_id)
            .collect();
        assert_eq!(chapters, vec!["Optics", "Waves"]);

        let key = LedgerKey::new("Optics", "CSE").expect("key");
        assert!(store.delete(&key).expect("delete"));
        assert!(!store.delete(&key).expect("delete again"));
    }
}

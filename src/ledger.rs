//! The progress ledger: one append-only record per (chapter, branch).
//!
//! Appends are read-modify-write cycles against a [`DocumentStore`]. Each
//! cycle reads the record and its version, builds the next record, and writes
//! it back only if the version is unchanged. A writer that loses the race
//! re-reads and tries again, so concurrent appends to one key are serialized
//! by the store rather than overwriting each other.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classify::{classify, Classification};
use crate::directory::{AssignmentDirectory, RequirementTable};
use crate::error::{FailedDelete, LedgerError, StoreError};
use crate::model::{ChapterMeta, LedgerKey, LedgerRecord, ProgressEntry, Submission};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number between retries.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(2),
        }
    }
}

/// Record filter for bulk deletion. `None` (or blank) fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteFilter {
    pub faculty: Option<String>,
    pub chapter: Option<String>,
    pub branch: Option<String>,
}

fn filter_value(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DeleteFilter {
    pub fn is_empty(&self) -> bool {
        filter_value(&self.faculty).is_none()
            && filter_value(&self.chapter).is_none()
            && filter_value(&self.branch).is_none()
    }

    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if let Some(f) = filter_value(&self.faculty) {
            if !record.faculties.iter().any(|name| name == f) {
                return false;
            }
        }
        if let Some(c) = filter_value(&self.chapter) {
            if record.key.chapter_id != c {
                return false;
            }
        }
        if let Some(b) = filter_value(&self.branch) {
            if record.key.branch_id != b {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDelete {
    pub deleted: usize,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Submitted {
    pub record: LedgerRecord,
    pub classification: Classification,
}

/// The two ways a commit lands: a brand new record or the next version of one.
enum Upsert {
    Create(LedgerRecord),
    Update { expected: u64, next: LedgerRecord },
}

impl Upsert {
    fn record(&self) -> &LedgerRecord {
        match self {
            Upsert::Create(r) => r,
            Upsert::Update { next, .. } => next,
        }
    }

    fn expected(&self) -> Option<u64> {
        match self {
            Upsert::Create(_) => None,
            Upsert::Update { expected, .. } => Some(*expected),
        }
    }

    fn into_record(self) -> LedgerRecord {
        match self {
            Upsert::Create(r) => r,
            Upsert::Update { next, .. } => next,
        }
    }
}

pub struct Ledger<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: DocumentStore> Ledger<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Appends an already-tagged entry. `submitted_at` is stamped at append time.
    pub fn append(
        &self,
        key: &LedgerKey,
        meta: &ChapterMeta,
        entry: ProgressEntry,
    ) -> Result<LedgerRecord, LedgerError> {
        entry.validate()?;
        let (record, ()) = self.commit(key, meta, |_, now| {
            let mut entry = entry.clone();
            entry.submitted_at = now;
            Ok((entry, ()))
        })?;
        Ok(record)
    }

    /// Classifies and appends in one cycle.
    ///
    /// Classification is redone on every attempt against the history that
    /// attempt read, so the stored tags always agree with the stored order. If a
    /// lost race turns the submission into an OVERSHOOT or SUBSTITUTE and the
    /// matching remark was not supplied, the submission is rejected.
    pub fn submit<R, D>(
        &self,
        key: &LedgerKey,
        submission: &Submission,
        requirements: &R,
        directory: &D,
    ) -> Result<Submitted, LedgerError>
    where
        R: RequirementTable + ?Sized,
        D: AssignmentDirectory + ?Sized,
    {
        submission.validate_basic()?;
        let meta = ChapterMeta {
            subject: submission
                .subject
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            required_lecture_count: requirements.required_lecture_count(&key.chapter_id),
        };
        let faculty = submission.faculty_name.trim();

        let (record, classification) = self.commit(key, &meta, |history, now| {
            let classification = classify(key, faculty, history, requirements, directory);
            let entry = submission.clone().into_entry(&classification.tags, now)?;
            Ok((entry, classification))
        })?;
        Ok(Submitted {
            record,
            classification,
        })
    }

    /// Classification for the next submission by `faculty`, from stored history.
    pub fn preview<R, D>(
        &self,
        key: &LedgerKey,
        faculty: &str,
        requirements: &R,
        directory: &D,
    ) -> Result<Classification, LedgerError>
    where
        R: RequirementTable + ?Sized,
        D: AssignmentDirectory + ?Sized,
    {
        let current = self.store.get(key)?;
        let history = current.as_ref().map(|r| r.entries.as_slice()).unwrap_or(&[]);
        Ok(classify(key, faculty.trim(), history, requirements, directory))
    }

    fn commit<F, T>(
        &self,
        key: &LedgerKey,
        meta: &ChapterMeta,
        mut next_entry: F,
    ) -> Result<(LedgerRecord, T), LedgerError>
    where
        F: FnMut(&[ProgressEntry], DateTime<Utc>) -> Result<(ProgressEntry, T), LedgerError>,
    {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            let current = self.store.get(key)?;
            let now = Utc::now();
            let history = current.as_ref().map(|r| r.entries.as_slice()).unwrap_or(&[]);
            let (entry, extra) = next_entry(history, now)?;

            let upsert = match current {
                None => Upsert::Create(LedgerRecord::create(key.clone(), meta, entry, now)),
                Some(record) => Upsert::Update {
                    expected: record.version,
                    next: record.appended(entry, now),
                },
            };

            match self.store.put(upsert.record(), upsert.expected()) {
                Ok(()) => {
                    let record = upsert.into_record();
                    debug!(
                        key = %key,
                        version = record.version,
                        lectures = record.lecture_number(),
                        attempt,
                        "progress entry appended"
                    );
                    return Ok((record, extra));
                }
                Err(StoreError::Conflict {
                    expected, found, ..
                }) => {
                    warn!(key = %key, attempt, ?expected, ?found, "append lost a race, retrying");
                    if attempt < attempts && !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff * attempt);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::ConcurrencyConflict {
            key: key.clone(),
            attempts,
        })
    }

    pub fn get_by_key(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.store.get(key)?)
    }

    pub fn get_required(&self, key: &LedgerKey) -> Result<LedgerRecord, LedgerError> {
        self.get_by_key(key)?
            .ok_or_else(|| LedgerError::NotFound(key.clone()))
    }

    pub fn list_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.store.list_all()?)
    }

    /// Removes every record matching `filter`; an empty filter removes everything.
    pub fn delete_by_filter(&self, filter: &DeleteFilter) -> Result<usize, LedgerError> {
        let targets: Vec<LedgerKey> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .map(|r| r.key)
            .collect();
        let deleted = self.delete_keys(&targets)?;
        info!(?filter, deleted, "progress records deleted by filter");
        Ok(deleted)
    }

    pub fn truncate_all(&self) -> Result<usize, LedgerError> {
        self.delete_by_filter(&DeleteFilter::default())
    }

    /// Idempotent: deleting an absent key returns false.
    pub fn delete_by_key(&self, key: &LedgerKey) -> Result<bool, LedgerError> {
        let removed = self.store.delete(key)?;
        if removed {
            info!(key = %key, "progress record deleted");
        }
        Ok(removed)
    }

    /// Deletes the records with the given record ids; unknown ids are reported back.
    pub fn delete_selected(&self, record_ids: &[String]) -> Result<BatchDelete, LedgerError> {
        let wanted: HashSet<&str> = record_ids.iter().map(String::as_str).collect();
        let records = self.store.list_all()?;

        let mut keys = Vec::new();
        let mut found: HashSet<&str> = HashSet::new();
        for r in &records {
            if wanted.contains(r.record_id.as_str()) {
                keys.push(r.key.clone());
                found.insert(r.record_id.as_str());
            }
        }
        let not_found: Vec<String> = record_ids
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect();

        let deleted = self.delete_keys(&keys)?;
        info!(deleted, missing = not_found.len(), "selected progress records deleted");
        Ok(BatchDelete { deleted, not_found })
    }

    /// Each delete stands alone; failures are collected, never swallowed.
    fn delete_keys(&self, keys: &[LedgerKey]) -> Result<usize, LedgerError> {
        let mut deleted = 0;
        let mut failed = Vec::new();
        for key in keys {
            match self.store.delete(key) {
                Ok(true) => deleted += 1,
                Ok(false) => debug!(key = %key, "record already gone"),
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to delete progress record");
                    failed.push(FailedDelete {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        if failed.is_empty() {
            Ok(deleted)
        } else {
            Err(LedgerError::PartialDelete { deleted, failed })
        }
    }
}

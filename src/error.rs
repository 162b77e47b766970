use serde::Serialize;
use serde_json::json;

use crate::model::LedgerKey;

/// A single record that a batch delete could not remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelete {
    pub key: LedgerKey,
    pub reason: String,
}

/// Errors surfaced by the document store seam.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The conditional put found a different version than the caller read.
    #[error("version conflict on {key}: expected {expected:?}, found {found:?}")]
    Conflict {
        key: LedgerKey,
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("{0}")]
    Unavailable(String),
    #[error("record {key} could not be decoded: {message}")]
    Corrupt { key: LedgerKey, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("no progress record for {0}")]
    NotFound(LedgerKey),
    #[error("append to {key} kept conflicting after {attempts} attempts")]
    ConcurrencyConflict { key: LedgerKey, attempts: u32 },
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("stored record {key} is unreadable: {message}")]
    Corrupt { key: LedgerKey, message: String },
    #[error("deleted {deleted} records but {} failed", .failed.len())]
    PartialDelete {
        deleted: usize,
        failed: Vec<FailedDelete>,
    },
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable error code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "validation",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::ConcurrencyConflict { .. } => "conflict",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
            LedgerError::Corrupt { .. } => "store_unavailable",
            LedgerError::PartialDelete { .. } => "partial_delete",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            LedgerError::Validation { field, .. } => Some(json!({ "field": field })),
            LedgerError::NotFound(key) => Some(json!({ "key": key })),
            LedgerError::ConcurrencyConflict { key, attempts } => {
                Some(json!({ "key": key, "attempts": attempts }))
            }
            LedgerError::Corrupt { key, .. } => Some(json!({ "key": key })),
            LedgerError::PartialDelete { deleted, failed } => {
                Some(json!({ "deleted": deleted, "failed": failed }))
            }
            LedgerError::StoreUnavailable(_) => None,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { key, .. } => LedgerError::ConcurrencyConflict { key, attempts: 1 },
            StoreError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
            StoreError::Corrupt { key, message } => LedgerError::Corrupt { key, message },
        }
    }
}

//! Lecture progress ledger.
//!
//! Tracks, for every chapter taught at a branch, the lectures delivered so far
//! and who delivered them. Each submission is tagged REGULAR or OVERSHOOT
//! against the chapter's required lecture count, plus SUBSTITUTE when the
//! teaching faculty changed hands or is not assigned to the slot. All
//! submissions for a (chapter, branch) accumulate in one append-only record.

pub mod classify;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod ipc;
pub mod ledger;
pub mod model;
pub mod query;
pub mod store;

pub use error::{LedgerError, StoreError};
pub use ledger::{DeleteFilter, Ledger, RetryPolicy};
pub use model::{LedgerKey, LedgerRecord, ProgressEntry, StatusTag, Submission};

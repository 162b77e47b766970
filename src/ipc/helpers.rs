use rusqlite::Connection;
use serde_json::json;

use crate::db::SqliteDocumentStore;
use crate::ipc::error::{err, ledger_err};
use crate::ipc::types::{AppState, Request};
use crate::ledger::Ledger;
use crate::model::{LedgerKey, LedgerRecord, ProgressEntry};
use crate::query;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn ledger<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<Ledger<SqliteDocumentStore<'a>>, serde_json::Value> {
    let conn = db_conn(state, req)?;
    Ok(Ledger::new(
        SqliteDocumentStore::new(conn),
        state.config.retry_policy(),
    ))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent, null and blank all read as `None`.
pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| {
                    err(
                        &req.id,
                        "bad_params",
                        format!("{} must be string or null", key),
                        None,
                    )
                })?
                .trim()
                .to_string();
            Ok(if s.is_empty() { None } else { Some(s) })
        }
    }
}

pub fn key_param(req: &Request) -> Result<LedgerKey, serde_json::Value> {
    let chapter = required_str(req, "chapterId")?;
    let branch = required_str(req, "branchId")?;
    LedgerKey::new(&chapter, &branch).map_err(|e| ledger_err(&req.id, &e))
}

pub fn entry_json(entry: &ProgressEntry) -> serde_json::Value {
    json!({
        "facultyName": entry.faculty_name,
        "facultyCode": entry.faculty_code,
        "subject": entry.subject,
        "contentTaught": entry.content_taught,
        "statusTags": entry.status_tags(),
        "overshootRemark": entry.overshoot_remark(),
        "substituteRemark": entry.substitute_remark(),
        "submittedAt": entry.submitted_at,
    })
}

pub fn record_json(record: &LedgerRecord) -> serde_json::Value {
    json!({
        "recordId": record.record_id,
        "label": record.key.to_string(),
        "chapterId": record.key.chapter_id,
        "branchId": record.key.branch_id,
        "subject": record.subject,
        "requiredLectureCount": record.required_lecture_count,
        "lectureNumber": record.lecture_number(),
        "faculties": record.faculties,
        "statusTags": record.derived_status_tags,
        "latestSubmission": query::latest_submission_date(record),
        "version": record.version,
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
        "entries": record.entries.iter().map(entry_json).collect::<Vec<_>>(),
    })
}

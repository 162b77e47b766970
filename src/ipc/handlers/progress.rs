use crate::directory::Directory;
use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::helpers::{db_conn, entry_json, key_param, ledger, opt_str, record_json, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Submission;
use crate::query;
use serde_json::json;
use tracing::info;

fn load_directory(state: &AppState, req: &Request) -> Result<Directory, serde_json::Value> {
    let conn = db_conn(state, req)?;
    Directory::load(conn).map_err(|e| err(&req.id, "store_unavailable", e.to_string(), None))
}

fn handle_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match key_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let faculty = match required_str(req, "faculty") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dir = match load_directory(state, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };

    match ledger.preview(&key, &faculty, &dir, &dir) {
        Ok(c) => ok(
            &req.id,
            json!({
                "statusTags": c.tags,
                "completed": c.completed,
                "required": c.required,
                "nextLectureNumber": c.next_lecture_number(),
                "substitute": c.substitute,
                "requiresOvershootRemark": c.requires_overshoot_remark(),
                "requiresSubstituteRemark": c.requires_substitute_remark(),
            }),
        ),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match key_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let submission = match parse_submission(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let dir = match load_directory(state, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };

    match ledger.submit(&key, &submission, &dir, &dir) {
        Ok(out) => {
            info!(
                key = %key,
                faculty = %submission.faculty_name,
                lecture = out.record.lecture_number(),
                tags = ?out.classification.tags,
                "lecture progress submitted"
            );
            ok(
                &req.id,
                json!({
                    "statusTags": out.classification.tags,
                    "record": record_json(&out.record),
                }),
            )
        }
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn parse_submission(req: &Request) -> Result<Submission, serde_json::Value> {
    let faculty_name = required_str(req, "faculty")?;
    Ok(Submission {
        faculty_name,
        faculty_code: opt_str(req, "facultyCode")?,
        subject: opt_str(req, "subject")?,
        content_taught: opt_str(req, "contentTaught")?.unwrap_or_default(),
        overshoot_remark: opt_str(req, "overshootRemark")?,
        substitute_remark: opt_str(req, "substituteRemark")?,
    })
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match key_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.get_required(&key) {
        Ok(record) => ok(&req.id, json!({ "record": record_json(&record) })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match key_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.get_by_key(&key) {
        Ok(Some(record)) => {
            let entries: Vec<serde_json::Value> =
                query::history(&record).into_iter().map(entry_json).collect();
            ok(&req.id, json!({ "entries": entries }))
        }
        Ok(None) => ok(&req.id, json!({ "entries": [] })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.list_all() {
        Ok(records) => ok(
            &req.id,
            json!({ "records": records.iter().map(record_json).collect::<Vec<_>>() }),
        ),
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.preview" => Some(handle_preview(state, req)),
        "progress.submit" => Some(handle_submit(state, req)),
        "progress.get" => Some(handle_get(state, req)),
        "progress.history" => Some(handle_history(state, req)),
        "progress.list" => Some(handle_list(state, req)),
        _ => None,
    }
}

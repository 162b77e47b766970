use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::helpers::{key_param, ledger, opt_str};
use crate::ipc::types::{AppState, Request};
use crate::ledger::DeleteFilter;
use serde_json::json;

fn handle_delete_by_filter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filter = match (
        opt_str(req, "faculty"),
        opt_str(req, "chapterId"),
        opt_str(req, "branchId"),
    ) {
        (Ok(faculty), Ok(chapter), Ok(branch)) => DeleteFilter {
            faculty,
            chapter,
            branch,
        },
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.delete_by_filter(&filter) {
        Ok(deleted) => ok(
            &req.id,
            json!({ "deleted": deleted, "filtered": !filter.is_empty() }),
        ),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_delete_by_key(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match key_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.delete_by_key(&key) {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_delete_selected(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ids) = req.params.get("recordIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing recordIds", None);
    };
    let mut record_ids = Vec::with_capacity(ids.len());
    for v in ids {
        match v.as_str() {
            Some(s) if !s.trim().is_empty() => record_ids.push(s.trim().to_string()),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "recordIds must be non-empty strings",
                    None,
                )
            }
        }
    }

    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.delete_selected(&record_ids) {
        Ok(out) => ok(&req.id, json!(out)),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_truncate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.truncate_all() {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "maintenance.deleteByFilter" => Some(handle_delete_by_filter(state, req)),
        "maintenance.deleteByKey" => Some(handle_delete_by_key(state, req)),
        "maintenance.deleteSelected" => Some(handle_delete_selected(state, req)),
        "maintenance.truncate" => Some(handle_truncate(state, req)),
        _ => None,
    }
}

use crate::error::LedgerError;
use crate::ipc::error::{ledger_err, ok};
use crate::ipc::helpers::{ledger, opt_str, record_json};
use crate::ipc::types::{AppState, Request};
use crate::model::StatusTag;
use crate::query::{self, AnalysisQuery, SortOrder};
use serde_json::json;

fn parse_query(req: &Request) -> Result<AnalysisQuery, serde_json::Value> {
    let search = opt_str(req, "search")?.unwrap_or_default();
    // "ALL" is what the filter picker sends when no tag is selected.
    let tag = match opt_str(req, "tag")? {
        None => None,
        Some(t) if t.eq_ignore_ascii_case("ALL") => None,
        Some(t) => Some(
            t.parse::<StatusTag>()
                .map_err(|e: LedgerError| ledger_err(&req.id, &e))?,
        ),
    };
    let order = match opt_str(req, "sort")? {
        None => SortOrder::default(),
        Some(s) => s
            .parse::<SortOrder>()
            .map_err(|e: LedgerError| ledger_err(&req.id, &e))?,
    };
    Ok(AnalysisQuery { search, tag, order })
}

fn handle_query(state: &mut AppState, req: &Request) -> serde_json::Value {
    let q = match parse_query(req) {
        Ok(q) => q,
        Err(e) => return e,
    };
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    let records = match ledger.list_all() {
        Ok(r) => r,
        Err(e) => return ledger_err(&req.id, &e),
    };

    let out = query::analyze(records, &q);
    ok(
        &req.id,
        json!({
            "shown": out.records.len(),
            "total": out.total,
            "availableTags": out.available_tags,
            "records": out.records.iter().map(record_json).collect::<Vec<_>>(),
        }),
    )
}

fn handle_faculty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ledger = match ledger(state, req) {
        Ok(l) => l,
        Err(e) => return e,
    };
    match ledger.list_all() {
        Ok(records) => ok(
            &req.id,
            json!({ "faculties": query::group_by_faculty(&records) }),
        ),
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analysis.query" => Some(handle_query(state, req)),
        "analysis.faculty" => Some(handle_faculty(state, req)),
        _ => None,
    }
}

use crate::directory::{self, Directory, RequirementTable};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn store_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "store_unavailable", e.to_string(), None)
}

fn handle_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (faculty, chapter, branch) = match (
        required_str(req, "faculty"),
        required_str(req, "chapterId"),
        required_str(req, "branchId"),
    ) {
        (Ok(f), Ok(c), Ok(b)) => (f, c, b),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
    };

    let res = if req.method == "directory.assign" {
        directory::assign(conn, &faculty, &chapter, &branch)
    } else {
        directory::unassign(conn, &faculty, &chapter, &branch)
    };
    match res {
        Ok(changed) => ok(&req.id, json!({ "changed": changed })),
        Err(e) => store_err(req, e),
    }
}

fn handle_set_requirement(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let chapter = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Counts arrive from spreadsheets as text or numbers; keep the raw value.
    let raw = match req.params.get("required") {
        Some(v) if v.is_string() => v.as_str().unwrap_or_default().to_string(),
        Some(v) if v.is_number() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing required", None),
    };

    if let Err(e) = directory::set_requirement(conn, &chapter, &raw) {
        return store_err(req, e);
    }
    ok(
        &req.id,
        json!({ "requiredLectureCount": directory::parse_required_count(&raw) }),
    )
}

fn handle_chapters(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty = match required_str(req, "faculty") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dir = match Directory::load(conn) {
        Ok(d) => d,
        Err(e) => return store_err(req, e),
    };
    let chapters: Vec<serde_json::Value> = dir
        .chapters_for(&faculty)
        .into_iter()
        .map(|c| {
            json!({
                "chapterId": c,
                "requiredLectureCount": dir.required_lecture_count(&c),
            })
        })
        .collect();
    ok(&req.id, json!({ "chapters": chapters }))
}

fn handle_branches(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (faculty, chapter) = match (required_str(req, "faculty"), required_str(req, "chapterId")) {
        (Ok(f), Ok(c)) => (f, c),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    match Directory::load(conn) {
        Ok(dir) => ok(
            &req.id,
            json!({ "branches": dir.branches_for(&faculty, &chapter) }),
        ),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "directory.assign" | "directory.unassign" => Some(handle_assign(state, req)),
        "directory.setRequirement" => Some(handle_set_requirement(state, req)),
        "directory.chapters" => Some(handle_chapters(state, req)),
        "directory.branches" => Some(handle_branches(state, req)),
        _ => None,
    }
}

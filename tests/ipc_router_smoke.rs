use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lectured");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("LECTURED_WORKSPACE")
        .spawn()
        .expect("spawn lectured");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("lectured-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let key = json!({ "chapterId": "Optics", "branchId": "CSE" });
    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("health", json!({})),
        (
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        ),
        (
            "directory.assign",
            json!({ "faculty": "A", "chapterId": "Optics", "branchId": "CSE" }),
        ),
        (
            "directory.setRequirement",
            json!({ "chapterId": "Optics", "required": "4" }),
        ),
        ("directory.chapters", json!({ "faculty": "A" })),
        (
            "directory.branches",
            json!({ "faculty": "A", "chapterId": "Optics" }),
        ),
        (
            "progress.preview",
            json!({ "chapterId": "Optics", "branchId": "CSE", "faculty": "A" }),
        ),
        (
            "progress.submit",
            json!({ "chapterId": "Optics", "branchId": "CSE", "faculty": "A", "contentTaught": "Mirrors" }),
        ),
        ("progress.get", key.clone()),
        ("progress.history", key.clone()),
        ("progress.list", json!({})),
        ("analysis.query", json!({ "search": "optics", "sort": "oldest" })),
        ("analysis.faculty", json!({})),
        (
            "directory.unassign",
            json!({ "faculty": "A", "chapterId": "Optics", "branchId": "CSE" }),
        ),
        ("maintenance.deleteSelected", json!({ "recordIds": ["nope"] })),
        ("maintenance.deleteByFilter", json!({ "branchId": "ECE" })),
        ("maintenance.deleteByKey", key),
        ("maintenance.truncate", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &i.to_string(), method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_lines_do_not_stop_the_loop() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(value["error"]["code"], "bad_json");

    let resp = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(resp["ok"], true);

    drop(stdin);
    let _ = child.wait();
}

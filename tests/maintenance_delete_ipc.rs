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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: usize,
}

impl Sidecar {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            _child: child,
            stdin,
            reader,
            seq: 0,
        };
        s.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        s
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        self.seq.to_string()
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn submit(&mut self, chapter: &str, branch: &str, faculty: &str) -> serde_json::Value {
        self.ok(
            "progress.submit",
            json!({
                "chapterId": chapter,
                "branchId": branch,
                "faculty": faculty,
                "contentTaught": format!("{} in {}", chapter, branch),
                "overshootRemark": "over",
                "substituteRemark": "cover",
            }),
        )
    }

    fn labels(&mut self) -> Vec<String> {
        let list = self.ok("progress.list", json!({}));
        list["records"]
            .as_array()
            .expect("records")
            .iter()
            .map(|r| r["label"].as_str().expect("label").to_string())
            .collect()
    }
}

#[test]
fn delete_by_chapter_filter_keeps_other_chapters() {
    let mut s = Sidecar::open("lectured-delete-chapter");
    s.submit("chapterA", "branchX", "A");
    s.submit("chapterA", "branchY", "A");
    s.submit("chapterB", "branchX", "A");

    let out = s.ok(
        "maintenance.deleteByFilter",
        json!({ "chapterId": "chapterA", "faculty": null, "branchId": "" }),
    );
    assert_eq!(out["deleted"], 2);
    assert_eq!(out["filtered"], true);
    assert_eq!(s.labels(), vec!["chapterB - branchX".to_string()]);
}

#[test]
fn faculty_filter_matches_any_contributor() {
    let mut s = Sidecar::open("lectured-delete-faculty");
    s.submit("Optics", "CSE", "A");
    s.submit("Optics", "CSE", "B");
    s.submit("Waves", "CSE", "A");

    let out = s.ok("maintenance.deleteByFilter", json!({ "faculty": "B" }));
    assert_eq!(out["deleted"], 1);
    assert_eq!(s.labels(), vec!["Waves - CSE".to_string()]);

    let out = s.ok("maintenance.deleteByFilter", json!({}));
    assert_eq!(out["deleted"], 1);
    assert_eq!(out["filtered"], false);
    assert!(s.labels().is_empty());
}

#[test]
fn delete_by_key_and_selected_ids() {
    let mut s = Sidecar::open("lectured-delete-keys");
    s.submit("Optics", "CSE", "A");
    s.submit("Waves", "CSE", "A");
    let waves = s.submit("Waves", "ECE", "A");
    let waves_id = waves["record"]["recordId"]
        .as_str()
        .expect("record id")
        .to_string();

    let out = s.ok(
        "maintenance.deleteByKey",
        json!({ "chapterId": "Optics", "branchId": "CSE" }),
    );
    assert_eq!(out["deleted"], true);
    let out = s.ok(
        "maintenance.deleteByKey",
        json!({ "chapterId": "Optics", "branchId": "CSE" }),
    );
    assert_eq!(out["deleted"], false);

    let out = s.ok(
        "maintenance.deleteSelected",
        json!({ "recordIds": [waves_id, "no-such-record"] }),
    );
    assert_eq!(out["deleted"], 1);
    assert_eq!(out["notFound"], json!(["no-such-record"]));
    assert_eq!(s.labels(), vec!["Waves - CSE".to_string()]);

    let resp = s.call("maintenance.deleteSelected", json!({ "recordIds": [""] }));
    assert_eq!(resp["error"]["code"], "bad_params");

    let out = s.ok("maintenance.truncate", json!({}));
    assert_eq!(out["deleted"], 1);
    assert!(s.labels().is_empty());
}

#[test]
fn analysis_query_searches_filters_and_sorts() {
    let mut s = Sidecar::open("lectured-analysis");
    s.ok(
        "directory.setRequirement",
        json!({ "chapterId": "Optics", "required": 1 }),
    );
    s.ok(
        "directory.assign",
        json!({ "faculty": "A", "chapterId": "Optics", "branchId": "CSE" }),
    );
    s.ok(
        "directory.assign",
        json!({ "faculty": "A", "chapterId": "Waves", "branchId": "CSE" }),
    );
    s.ok(
        "progress.submit",
        json!({ "chapterId": "Optics", "branchId": "CSE", "faculty": "A", "contentTaught": "Lenses" }),
    );
    s.ok(
        "progress.submit",
        json!({
            "chapterId": "Waves",
            "branchId": "CSE",
            "faculty": "A",
            "contentTaught": "Interference",
            "overshootRemark": "no count set",
        }),
    );

    let all = s.ok("analysis.query", json!({ "tag": "ALL" }));
    assert_eq!(all["total"], 2);
    assert_eq!(all["shown"], 2);
    assert_eq!(all["availableTags"], json!(["REGULAR", "OVERSHOOT"]));
    assert_eq!(all["records"][0]["label"], "Waves - CSE");

    let oldest = s.ok("analysis.query", json!({ "sort": "oldest" }));
    assert_eq!(oldest["records"][0]["label"], "Optics - CSE");

    let over = s.ok("analysis.query", json!({ "tag": "OVERSHOOT" }));
    assert_eq!(over["shown"], 1);
    assert_eq!(over["records"][0]["label"], "Waves - CSE");

    let found = s.ok("analysis.query", json!({ "search": "optics" }));
    assert_eq!(found["shown"], 1);
    assert_eq!(found["total"], 2);

    let resp = s.call("analysis.query", json!({ "tag": "URGENT" }));
    assert_eq!(resp["error"]["code"], "validation");

    let chapters = s.ok("directory.chapters", json!({ "faculty": "A" }));
    assert_eq!(chapters["chapters"][0]["chapterId"], "Optics");
    assert_eq!(chapters["chapters"][0]["requiredLectureCount"], 1);
    assert_eq!(chapters["chapters"][1]["requiredLectureCount"], 0);

    let faculty = s.ok("analysis.faculty", json!({}));
    assert_eq!(faculty["faculties"]["A"]["lectures"], 2);
    assert_eq!(faculty["faculties"]["A"]["overshootLectures"], 1);
}

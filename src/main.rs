use clap::Parser;
use lectured::config::Config;
use lectured::ipc;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::parse();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        let req = ipc::Request {
            id: "startup".to_string(),
            method: "workspace.select".to_string(),
            params: serde_json::json!({ "path": path.to_string_lossy() }),
        };
        let resp = ipc::handle_request(&mut state, req);
        if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            warn!(path = %path.display(), "startup workspace could not be opened");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "lectured ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

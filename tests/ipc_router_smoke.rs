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
    let exe = env!("CARGO_BIN_EXE_facultyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn facultyd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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
        "actor": { "username": "admin", "isAdmin": true },
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
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

fn is_ok(v: &serde_json::Value) -> bool {
    v.get("ok").and_then(|v| v.as_bool()) == Some(true)
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("facultyd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let csv_out = workspace.join("smoke-export.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(is_ok(&health));
    let selected = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(is_ok(&selected), "{selected}");
    assert_eq!(selected["result"]["seededAdmin"], json!(true));
    assert_eq!(selected["result"]["backend"], json!("json"));

    let faculty = request(
        &mut stdin,
        &mut reader,
        "3",
        "faculties.create",
        json!({
            "name": "Dr. Smoke",
            "gender": "Female",
            "email": "smoke@example.org",
            "designation": "Professor"
        }),
    );
    assert!(is_ok(&faculty), "{faculty}");
    let faculty_id = faculty["result"]["id"].as_str().expect("faculty id").to_string();
    assert_eq!(faculty_id, "FAC0001");

    let session = request(
        &mut stdin,
        &mut reader,
        "4",
        "sessions.create",
        json!({
            "date": "2024-03-14",
            "duration": 2.0,
            "faculty_name": "Dr. Smoke",
            "session_name": "Smoke Testing",
            "batch": "PGDM",
            "honorarium_paid": 500.0,
            "feedback": { "relevance": 4.0, "overall_performance": 4.5 }
        }),
    );
    assert!(is_ok(&session), "{session}");
    let session_id = session["result"]["id"].as_str().expect("session id").to_string();

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("accounts.list", json!({})),
        ("accounts.get", json!({})),
        ("faculties.list", json!({})),
        ("faculties.get", json!({ "id": faculty_id })),
        ("faculties.search", json!({ "term": "smoke" })),
        ("faculties.sessions", json!({ "id": faculty_id })),
        ("sessions.list", json!({})),
        ("sessions.get", json!({ "id": session_id })),
        ("sessions.filter", json!({ "filters": { "batch": "pgdm" } })),
        ("sessions.calendar", json!({ "year": 2024, "month": 3 })),
        (
            "import.preview",
            json!({ "rows": [ { "Date": "2024-03-15", "Speaker": "X", "Topic": "Y" } ] }),
        ),
        ("reports.dashboard", json!({})),
        ("reports.facultyPerformance", json!({})),
        ("reports.sessionAnalytics", json!({})),
        ("reports.financialSummary", json!({})),
        (
            "export.table",
            json!({ "kind": "sessions", "format": "csv", "outPath": csv_out.to_string_lossy() }),
        ),
        ("backup.export", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{i}"), method, params);
        assert!(is_ok(&resp), "{method} failed: {resp}");
    }
    assert!(csv_out.is_file());
    assert!(bundle_out.is_file());

    let unknown = request(&mut stdin, &mut reader, "u1", "classes.list", json!({}));
    assert_eq!(unknown["ok"], json!(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn protocol_errors_are_reported_in_envelopes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush");
    let bad = read_response(&mut reader);
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    writeln!(stdin, "{}", json!({ "id": "x1", "method": "nope.nothing" })).expect("write");
    stdin.flush().expect("flush");
    let unknown = read_response(&mut reader);
    assert_eq!(unknown["id"], json!("x1"));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    let before = request(&mut stdin, &mut reader, "x2", "faculties.list", json!({}));
    assert_eq!(before["error"]["code"], json!("no_workspace"));

    let missing = request(&mut stdin, &mut reader, "x3", "workspace.select", json!({}));
    assert_eq!(missing["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn invalid_config_fails_workspace_select() {
    let workspace = temp_dir("facultyd-bad-config");
    std::fs::write(
        workspace.join("facultyd.toml"),
        "[ids]\nfaculty_prefix = \"X\"\nsession_prefix = \"X\"\n",
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["error"]["code"], json!("config_invalid"));

    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["result"]["workspacePath"], json!(null));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sqlite_backend_serves_the_same_methods() {
    let workspace = temp_dir("facultyd-sqlite-smoke");
    std::fs::write(
        workspace.join("facultyd.toml"),
        "[storage]\nbackend = \"sqlite\"\n",
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["result"]["backend"], json!("sqlite"));
    assert!(workspace.join("facultyd.sqlite3").is_file());

    for (i, day) in ["2024-02-01", "2024-02-02"].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("s{i}"),
            "sessions.create",
            json!({
                "date": day,
                "duration": 1.0,
                "faculty_name": "Dr. Q",
                "session_name": "Queues",
                "honorarium_paid": 100.0
            }),
        );
        assert_eq!(resp["result"]["id"], json!(format!("SES000{}", i + 1)));
    }
    let list = request(&mut stdin, &mut reader, "l", "sessions.list", json!({}));
    let sessions = list["result"]["sessions"].as_array().expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["date"], json!("2024-02-02"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

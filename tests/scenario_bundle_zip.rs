use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

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

fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("create fixture dir");
    for entry in std::fs::read_dir(from).expect("read fixture dir") {
        let entry = entry.expect("fixture entry");
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).expect("copy fixture");
        }
    }
}

/// Fresh workspace whose proxy/ directory replays the named fixture set.
fn seeded_workspace(prefix: &str, proxy: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    copy_tree(
        &fixture_path(&format!("fixtures/proxy/{}", proxy)),
        &workspace.join("proxy"),
    );
    workspace
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .env_remove("GRADEBOOKD_POLICY_VARIANT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn assert_close(actual: &serde_json::Value, expected: f64) {
    let actual = actual.as_f64().expect("numeric value");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn login_and_fetch(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    fetch: bool,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "login",
        "session.login",
        json!({ "host": "grades.example.edu", "username": "student1", "password": "pw" }),
    );
    if fetch {
        request_ok(stdin, reader, "fetch", "courses.fetchPeriod", json!({ "period": "q1" }));
    }
}

#[test]
fn scenario_bundle_roundtrip_restores_diverged_shadows() {
    let workspace = seeded_workspace("gradebook-scenario", "generic");
    let bundle = workspace.join("exports").join("what-if.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    login_and_fetch(&mut stdin, &mut reader, &workspace, true);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "shadow.editAssignment",
        json!({ "period": "q1", "courseId": "math", "assignmentId": "m3", "patch": { "score": "50" } }),
    );
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scenario.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!("gradebook-scenario-v1"));
    assert_eq!(exported["courseCount"], json!(1));
    assert_eq!(exported["sha256"].as_str().map(|s| s.len()), Some(64));
    assert!(bundle.is_file());

    request_ok(&mut stdin, &mut reader, "3", "shadow.rollback", json!({ "period": "q1" }));
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scenario.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["applied"], json!([{ "period": "q1", "courseId": "math" }]));
    assert_eq!(imported["skipped"], json!([]));

    let math = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calc.courseSummary",
        json!({ "period": "q1", "courseId": "math" }),
    );
    assert_close(&math["ratio"], 0.4 * 0.9 + 0.6 * (66.0 / 70.0));
    assert_eq!(math["needsRollback"], json!(true));

    drop(stdin);
    let _ = child.wait();

    // A session that never loaded the period skips the bundled course.
    let other = seeded_workspace("gradebook-scenario-other", "generic");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    login_and_fetch(&mut stdin, &mut reader, &other, false);
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scenario.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["applied"], json!([]));
    assert_eq!(imported["skipped"], json!([{ "period": "q1", "courseId": "math" }]));
    drop(stdin);
    let _ = child.wait();

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(other);
}

#[test]
fn scenario_import_rejects_foreign_archives() {
    let workspace = seeded_workspace("gradebook-scenario-bad", "generic");
    let not_a_zip = workspace.join("notes.zip");
    std::fs::write(&not_a_zip, b"plain text").expect("write fake bundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    login_and_fetch(&mut stdin, &mut reader, &workspace, true);

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "scenario.import",
        json!({ "inPath": not_a_zip.to_string_lossy() }),
    );
    assert_eq!(code, "bad_bundle");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "scenario.import",
        json!({ "inPath": workspace.join("missing.zip").to_string_lossy() }),
    );
    assert_eq!(code, "bad_bundle");

    let code = request_err_code(&mut stdin, &mut reader, "3", "scenario.export", json!({}));
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

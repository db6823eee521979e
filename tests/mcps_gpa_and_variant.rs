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
    spawn_sidecar_with_variant(None)
}

fn spawn_sidecar_with_variant(variant: Option<&str>) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut cmd = Command::new(exe);
    cmd.env_remove("GRADEBOOKD_WORKSPACE");
    match variant {
        Some(v) => cmd.env("GRADEBOOKD_POLICY_VARIANT", v),
        None => cmd.env_remove("GRADEBOOKD_POLICY_VARIANT"),
    };
    let mut child = cmd
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

const MCPS_HOST: &str = "md-mcps-psv.edupoint.com";

fn open_and_login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    extra: serde_json::Value,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let mut params = json!({ "host": MCPS_HOST, "username": "mia", "password": "pw" });
    if let (Some(p), Some(e)) = (params.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            p.insert(k.clone(), v.clone());
        }
    }
    request_ok(stdin, reader, "login", "session.login", params)
}

#[test]
fn mcps_host_selects_fixed_weights_and_cutoffs() {
    let workspace = seeded_workspace("gradebook-mcps-variant", "mcps");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let session = open_and_login(&mut stdin, &mut reader, &workspace, json!({}));
    assert_eq!(session["policyVariant"], json!("mcps"));

    request_ok(&mut stdin, &mut reader, "1", "courses.fetchPeriod", json!({ "period": "mp1" }));
    let math = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calc.courseSummary",
        json!({ "period": "mp1", "courseId": "math" }),
    );
    // Published weights are 0; the variant pins tasks to 0.9 and practice to 0.1.
    assert_close(&math["ratio"], 0.9 * 0.8 + 0.1 * 0.9);
    assert_eq!(math["mark"], json!("B"));
    assert_eq!(math["style"], json!("scale-4"));

    let a = request_ok(&mut stdin, &mut reader, "3", "calc.mark", json!({ "ratio": 0.895 }));
    assert_eq!(a["mark"], json!("A"));
    let e = request_ok(&mut stdin, &mut reader, "4", "calc.mark", json!({ "ratio": 0.2 }));
    assert_eq!(e["mark"], json!("E"));
    let style = request_ok(&mut stdin, &mut reader, "5", "calc.style", json!({ "ratio": 0.2 }));
    assert_eq!(style["style"], json!("scale-1"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn gpa_uses_previews_until_a_shadow_exists() {
    let workspace = seeded_workspace("gradebook-mcps-gpa", "mcps");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_and_login(&mut stdin, &mut reader, &workspace, json!({}));

    // Algebra "B" = 3, AP History "91.5%" maps to A = 4 (+1 weighted), PE "P" is left out.
    let before = request_ok(&mut stdin, &mut reader, "1", "calc.gpa", json!({ "period": "mp1" }));
    assert_close(&before["gpa"]["weighted"], 4.0);
    assert_close(&before["gpa"]["unweighted"], 3.5);
    assert_eq!(before["gpa"]["counted"], json!(2));

    request_ok(&mut stdin, &mut reader, "2", "courses.fetchPeriod", json!({ "period": "mp1" }));
    let fetched = request_ok(&mut stdin, &mut reader, "3", "calc.gpa", json!({ "period": "mp1" }));
    assert_close(&fetched["gpa"]["weighted"], 4.0);

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "shadow.editAssignment",
        json!({ "period": "mp1", "courseId": "math", "assignmentId": "m3", "patch": { "score": "50" } }),
    );
    let after = request_ok(&mut stdin, &mut reader, "5", "calc.gpa", json!({ "period": "mp1" }));
    assert_close(&after["gpa"]["weighted"], 4.5);
    assert_close(&after["gpa"]["unweighted"], 4.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn variant_overrides_follow_precedence() {
    let workspace = seeded_workspace("gradebook-variant-override", "mcps");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let session = open_and_login(
        &mut stdin,
        &mut reader,
        &workspace,
        json!({ "policyVariant": "generic" }),
    );
    assert_eq!(session["policyVariant"], json!("generic"));
    // Generic boundaries put 0.895 below the 90 cutoff.
    let b = request_ok(&mut stdin, &mut reader, "1", "calc.mark", json!({ "ratio": 0.895 }));
    assert_eq!(b["mark"], json!("B"));

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.setPolicyVariant",
        json!({ "variant": "generic" }),
    );
    assert_eq!(set["override"], json!("generic"));

    // The workspace setting now outranks the host rule on the next login.
    let relogin = open_and_login(&mut stdin, &mut reader, &workspace, json!({}));
    assert_eq!(relogin["policyVariant"], json!("generic"));

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.setPolicyVariant",
        json!({ "variant": null }),
    );
    assert!(cleared["override"].is_null());
    assert_eq!(cleared["sessionVariant"], json!("mcps"));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "session.setPolicyVariant",
        json!({ "variant": "fcps" }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn environment_variant_outranks_workspace_setting() {
    let workspace = seeded_workspace("gradebook-variant-env", "generic");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_variant(Some("mcps"));

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let login_params = json!({ "host": "grades.example.edu", "username": "student1", "password": "pw" });
    let session = request_ok(&mut stdin, &mut reader, "1", "session.login", login_params.clone());
    assert_eq!(session["policyVariant"], json!("mcps"));

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.setPolicyVariant",
        json!({ "variant": "generic" }),
    );
    assert_eq!(set["override"], json!("generic"));
    assert_eq!(set["sessionVariant"], json!("mcps"));

    let relogin = request_ok(&mut stdin, &mut reader, "3", "session.login", login_params);
    assert_eq!(relogin["policyVariant"], set["sessionVariant"]);

    let current = request_ok(&mut stdin, &mut reader, "4", "session.get", json!({}));
    assert_eq!(current["policyVariant"], json!("mcps"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

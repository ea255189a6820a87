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
    let exe = env!("CARGO_BIN_EXE_tahfizd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tahfizd");
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

fn view_ids(result: &serde_json::Value) -> Vec<String> {
    result
        .get("assets")
        .and_then(|v| v.as_array())
        .expect("assets array")
        .iter()
        .map(|a| {
            a.get("id")
                .and_then(|v| v.as_str())
                .expect("asset id")
                .to_string()
        })
        .collect()
}

#[test]
fn upload_then_view_applies_overlay_order_and_hiding() {
    let workspace = temp_dir("tahfiz-upload-view");
    let remote_root = workspace.join("remote");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "remote.connect",
        json!({
            "root": remote_root.to_string_lossy(),
            "authToken": "secret",
            "public": true
        }),
    );

    let uploaded = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gallery.upload",
        json!({
            "year": 2025,
            "month": 10,
            "items": [
                { "dataBase64": "b25l", "extension": "jpg", "slug": "Aisha" },
                { "dataBase64": "dHdv", "extension": "jpg", "slug": "Bilal" },
                { "dataBase64": "dGhyZWU=", "extension": "jpg", "slug": "Dawud" }
            ]
        }),
    );
    assert_eq!(uploaded.get("status").and_then(|v| v.as_str()), Some("uploaded"));
    let outcomes = uploaded
        .get("outcomes")
        .and_then(|v| v.as_array())
        .expect("outcomes");
    assert_eq!(outcomes.len(), 3);
    let id_a = outcomes[0]["assetId"].as_str().expect("id a").to_string();
    let id_b = outcomes[1]["assetId"].as_str().expect("id b").to_string();
    let id_c = outcomes[2]["assetId"].as_str().expect("id c").to_string();
    assert_eq!(outcomes[0]["targetName"], "202510-01-Aisha.jpg");
    assert_eq!(outcomes[1]["targetName"], "202510-02-Bilal.jpg");
    assert_eq!(outcomes[2]["targetName"], "202510-03-Dawud.jpg");

    // fallback order: lexicographic by name
    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "gallery.view",
        json!({ "year": 2025, "month": 10 }),
    );
    assert_eq!(view_ids(&viewed), [id_a.clone(), id_b.clone(), id_c.clone()]);
    let first = &viewed["assets"][0];
    assert_eq!(first["origin"], "remote-direct");
    assert_eq!(first["payload"]["kind"], "direct");
    assert!(first["payload"]["reference"]
        .as_str()
        .expect("reference")
        .ends_with("202510-01-Aisha.jpg"));
    assert_eq!(first["parsed"]["rank"], 1);
    assert_eq!(first["parsed"]["slug"], "Aisha");

    // featured first, then override positions, then fallback
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gallery.overlay.setFeatured",
        json!({ "year": 2025, "month": 10, "assetId": id_b }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gallery.overlay.setOrder",
        json!({ "year": 2025, "month": 10, "order": [id_c, id_a] }),
    );
    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gallery.view",
        json!({ "year": 2025, "month": 10 }),
    );
    assert_eq!(view_ids(&viewed), [id_b.clone(), id_c.clone(), id_a.clone()]);

    // hiding by canonical name beats any order override
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "gallery.overlay.hide",
        json!({ "year": 2025, "month": 10, "target": "202510-01-Aisha.jpg" }),
    );
    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "gallery.view",
        json!({ "year": 2025, "month": 10 }),
    );
    assert_eq!(view_ids(&viewed), [id_b.clone(), id_c.clone()]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gallery.overlay.unhide",
        json!({ "year": 2025, "month": 10, "target": "202510-01-Aisha.jpg" }),
    );
    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "gallery.view",
        json!({ "year": 2025, "month": 10, "direction": "desc" }),
    );
    // featured and override still pin B, C; only the fallback tail reverses
    assert_eq!(view_ids(&viewed), [id_b, id_c, id_a]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn conflicting_upload_requires_confirmation_then_fails_per_item() {
    let workspace = temp_dir("tahfiz-upload-conflict");
    let remote_root = workspace.join("remote");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "remote.connect",
        json!({
            "root": remote_root.to_string_lossy(),
            "authToken": "secret",
            "public": true
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gallery.upload",
        json!({
            "year": 2025,
            "month": 11,
            "items": [
                { "dataBase64": "b25l", "extension": "jpg" },
                { "dataBase64": "dHdv", "extension": "jpg" }
            ]
        }),
    );

    // ranks {1,2} occupied; the next free rank is 3
    let plan = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "gallery.uploadPlan",
        json!({
            "year": 2025,
            "month": 11,
            "items": [{ "extension": "jpg" }]
        }),
    );
    assert_eq!(plan["targets"][0]["rank"], 3);
    assert_eq!(plan["targets"][0]["targetName"], "202511-03.jpg");
    assert_eq!(plan["conflicts"].as_array().expect("conflicts").len(), 0);

    // an explicit start is honored verbatim, and the collision is surfaced
    // before anything uploads
    let attempt = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gallery.upload",
        json!({
            "year": 2025,
            "month": 11,
            "startRank": 2,
            "items": [{ "dataBase64": "cmFjZQ==", "extension": "jpg" }]
        }),
    );
    assert_eq!(
        attempt.get("status").and_then(|v| v.as_str()),
        Some("needs_confirmation")
    );
    assert_eq!(attempt["conflicts"][0]["targetName"], "202511-02.jpg");
    assert_eq!(attempt["outcomes"].as_array().expect("outcomes").len(), 0);
    let listed = request_ok(&mut stdin, &mut reader, "6", "gallery.list", json!({}));
    assert_eq!(listed["files"].as_array().expect("files").len(), 2);

    // confirmed anyway: the store still refuses the taken name, one item,
    // one failure, no retry under another rank
    let confirmed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gallery.upload",
        json!({
            "year": 2025,
            "month": 11,
            "startRank": 2,
            "confirm": true,
            "items": [{ "dataBase64": "cmFjZQ==", "extension": "jpg" }]
        }),
    );
    assert_eq!(confirmed.get("status").and_then(|v| v.as_str()), Some("partial"));
    assert_eq!(confirmed["outcomes"][0]["status"], "failed");
    let listed = request_ok(&mut stdin, &mut reader, "8", "gallery.list", json!({}));
    assert_eq!(listed["files"].as_array().expect("files").len(), 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

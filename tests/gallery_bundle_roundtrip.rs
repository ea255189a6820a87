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

#[test]
fn exported_bundle_restores_cleared_cache() {
    let workspace = temp_dir("tahfiz-bundle");
    let remote_root = workspace.join("remote");
    let bundle_out = workspace.join("out").join("202512.tahfizgallery.zip");

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
            "month": 12,
            "items": [
                { "dataBase64": "Zmlyc3Q=", "extension": "jpg", "slug": "Maryam" },
                { "dataBase64": "c2Vjb25k", "extension": "png" }
            ]
        }),
    );
    let warmed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "gallery.cacheWarm",
        json!({ "year": 2025, "month": 12 }),
    );
    assert_eq!(warmed["cachedCount"], 2);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gallery.bundleExport",
        json!({
            "year": 2025,
            "month": 12,
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    assert_eq!(exported["bundleFormat"], "tahfiz-gallery-v1");
    assert_eq!(exported["entryCount"], 2);
    assert!(bundle_out.is_file(), "bundle written to disk");

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gallery.cacheClear",
        json!({ "year": 2025, "month": 12 }),
    );
    assert_eq!(cleared["removed"], 2);

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gallery.bundleImport",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], "tahfiz-gallery-v1");
    assert_eq!(imported["restoredCount"], 2);
    assert_eq!(imported["skipped"].as_array().expect("skipped").len(), 0);

    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "gallery.view",
        json!({ "year": 2025, "month": 12 }),
    );
    let assets = viewed["assets"].as_array().expect("assets");
    assert_eq!(assets.len(), 2);
    for asset in assets {
        assert_eq!(asset["origin"], "cache-payload");
        assert_eq!(asset["payload"]["kind"], "cache");
    }
    let maryam = assets
        .iter()
        .find(|a| a["name"] == "202512-01-Maryam.jpg")
        .expect("restored asset");
    assert_eq!(maryam["payload"]["dataBase64"], "Zmlyc3Q=");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

use crate::bundle;
use crate::ipc::error::ok;
use crate::ipc::helpers::{bucket_from_params, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn bundle_export(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);

    let summary = bundle::export_gallery_bundle(conn, bucket, &out_path)
        .map_err(|e| HandlerErr::new("bundle_export_failed", format!("{e:#}")))?;
    Ok(json!({
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "outPath": out_path.to_string_lossy(),
    }))
}

fn bundle_import(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);

    let summary = bundle::import_gallery_bundle(conn, &in_path)
        .map_err(|e| HandlerErr::new("bundle_import_failed", format!("{e:#}")))?;
    Ok(json!({
        "bundleFormatDetected": summary.bundle_format_detected,
        "restoredCount": summary.restored_count,
        "skipped": summary.skipped,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gallery.bundleExport" => bundle_export(state, &req.params),
        "gallery.bundleImport" => bundle_import(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

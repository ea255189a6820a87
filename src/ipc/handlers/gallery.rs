use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::Connection;
use serde_json::json;

use crate::gallery::cache;
use crate::gallery::name::ImageExt;
use crate::gallery::overlay;
use crate::gallery::parse_member;
use crate::gallery::resequence::{self, RenameStatus};
use crate::gallery::resolve::{self, Outcome, Payload};
use crate::gallery::upload::{self, UploadItem, UploadSpec, UploadStatus};
use crate::gallery::view::{self, FallbackDirection, ListedAsset, ViewPayload};
use crate::ipc::error::ok;
use crate::ipc::helpers::{bucket_from_params, get_bool, get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::remote::RemoteStore;

fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn require_remote(state: &AppState) -> Result<&dyn RemoteStore, HandlerErr> {
    state
        .remote
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_remote", "connect a remote store first"))
}

fn remote_list(
    remote: &dyn RemoteStore,
    token: Option<&str>,
) -> Result<Vec<crate::remote::RemoteFile>, HandlerErr> {
    remote
        .list(token)
        .map_err(|e| HandlerErr::new("remote_error", e.to_string()))
}

fn parsed_json(name: &str) -> serde_json::Value {
    match parse_member(name) {
        Some(p) => json!({
            "year": p.year,
            "month": p.month,
            "rank": p.rank,
            "slug": p.slug,
            "extension": p.extension.as_str(),
        }),
        None => serde_json::Value::Null,
    }
}

fn gallery_list(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();
    let files = remote_list(remote, token)?;

    let rows: Vec<serde_json::Value> = files
        .iter()
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.name,
                "mimeType": f.mime_type,
                "size": f.size,
                "parsed": parsed_json(&f.name),
            })
        })
        .collect();
    Ok(json!({ "files": rows }))
}

fn view_payload_json(payload: &ViewPayload) -> serde_json::Value {
    match payload {
        ViewPayload::Cached {
            mime_type,
            sha256,
            bytes,
        } => json!({
            "kind": "cache",
            "mimeType": mime_type,
            "sha256": sha256,
            "dataBase64": BASE64.encode(bytes),
        }),
        ViewPayload::Direct {
            reference: Some(reference),
        } => json!({
            "kind": "direct",
            "reference": reference,
        }),
        ViewPayload::Direct { reference: None } => serde_json::Value::Null,
    }
}

fn gallery_view(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let direction = match get_opt_str(params, "direction") {
        None => FallbackDirection::Ascending,
        Some(raw) => FallbackDirection::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("direction must be \"asc\" or \"desc\""))?,
    };

    let listing: Vec<ListedAsset> = remote_list(remote, token)?
        .into_iter()
        .filter(|f| parse_member(&f.name).map(|p| p.bucket()) == Some(bucket))
        .map(|f| {
            let reference = remote.public_reference(&f.id);
            ListedAsset { file: f, reference }
        })
        .collect();

    let snapshot = cache::get_cached(conn, bucket);
    let state_overlay = overlay::load(conn, bucket);
    let assets = view::view(&listing, &snapshot, &state_overlay, direction);

    let rows: Vec<serde_json::Value> = assets
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "name": a.name,
                "mimeType": a.mime_type,
                "size": a.size,
                "origin": a.origin.as_str(),
                "parsed": parsed_json(&a.name),
                "payload": view_payload_json(&a.payload),
            })
        })
        .collect();
    Ok(json!({
        "bucket": { "year": bucket.year, "month": bucket.month },
        "assets": rows,
    }))
}

fn resolve_payload_json(payload: &Payload) -> serde_json::Value {
    match payload {
        Payload::Cached { mime_type, bytes } => json!({
            "kind": "cache",
            "origin": "cache-payload",
            "mimeType": mime_type,
            "dataBase64": BASE64.encode(bytes),
        }),
        Payload::Direct { reference } => json!({
            "kind": "direct",
            "origin": "remote-direct",
            "reference": reference,
        }),
        Payload::Fetched { mime_type, bytes } => json!({
            "kind": "fetched",
            "origin": "remote-authenticated",
            "mimeType": mime_type,
            "dataBase64": BASE64.encode(bytes),
        }),
    }
}

fn gallery_resolve(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let asset_id = get_required_str(params, "assetId")?;
    let conn = require_db(state)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let listing = remote_list(remote, token)?;
    let Some(file) = listing.iter().find(|f| f.id == asset_id) else {
        return Err(HandlerErr::new("not_found", "asset not in remote listing"));
    };

    // only bucket members are ever warmed, so the cache lookup goes through
    // the member's bucket
    let snapshot = parse_member(&file.name).map(|p| cache::get_cached(conn, p.bucket()));
    let cached = snapshot
        .as_ref()
        .and_then(|s| s.payloads.get(file.id.as_str()));

    let resolution = resolve::resolve(file, cached, Some(remote), token);
    let attempted: Vec<serde_json::Value> = resolution
        .attempted
        .iter()
        .map(|a| {
            let (outcome, error) = match &a.outcome {
                Outcome::Hit => ("hit", None),
                Outcome::Miss => ("miss", None),
                Outcome::Failed(e) => ("failed", Some(e.clone())),
            };
            json!({
                "strategy": a.strategy.as_str(),
                "outcome": outcome,
                "error": error,
            })
        })
        .collect();

    Ok(json!({
        "assetId": asset_id,
        "payload": resolution.payload.as_ref().map(resolve_payload_json),
        "attempted": attempted,
    }))
}

fn gallery_cache_warm(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let listing = remote_list(remote, token)?;
    let summary = cache::warm(conn, remote, token, bucket, &listing)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let failures: Vec<serde_json::Value> = summary
        .failures
        .iter()
        .map(|f| json!({ "assetId": f.asset_id, "name": f.name, "error": f.error }))
        .collect();
    Ok(json!({
        "cachedCount": summary.cached_count,
        "totalCount": summary.total_count,
        "failures": failures,
    }))
}

fn gallery_cache_clear(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let removed = cache::clear(conn, bucket)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "removed": removed }))
}

fn rename_outcomes_json(report: &resequence::ApplyReport) -> Vec<serde_json::Value> {
    report
        .outcomes
        .iter()
        .map(|o| {
            let (status, error) = match &o.status {
                RenameStatus::Renamed => ("renamed", None),
                RenameStatus::Skipped => ("skipped", None),
                RenameStatus::Failed(e) => ("failed", Some(e.clone())),
            };
            json!({
                "assetId": o.asset_id,
                "oldName": o.old_name,
                "newName": o.new_name,
                "status": status,
                "error": error,
            })
        })
        .collect()
}

fn gallery_resequence(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let listing = remote_list(remote, token)?;
    let plan = resequence::plan(bucket, &listing)
        .map_err(|e| HandlerErr::new("rank_overflow", e.to_string()))?;

    let validated = match plan.validate(&listing) {
        Ok(v) => v,
        Err(aborted) => {
            let conflicts: Vec<serde_json::Value> = aborted
                .conflicts
                .iter()
                .map(|c| json!({ "candidate": c.candidate, "existing": c.existing }))
                .collect();
            return Ok(json!({
                "bucket": { "year": aborted.bucket.year, "month": aborted.bucket.month },
                "status": "aborted",
                "conflicts": conflicts,
                "outcomes": [],
                "renamedCount": 0,
                "skippedCount": 0,
                "failedCount": 0,
            }));
        }
    };

    let report = validated.apply(remote, token.unwrap_or_default());
    let status = if report.fully_applied() {
        "applied"
    } else {
        "partial"
    };
    Ok(json!({
        "bucket": { "year": report.bucket.year, "month": report.bucket.month },
        "status": status,
        "conflicts": [],
        "outcomes": rename_outcomes_json(&report),
        "renamedCount": report.renamed(),
        "skippedCount": report.skipped(),
        "failedCount": report.failed(),
    }))
}

fn upload_specs_from_params(params: &serde_json::Value) -> Result<Vec<UploadSpec>, HandlerErr> {
    let items = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing items"))?;
    if items.is_empty() {
        return Err(HandlerErr::bad_params("items must not be empty"));
    }

    let mut specs = Vec::with_capacity(items.len());
    for item in items {
        let ext_raw = item
            .get("extension")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("item missing extension"))?;
        let extension = ImageExt::parse(ext_raw).ok_or_else(|| {
            HandlerErr::bad_params(format!("unsupported extension: {}", ext_raw))
        })?;
        specs.push(UploadSpec {
            slug: item.get("slug").and_then(|v| v.as_str()).map(String::from),
            extension,
        });
    }
    Ok(specs)
}

fn start_rank_from_params(params: &serde_json::Value) -> Result<Option<u32>, HandlerErr> {
    match params.get("startRank") {
        None => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| HandlerErr::bad_params("startRank must be a number"))?;
            u32::try_from(n)
                .map(Some)
                .map_err(|_| HandlerErr::bad_params("startRank out of range"))
        }
    }
}

fn upload_plan_json(plan: &upload::UploadPlan) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
    let targets = plan
        .targets
        .iter()
        .map(|t| json!({ "rank": t.rank, "targetName": t.target_name }))
        .collect();
    let conflicts = plan
        .conflicts
        .iter()
        .map(|c| json!({ "targetName": c.target_name, "existing": c.existing }))
        .collect();
    (targets, conflicts)
}

fn gallery_upload_plan(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let specs = upload_specs_from_params(params)?;
    let start = start_rank_from_params(params)?;
    let listing = remote_list(remote, token)?;
    let plan = upload::plan_uploads(&listing, bucket, &specs, start)
        .map_err(|e| HandlerErr::new("rank_overflow", e.to_string()))?;

    let (targets, conflicts) = upload_plan_json(&plan);
    Ok(json!({
        "bucket": { "year": plan.bucket.year, "month": plan.bucket.month },
        "targets": targets,
        "conflicts": conflicts,
    }))
}

fn gallery_upload(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let remote = require_remote(state)?;
    let token = state.auth_token.as_deref();

    let items = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing items"))?
        .clone();
    let specs = upload_specs_from_params(params)?;
    let start = start_rank_from_params(params)?;
    let confirm = get_bool(params, "confirm");

    let listing = remote_list(remote, token)?;
    let plan = upload::plan_uploads(&listing, bucket, &specs, start)
        .map_err(|e| HandlerErr::new("rank_overflow", e.to_string()))?;
    let (targets, conflicts) = upload_plan_json(&plan);

    // conflicts need explicit confirmation before anything is uploaded
    if !plan.conflicts.is_empty() && !confirm {
        return Ok(json!({
            "status": "needs_confirmation",
            "targets": targets,
            "conflicts": conflicts,
            "outcomes": [],
        }));
    }

    let mut uploads = Vec::with_capacity(items.len());
    for (item, target) in items.iter().zip(&plan.targets) {
        let raw = item
            .get("dataBase64")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("item missing dataBase64"))?;
        let bytes = BASE64
            .decode(raw)
            .map_err(|e| HandlerErr::bad_params(format!("invalid dataBase64: {}", e)))?;
        uploads.push(UploadItem {
            target_name: target.target_name.clone(),
            bytes,
        });
    }

    let outcomes = upload::execute_uploads(remote, token.unwrap_or_default(), uploads);
    let all_ok = outcomes
        .iter()
        .all(|o| matches!(o.status, UploadStatus::Uploaded { .. }));
    let rows: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|o| match &o.status {
            UploadStatus::Uploaded { asset_id } => json!({
                "targetName": o.target_name,
                "status": "uploaded",
                "assetId": asset_id,
            }),
            UploadStatus::Failed(e) => json!({
                "targetName": o.target_name,
                "status": "failed",
                "error": e,
            }),
        })
        .collect();

    let status = if all_ok { "uploaded" } else { "partial" };
    Ok(json!({
        "status": status,
        "targets": targets,
        "conflicts": conflicts,
        "outcomes": rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gallery.list" => gallery_list(state, &req.params),
        "gallery.view" => gallery_view(state, &req.params),
        "gallery.resolve" => gallery_resolve(state, &req.params),
        "gallery.cacheWarm" => gallery_cache_warm(state, &req.params),
        "gallery.cacheClear" => gallery_cache_clear(state, &req.params),
        "gallery.resequence" => gallery_resequence(state, &req.params),
        "gallery.uploadPlan" => gallery_upload_plan(state, &req.params),
        "gallery.upload" => gallery_upload(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

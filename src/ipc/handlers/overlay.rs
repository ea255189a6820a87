use rusqlite::Connection;
use serde_json::json;

use crate::gallery::name::BucketKey;
use crate::gallery::overlay::{self, OverlayState};
use crate::ipc::error::ok;
use crate::ipc::helpers::{bucket_from_params, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn overlay_json(bucket: BucketKey, state: &OverlayState) -> serde_json::Value {
    json!({
        "bucket": { "year": bucket.year, "month": bucket.month },
        "overlay": state,
    })
}

fn save(
    conn: &Connection,
    bucket: BucketKey,
    state: &OverlayState,
) -> Result<serde_json::Value, HandlerErr> {
    overlay::save(conn, bucket, state)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(overlay_json(bucket, state))
}

fn overlay_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    Ok(overlay_json(bucket, &overlay::load(conn, bucket)))
}

fn overlay_hide(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let target = get_required_str(params, "target")?;

    let mut current = overlay::load(conn, bucket);
    current.hidden.insert(target);
    save(conn, bucket, &current)
}

fn overlay_unhide(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let target = get_required_str(params, "target")?;

    let mut current = overlay::load(conn, bucket);
    current.hidden.remove(&target);
    save(conn, bucket, &current)
}

fn overlay_set_order(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let order = params
        .get("order")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing order"))?;
    let order: Vec<String> = order
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| HandlerErr::bad_params("order entries must be asset ids"))
        })
        .collect::<Result<_, _>>()?;

    let mut current = overlay::load(conn, bucket);
    current.order = order;
    save(conn, bucket, &current)
}

fn overlay_set_featured(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    let featured = match params.get("assetId") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_str()
                .map(String::from)
                .ok_or_else(|| HandlerErr::bad_params("assetId must be a string or null"))?,
        ),
    };

    let mut current = overlay::load(conn, bucket);
    current.featured = featured;
    save(conn, bucket, &current)
}

fn overlay_reset(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = bucket_from_params(params)?;
    let conn = require_db(state)?;
    overlay::reset(conn, bucket).map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(overlay_json(bucket, &OverlayState::default()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gallery.overlay.get" => overlay_get(state, &req.params),
        "gallery.overlay.hide" => overlay_hide(state, &req.params),
        "gallery.overlay.unhide" => overlay_unhide(state, &req.params),
        "gallery.overlay.setOrder" => overlay_set_order(state, &req.params),
        "gallery.overlay.setFeatured" => overlay_set_featured(state, &req.params),
        "gallery.overlay.reset" => overlay_reset(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

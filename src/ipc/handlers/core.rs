use serde_json::json;
use std::path::PathBuf;

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_bool, get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::remote::{DirStore, RemoteStore};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "remoteConnected": state.remote.is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn connect_remote(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let root = get_required_str(params, "root")?;
    let auth_token = get_opt_str(params, "authToken");
    let public = get_bool(params, "public");

    let store = DirStore::open(PathBuf::from(&root), auth_token.clone(), public)
        .map_err(|e| HandlerErr::new("remote_error", e.to_string()))?;
    let file_count = store
        .list(auth_token.as_deref())
        .map_err(|e| HandlerErr::new("remote_error", e.to_string()))?
        .len();

    state.remote = Some(Box::new(store));
    state.auth_token = auth_token;
    Ok(json!({ "root": root, "public": public, "fileCount": file_count }))
}

fn handle_remote_connect(state: &mut AppState, req: &Request) -> serde_json::Value {
    match connect_remote(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "remote.connect" => Some(handle_remote_connect(state, req)),
        _ => None,
    }
}

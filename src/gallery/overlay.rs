use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db;
use crate::gallery::name::BucketKey;

/// Client-local presentation state layered over the remote listing.
///
/// Never sent to the remote store; mutated only by explicit user action.
/// Entries may reference ids or names that no longer exist remotely — the
/// view engine ignores them silently. The engine receives this as a plain
/// value; load/save happen only here, at the system boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayState {
    /// Asset ids or canonical names to suppress from the view.
    pub hidden: BTreeSet<String>,
    /// Explicit ordering, by asset id; listed assets come before the rest.
    pub order: Vec<String>,
    /// Asset id pinned to the front of the view.
    pub featured: Option<String>,
}

impl OverlayState {
    pub fn hides(&self, id: &str, name: &str) -> bool {
        self.hidden.contains(id) || self.hidden.contains(name)
    }
}

fn kv_key(bucket: BucketKey) -> String {
    format!("gallery.overlay.{}", bucket.prefix())
}

/// Missing or unreadable state yields the default overlay; an overlay that
/// fails to parse must not brick the gallery.
pub fn load(conn: &Connection, bucket: BucketKey) -> OverlayState {
    match db::kv_get_json(conn, &kv_key(bucket)) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        _ => OverlayState::default(),
    }
}

pub fn save(conn: &Connection, bucket: BucketKey, state: &OverlayState) -> anyhow::Result<()> {
    db::kv_set_json(conn, &kv_key(bucket), &serde_json::to_value(state)?)
}

pub fn reset(conn: &Connection, bucket: BucketKey) -> anyhow::Result<()> {
    db::kv_delete(conn, &kv_key(bucket))
}

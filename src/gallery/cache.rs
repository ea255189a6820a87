use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::gallery::name::BucketKey;
use crate::gallery::parse_member;
use crate::remote::{RemoteFile, RemoteStore};

/// One cached payload row, keyed by asset id in [`CachedBucket`].
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub mime_type: String,
    pub sha256: String,
    pub bytes: Vec<u8>,
}

/// Snapshot of a bucket's cache. Absent cache is an empty map, never an error.
#[derive(Debug, Default)]
pub struct CachedBucket {
    pub payloads: HashMap<String, CachedPayload>,
}

#[derive(Debug, Clone)]
pub struct WarmFailure {
    pub asset_id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug)]
pub struct WarmSummary {
    pub cached_count: usize,
    pub total_count: usize,
    pub failures: Vec<WarmFailure>,
}

/// Fetch and store a payload for every member of `bucket`, from a freshly
/// pulled full listing.
///
/// One asset's fetch failure is recorded and the batch continues; only a
/// broken local database aborts the whole warm. Re-warming overwrites prior
/// rows for the same id.
pub fn warm(
    conn: &Connection,
    remote: &dyn RemoteStore,
    auth_token: Option<&str>,
    bucket: BucketKey,
    listing: &[RemoteFile],
) -> anyhow::Result<WarmSummary> {
    let members: Vec<&RemoteFile> = listing
        .iter()
        .filter(|f| parse_member(&f.name).map(|p| p.bucket()) == Some(bucket))
        .collect();

    let mut cached_count = 0usize;
    let mut failures = Vec::new();
    for file in &members {
        match remote.fetch_bytes(&file.id, auth_token) {
            Ok(bytes) => {
                store_payload(conn, bucket, file, &bytes)?;
                cached_count += 1;
            }
            Err(e) => failures.push(WarmFailure {
                asset_id: file.id.clone(),
                name: file.name.clone(),
                error: e.to_string(),
            }),
        }
    }

    Ok(WarmSummary {
        cached_count,
        total_count: members.len(),
        failures,
    })
}

fn store_payload(
    conn: &Connection,
    bucket: BucketKey,
    file: &RemoteFile,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let digest = format!("{:x}", Sha256::digest(bytes));
    conn.execute(
        "INSERT INTO gallery_cache(asset_id, bucket, name, mime_type, size, sha256, payload, cached_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(asset_id) DO UPDATE SET
           bucket = excluded.bucket,
           name = excluded.name,
           mime_type = excluded.mime_type,
           size = excluded.size,
           sha256 = excluded.sha256,
           payload = excluded.payload,
           cached_at = excluded.cached_at",
        (
            &file.id,
            bucket.prefix(),
            &file.name,
            &file.mime_type,
            bytes.len() as i64,
            digest,
            bytes,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

/// Pure local read. Cache reads never fail: a broken or absent cache reads
/// as empty.
pub fn get_cached(conn: &Connection, bucket: BucketKey) -> CachedBucket {
    read_cached(conn, bucket).unwrap_or_default()
}

fn read_cached(conn: &Connection, bucket: BucketKey) -> rusqlite::Result<CachedBucket> {
    let mut stmt = conn.prepare(
        "SELECT asset_id, mime_type, sha256, payload
         FROM gallery_cache
         WHERE bucket = ?",
    )?;
    let rows = stmt.query_map([bucket.prefix()], |r| {
        Ok((
            r.get::<_, String>(0)?,
            CachedPayload {
                mime_type: r.get(1)?,
                sha256: r.get(2)?,
                bytes: r.get(3)?,
            },
        ))
    })?;

    let mut payloads = HashMap::new();
    for row in rows {
        let (asset_id, payload) = row?;
        payloads.insert(asset_id, payload);
    }
    Ok(CachedBucket { payloads })
}

/// Delete every cached row for the bucket. Returns the number removed.
pub fn clear(conn: &Connection, bucket: BucketKey) -> anyhow::Result<usize> {
    let removed = conn.execute(
        "DELETE FROM gallery_cache WHERE bucket = ?",
        [bucket.prefix()],
    )?;
    Ok(removed)
}

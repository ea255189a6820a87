use anyhow::{anyhow, Context};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::gallery::name::BucketKey;

const MANIFEST_ENTRY: &str = "manifest.json";
const PAYLOAD_DIR: &str = "payloads";
pub const BUNDLE_FORMAT_V1: &str = "tahfiz-gallery-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored_count: usize,
    /// Entries whose payload was missing or failed its digest check.
    pub skipped: Vec<String>,
}

struct CacheRow {
    asset_id: String,
    name: String,
    mime_type: String,
    size: i64,
    sha256: String,
    payload: Vec<u8>,
}

/// Export one bucket's cached payloads as a zip bundle with a manifest.
pub fn export_gallery_bundle(
    conn: &Connection,
    bucket: BucketKey,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let rows = read_bucket_rows(conn, bucket)?;
    if rows.is_empty() {
        return Err(anyhow!(
            "no cached payloads for bucket {}; warm the cache first",
            bucket.prefix()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        zip.start_file(format!("{}/{}", PAYLOAD_DIR, row.asset_id), opts)?;
        zip.write_all(&row.payload)?;
        entries.push(json!({
            "assetId": row.asset_id,
            "name": row.name,
            "mimeType": row.mime_type,
            "size": row.size,
            "sha256": row.sha256,
        }));
    }

    let manifest = json!({
        "bundleFormat": BUNDLE_FORMAT_V1,
        "bucket": { "year": bucket.year, "month": bucket.month },
        "entries": entries,
    });
    zip.start_file(MANIFEST_ENTRY, opts)?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;
    zip.finish()?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: rows.len(),
    })
}

/// Restore a bundle's payloads into the cache. Entries failing their digest
/// check are skipped and reported; the rest are upserted.
pub fn import_gallery_bundle(conn: &Connection, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file)?;

    let manifest: serde_json::Value = {
        let mut entry = archive
            .by_name(MANIFEST_ENTRY)
            .map_err(|_| anyhow!("bundle has no {}", MANIFEST_ENTRY))?;
        let mut raw = String::new();
        entry.read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    };

    let format = manifest
        .get("bundleFormat")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {:?}", format));
    }
    let bucket = {
        let year = manifest
            .pointer("/bucket/year")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("manifest bucket.year missing"))?;
        let month = manifest
            .pointer("/bucket/month")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("manifest bucket.month missing"))?;
        BucketKey::new(year as u16, month as u8)?
    };
    let entries = manifest
        .get("entries")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut restored_count = 0usize;
    let mut skipped = Vec::new();
    for entry in &entries {
        let asset_id = entry.get("assetId").and_then(|v| v.as_str()).unwrap_or("");
        let name = entry.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let mime_type = entry
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or("application/octet-stream");
        let expected_sha = entry.get("sha256").and_then(|v| v.as_str()).unwrap_or("");
        if asset_id.is_empty() || name.is_empty() {
            skipped.push(format!("{}: incomplete manifest entry", asset_id));
            continue;
        }

        let mut payload = Vec::new();
        match archive.by_name(&format!("{}/{}", PAYLOAD_DIR, asset_id)) {
            Ok(mut file) => {
                file.read_to_end(&mut payload)?;
            }
            Err(_) => {
                skipped.push(format!("{}: payload entry missing", asset_id));
                continue;
            }
        }
        let digest = format!("{:x}", Sha256::digest(&payload));
        if digest != expected_sha {
            skipped.push(format!("{}: digest mismatch", asset_id));
            continue;
        }

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
                asset_id,
                bucket.prefix(),
                name,
                mime_type,
                payload.len() as i64,
                digest,
                &payload,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        restored_count += 1;
    }

    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
        restored_count,
        skipped,
    })
}

fn read_bucket_rows(conn: &Connection, bucket: BucketKey) -> anyhow::Result<Vec<CacheRow>> {
    let mut stmt = conn.prepare(
        "SELECT asset_id, name, mime_type, size, sha256, payload
         FROM gallery_cache
         WHERE bucket = ?
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([bucket.prefix()], |r| {
            Ok(CacheRow {
                asset_id: r.get(0)?,
                name: r.get(1)?,
                mime_type: r.get(2)?,
                size: r.get(3)?,
                sha256: r.get(4)?,
                payload: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

use crate::gallery::name::{encode, BucketKey, ImageExt, NameError};
use crate::gallery::parse_member;
use crate::remote::{RemoteFile, RemoteStore};

/// What the caller wants uploaded: an optional raw slug (normalized by the
/// codec) and the image extension. Rank and final name come from the
/// allocator.
#[derive(Debug, Clone)]
pub struct UploadSpec {
    pub slug: Option<String>,
    pub extension: ImageExt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub rank: u8,
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConflict {
    pub target_name: String,
    pub existing: String,
}

/// Intended targets plus every collision with the current listing. Callers
/// must get explicit confirmation for a plan with conflicts before any
/// upload proceeds.
#[derive(Debug)]
pub struct UploadPlan {
    pub bucket: BucketKey,
    pub targets: Vec<PlannedUpload>,
    pub conflicts: Vec<UploadConflict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// A requested rank fell outside the two-digit field.
    RankRange(u32),
    InvalidName(NameError),
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocError::RankRange(r) => write!(f, "rank {} outside 1..=99", r),
            AllocError::InvalidName(e) => write!(f, "cannot derive target name: {}", e),
        }
    }
}

impl std::error::Error for AllocError {}

/// Ranks for `count` new assets: consecutive from `max(existing) + 1` (1 for
/// an empty bucket), or verbatim from `explicit_start` regardless of
/// occupancy.
pub fn next_ranks(
    full_listing: &[RemoteFile],
    bucket: BucketKey,
    count: usize,
    explicit_start: Option<u32>,
) -> Result<Vec<u8>, AllocError> {
    let start = match explicit_start {
        Some(s) => s,
        None => full_listing
            .iter()
            .filter_map(|f| parse_member(&f.name).filter(|p| p.bucket() == bucket))
            .map(|p| p.rank as u32)
            .max()
            .map_or(1, |m| m + 1),
    };

    let mut ranks = Vec::with_capacity(count);
    for i in 0..count {
        let rank = start + i as u32;
        if !(1..=99).contains(&rank) {
            return Err(AllocError::RankRange(rank));
        }
        ranks.push(rank as u8);
    }
    Ok(ranks)
}

/// Compute the intended target names and check them (case-insensitively)
/// against the current listing. No upload happens here.
pub fn plan_uploads(
    full_listing: &[RemoteFile],
    bucket: BucketKey,
    specs: &[UploadSpec],
    explicit_start: Option<u32>,
) -> Result<UploadPlan, AllocError> {
    let ranks = next_ranks(full_listing, bucket, specs.len(), explicit_start)?;

    let mut targets = Vec::with_capacity(specs.len());
    for (spec, rank) in specs.iter().zip(ranks) {
        let target_name = encode(bucket, rank as u32, spec.slug.as_deref(), spec.extension)
            .map_err(AllocError::InvalidName)?;
        targets.push(PlannedUpload { rank, target_name });
    }

    let mut conflicts = Vec::new();
    for target in &targets {
        let lower = target.target_name.to_lowercase();
        for file in full_listing {
            if file.name.to_lowercase() == lower {
                conflicts.push(UploadConflict {
                    target_name: target.target_name.clone(),
                    existing: file.name.clone(),
                });
            }
        }
    }

    Ok(UploadPlan {
        bucket,
        targets,
        conflicts,
    })
}

#[derive(Debug, Clone)]
pub struct UploadItem {
    pub target_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded { asset_id: String },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub target_name: String,
    pub status: UploadStatus,
}

/// Execute planned uploads one by one. A collision discovered only now (a
/// race since planning) fails that single upload; there is no retry and no
/// alternate rank.
pub fn execute_uploads(
    remote: &dyn RemoteStore,
    auth_token: &str,
    items: Vec<UploadItem>,
) -> Vec<UploadOutcome> {
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let status = match remote.upload(&item.bytes, &item.target_name, auth_token) {
            Ok(asset_id) => UploadStatus::Uploaded { asset_id },
            Err(e) => UploadStatus::Failed(e.to_string()),
        };
        outcomes.push(UploadOutcome {
            target_name: item.target_name,
            status,
        });
    }
    outcomes
}

use std::collections::HashMap;

use crate::gallery::cache::CachedBucket;
use crate::gallery::overlay::OverlayState;
use crate::remote::RemoteFile;

/// Fallback ordering for assets the overlay does not pin, lexicographic by
/// canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDirection {
    Ascending,
    Descending,
}

impl FallbackDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(FallbackDirection::Ascending),
            "desc" => Some(FallbackDirection::Descending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    RemoteDirect,
    CachePayload,
}

impl OriginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginKind::RemoteDirect => "remote-direct",
            OriginKind::CachePayload => "cache-payload",
        }
    }
}

/// A listing row enriched with the store's optimistic reference, so the view
/// computation itself stays pure.
#[derive(Debug, Clone)]
pub struct ListedAsset {
    pub file: RemoteFile,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ViewPayload {
    Cached {
        mime_type: String,
        sha256: String,
        bytes: Vec<u8>,
    },
    /// Optimistic direct reference; `None` when the store serves no public
    /// references (callers render a placeholder).
    Direct { reference: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ViewAsset {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub origin: OriginKind,
    pub payload: ViewPayload,
}

/// Merge the remote listing with the cache snapshot, apply the overlay, and
/// return the final ordered sequence.
///
/// The remote listing is authoritative for existence: cache rows without a
/// listing entry are dropped, and overlay entries referencing absent ids are
/// silently ignored. Ordering is deterministic — featured first, then assets
/// in override order, then the rest by name (direction per caller) with id as
/// the tiebreak.
pub fn view(
    listing: &[ListedAsset],
    cache: &CachedBucket,
    overlay: &OverlayState,
    direction: FallbackDirection,
) -> Vec<ViewAsset> {
    let mut merged: Vec<ViewAsset> = Vec::with_capacity(listing.len());
    for asset in listing {
        let file = &asset.file;
        if overlay.hides(&file.id, &file.name) {
            continue;
        }
        let (origin, payload) = match cache.payloads.get(&file.id) {
            Some(entry) => (
                OriginKind::CachePayload,
                ViewPayload::Cached {
                    mime_type: entry.mime_type.clone(),
                    sha256: entry.sha256.clone(),
                    bytes: entry.bytes.clone(),
                },
            ),
            None => (
                OriginKind::RemoteDirect,
                ViewPayload::Direct {
                    reference: asset.reference.clone(),
                },
            ),
        };
        merged.push(ViewAsset {
            id: file.id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            origin,
            payload,
        });
    }

    let featured = overlay
        .featured
        .as_deref()
        .filter(|id| merged.iter().any(|a| a.id == *id));
    let positions: HashMap<&str, usize> = overlay
        .order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut front: Vec<ViewAsset> = Vec::new();
    let mut pinned: Vec<(usize, ViewAsset)> = Vec::new();
    let mut rest: Vec<ViewAsset> = Vec::new();
    for asset in merged {
        if Some(asset.id.as_str()) == featured {
            front.push(asset);
        } else if let Some(pos) = positions.get(asset.id.as_str()) {
            pinned.push((*pos, asset));
        } else {
            rest.push(asset);
        }
    }

    pinned.sort_by_key(|(pos, _)| *pos);
    rest.sort_by(|a, b| {
        let by_name = match direction {
            FallbackDirection::Ascending => a.name.cmp(&b.name),
            FallbackDirection::Descending => b.name.cmp(&a.name),
        };
        by_name.then_with(|| a.id.cmp(&b.id))
    });

    front.extend(pinned.into_iter().map(|(_, a)| a));
    front.extend(rest);
    front
}

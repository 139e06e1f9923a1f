//! Multi-stage duplicate clustering: timestamp identity, content identity,
//! and perceptual similarity, each stage fed only the images the previous
//! stage left unprocessed. Keeper selection and group persistence happen at
//! the end of every stage so one failing group never blocks the next.

use std::collections::HashSet;

use crate::catalog::Catalog;
use crate::domain::{GroupKind, ImageRecord};
use crate::hasher::{hamming_distance, hex_to_hash};

/// Outcome of one detector run: how many groups of each kind were formed and
/// how many images ended up marked for removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionSummary {
    pub timestamp_groups: usize,
    pub hash_groups: usize,
    pub perceptual_groups: usize,
    pub images_marked: usize,
}

/// Run all three clustering stages against the catalog's current contents
/// and persist the resulting groups and removal marks.
///
/// `now` is an ISO-8601 timestamp supplied by the caller (the orchestrator),
/// since this module must stay free of wall-clock reads to keep stages
/// deterministic and testable.
pub fn run(catalog: &Catalog, threshold: u32, now: &str) -> crate::error::Result<DetectionSummary> {
    let mut processed: HashSet<i64> = HashSet::new();
    let mut summary = DetectionSummary::default();

    for (_, members) in catalog.images_by_timestamp()? {
        let members: Vec<_> = members
            .into_iter()
            .filter(|m| !processed.contains(&m.id))
            .collect();
        if members.len() < 2 {
            continue;
        }
        let ids: Vec<i64> = members.iter().map(|m| m.id).collect();
        match persist_group(catalog, GroupKind::Timestamp, None, &members, now) {
            Ok(()) => {
                summary.timestamp_groups += 1;
                summary.images_marked += members.len().saturating_sub(1);
            }
            Err(e) => {
                tracing::error!(error = %e, group_size = members.len(), "failed to persist timestamp group");
            }
        }
        processed.extend(ids);
    }

    for (_, members) in catalog.images_by_content_hash()? {
        let members: Vec<_> = members
            .into_iter()
            .filter(|m| !processed.contains(&m.id))
            .collect();
        if members.len() < 2 {
            continue;
        }
        let ids: Vec<i64> = members.iter().map(|m| m.id).collect();
        match persist_group(catalog, GroupKind::Hash, None, &members, now) {
            Ok(()) => {
                summary.hash_groups += 1;
                summary.images_marked += members.len().saturating_sub(1);
            }
            Err(e) => {
                tracing::error!(error = %e, group_size = members.len(), "failed to persist hash group");
            }
        }
        processed.extend(ids);
    }

    let candidates: Vec<ImageRecord> = catalog
        .images_with_perceptual_hashes()?
        .into_iter()
        .filter(|m| !processed.contains(&m.id))
        .collect();

    for cluster in cluster_perceptual(candidates, threshold) {
        if cluster.len() < 2 {
            continue;
        }
        let score = mean_pairwise_distance(&cluster);
        let ids: Vec<i64> = cluster.iter().map(|m| m.id).collect();
        match persist_group(catalog, GroupKind::Perceptual, Some(score), &cluster, now) {
            Ok(()) => {
                summary.perceptual_groups += 1;
                summary.images_marked += cluster.len().saturating_sub(1);
            }
            Err(e) => {
                tracing::error!(error = %e, group_size = cluster.len(), "failed to persist perceptual group");
            }
        }
        processed.extend(ids);
    }

    Ok(summary)
}

/// The hash this image should be compared with for perceptual clustering:
/// `perceptual_hash`, falling back to `average_hash`, then `difference_hash`.
fn primary_hash(image: &ImageRecord) -> Option<u64> {
    image
        .perceptual_hash
        .as_deref()
        .and_then(hex_to_hash)
        .or_else(|| image.average_hash.as_deref().and_then(hex_to_hash))
        .or_else(|| image.difference_hash.as_deref().and_then(hex_to_hash))
}

/// Greedy connected-component clustering: pop a seed, then repeatedly absorb
/// any remaining candidate within `threshold` of *any* current cluster
/// member, until no more absorb. Pool order is the catalog's `file_path`
/// order, so clustering is deterministic.
fn cluster_perceptual(candidates: Vec<ImageRecord>, threshold: u32) -> Vec<Vec<ImageRecord>> {
    let mut pool: Vec<(ImageRecord, u64)> = candidates
        .into_iter()
        .filter_map(|img| primary_hash(&img).map(|h| (img, h)))
        .collect();

    let mut clusters = Vec::new();

    while !pool.is_empty() {
        let (seed, seed_hash) = pool.remove(0);
        let mut cluster_hashes = vec![seed_hash];
        let mut cluster = vec![seed];

        loop {
            let mut absorbed = false;
            let mut i = 0;
            while i < pool.len() {
                let (_, candidate_hash) = &pool[i];
                let within = cluster_hashes
                    .iter()
                    .any(|&h| hamming_distance(h, *candidate_hash) <= threshold);
                if within {
                    let (member, hash) = pool.remove(i);
                    cluster_hashes.push(hash);
                    cluster.push(member);
                    absorbed = true;
                } else {
                    i += 1;
                }
            }
            if !absorbed {
                break;
            }
        }

        clusters.push(cluster);
    }

    clusters
}

fn mean_pairwise_distance(cluster: &[ImageRecord]) -> f64 {
    let hashes: Vec<u64> = cluster.iter().filter_map(primary_hash).collect();
    if hashes.len() < 2 {
        return 0.0;
    }
    let mut total = 0u32;
    let mut pairs = 0u32;
    for i in 0..hashes.len() {
        for j in (i + 1)..hashes.len() {
            total += hamming_distance(hashes[i], hashes[j]);
            pairs += 1;
        }
    }
    total as f64 / pairs as f64
}

/// Selection key: highest resolution, then largest file, then
/// shortest basename, then lexicographically smallest path.
fn keeper_sort_key(image: &ImageRecord) -> (i64, i64, usize, String) {
    let pixels = image.width as i64 * image.height as i64;
    (
        -pixels,
        -(image.file_size as i64),
        image.basename_len(),
        image.file_path.to_string_lossy().to_string(),
    )
}

fn select_keeper(members: &[ImageRecord]) -> usize {
    members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| keeper_sort_key(a).cmp(&keeper_sort_key(b)))
        .map(|(i, _)| i)
        .expect("group is non-empty")
}

fn persist_group(
    catalog: &Catalog,
    kind: GroupKind,
    similarity_score: Option<f64>,
    members: &[ImageRecord],
    now: &str,
) -> crate::error::Result<()> {
    let group_id = catalog.create_group(kind, similarity_score, now)?;
    let keeper_idx = select_keeper(members);

    for (i, member) in members.iter().enumerate() {
        let is_keeper = i == keeper_idx;
        catalog.add_to_group(group_id, member.id, is_keeper)?;
        if !is_keeper {
            catalog.mark_for_removal(member.id, kind.removal_reason())?;
        }
    }
    Ok(())
}

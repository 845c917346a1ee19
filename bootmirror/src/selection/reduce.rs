//! Retention capping and the greedy size-reduction loop.
//!
//! Selection happens in two stages. First every `(os, major.minor)` bucket
//! is capped at `max_per_name` newest versions. Then, while the aggregate
//! size still exceeds the budget, one image at a time is evicted: the
//! eviction group (`"{os}-{major}.{minor}"`) with the most members loses
//! its oldest version. Groups at or below `min_per_name` members are
//! immune, so the budget can end up exceeded; that is logged, not fatal.
//!
//! All grouping uses ordered maps so tie-breaking is deterministic: among
//! equally-sized groups the alphabetically first key wins, because a
//! strictly greater member count is required to displace the current
//! leader.

use std::collections::BTreeMap;

use tracing::warn;

use crate::entity::{sort_by_name_version, OsImage};

use super::SelectionPolicy;

/// Outcome of a single reduction step.
enum ReduceOutcome {
    /// One image was evicted; the new list and aggregate size.
    Reduced(Vec<OsImage>, u64),

    /// No group exceeds `min_per_name`; nothing can be evicted.
    Exhausted(Vec<OsImage>),
}

/// Apply the per-variant cap and the size-reduction loop.
///
/// Returns the selected images sorted by `(os, version)` ascending and
/// their aggregate size.
pub(crate) fn select_within_budget(
    eligible: Vec<OsImage>,
    policy: &SelectionPolicy,
) -> (Vec<OsImage>, u64) {
    let mut by_os: BTreeMap<String, BTreeMap<String, Vec<OsImage>>> = BTreeMap::new();
    for image in eligible {
        by_os
            .entry(image.os_name.clone())
            .or_default()
            .entry(image.major_minor())
            .or_default()
            .push(image);
    }

    let mut selected: Vec<OsImage> = Vec::new();
    let mut size_count = 0u64;

    for versions in by_os.into_values() {
        for mut bucket in versions.into_values() {
            bucket.sort_by(|a, b| b.version.cmp(&a.version));

            let take = policy.max_per_name.unwrap_or(bucket.len());
            for image in bucket.into_iter().take(take) {
                size_count += image.artifact.size;
                selected.push(image);
            }
        }
    }

    sort_by_name_version(&mut selected);

    while size_count >= policy.max_cache_size {
        match reduce(std::mem::take(&mut selected), size_count, policy.min_per_name) {
            ReduceOutcome::Reduced(images, reduced_size) => {
                selected = images;
                size_count = reduced_size;
            }
            ReduceOutcome::Exhausted(images) => {
                selected = images;
                warn!(
                    size = size_count,
                    budget = policy.max_cache_size,
                    "cannot reduce image selection any further, exceeding maximum cache size"
                );
                break;
            }
        }
    }

    (selected, size_count)
}

/// Evict the oldest image from the largest eligible eviction group.
fn reduce(images: Vec<OsImage>, size_count: u64, min_per_name: usize) -> ReduceOutcome {
    let mut groups: BTreeMap<String, Vec<OsImage>> = BTreeMap::new();
    for image in images {
        groups.entry(image.eviction_group()).or_default().push(image);
    }

    let mut biggest: Option<String> = None;
    let mut current_biggest = 1;
    for (key, members) in &groups {
        if members.len() > min_per_name && members.len() > current_biggest {
            current_biggest = members.len();
            biggest = Some(key.clone());
        }
    }

    let Some(key) = biggest else {
        return ReduceOutcome::Exhausted(rebuild(groups));
    };

    // Members arrive in version-ascending order, so the front is the oldest.
    let mut new_size = size_count;
    if let Some(members) = groups.get_mut(&key) {
        let evicted = members.remove(0);
        new_size = size_count.saturating_sub(evicted.artifact.size);
    }

    ReduceOutcome::Reduced(rebuild(groups), new_size)
}

fn rebuild(groups: BTreeMap<String, Vec<OsImage>>) -> Vec<OsImage> {
    let mut result: Vec<OsImage> = groups.into_values().flatten().collect();
    sort_by_name_version(&mut result);
    result
}

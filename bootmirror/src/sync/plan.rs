//! The per-cycle sync plan report.
//!
//! The plan is both an operator-facing table and a structured report
//! (serde-serializable) so collaborators can consume the same data the
//! logs show.

use std::fmt;

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::entity::CacheEntities;

/// What the materializer will do with one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Delete,
    Keep,
    Download,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Delete => write!(f, "delete"),
            PlanAction::Keep => write!(f, "keep"),
            PlanAction::Download => write!(f, "download"),
        }
    }
}

/// One row of the sync plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    /// Entity display identifier; empty for plain local files.
    pub id: String,

    /// Relative cache path.
    pub path: String,

    /// Entity size in bytes.
    pub size_bytes: u64,

    /// Planned action.
    pub action: PlanAction,
}

/// The complete plan for one artifact kind's cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub entries: Vec<PlanEntry>,

    /// Aggregate size of everything kept or downloaded.
    pub cache_size_after: u64,
}

impl SyncPlan {
    /// Assemble the plan from diff output, in delete/keep/download order.
    pub fn build(remove: &CacheEntities, keep: &CacheEntities, add: &CacheEntities) -> Self {
        let mut entries = Vec::with_capacity(remove.len() + keep.len() + add.len());
        let mut cache_size_after = 0u64;

        for entity in remove {
            entries.push(PlanEntry {
                id: String::new(),
                path: entity.sub_path().to_string(),
                size_bytes: entity.size(),
                action: PlanAction::Delete,
            });
        }

        for entity in keep {
            cache_size_after += entity.size();
            entries.push(PlanEntry {
                id: entity.name(),
                path: entity.sub_path().to_string(),
                size_bytes: entity.size(),
                action: PlanAction::Keep,
            });
        }

        for entity in add {
            cache_size_after += entity.size();
            entries.push(PlanEntry {
                id: entity.name(),
                path: entity.sub_path().to_string(),
                size_bytes: entity.size(),
                action: PlanAction::Download,
            });
        }

        Self {
            entries,
            cache_size_after,
        }
    }
}

#[derive(Tabled)]
struct Row {
    id: String,
    path: String,
    size: String,
    action: String,
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<Row> = self
            .entries
            .iter()
            .map(|entry| Row {
                id: entry.id.clone(),
                path: entry.path.clone(),
                size: human_size(entry.size_bytes),
                action: entry.action.to_string(),
            })
            .collect();

        write!(f, "{}", Table::new(rows))
    }
}

/// Render a byte count with a binary-unit suffix.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

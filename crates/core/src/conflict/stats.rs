//! Display statistics for merge results.
//!
//! These counts are informational only. They use a positional walk with a
//! set-membership test, which is cruder than both the merge algorithm and a
//! real LCS diff, and must never feed back into merge decisions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Aggregate counters attached to every [`MergeResult`](super::MergeResult).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Lines in the assembled merge output, marker lines included.
    pub total_lines: usize,
    /// Number of conflict blocks.
    pub conflict_blocks: usize,
    /// Added lines, summed over base->current and base->incoming.
    pub added_lines: usize,
    /// Removed lines, summed over base->current and base->incoming.
    pub removed_lines: usize,
}

/// Added/removed counts for a single old -> new comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineChanges {
    pub added: usize,
    pub removed: usize,
}

impl std::ops::Add for LineChanges {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            added: self.added + rhs.added,
            removed: self.removed + rhs.removed,
        }
    }
}

/// Count added and removed lines between `old` and `new`.
///
/// At each index where the two versions differ, the old line counts as
/// removed when it is non-empty and absent from `new`, and the new line
/// counts as added when it is non-empty and absent from `old`. Missing tail
/// lines read as empty.
pub fn line_changes(old: &str, new: &str) -> LineChanges {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let old_set: HashSet<&str> = old_lines.iter().copied().collect();
    let new_set: HashSet<&str> = new_lines.iter().copied().collect();

    let mut changes = LineChanges::default();
    for i in 0..old_lines.len().max(new_lines.len()) {
        let old_line = old_lines.get(i).copied().unwrap_or("");
        let new_line = new_lines.get(i).copied().unwrap_or("");
        if old_line == new_line {
            continue;
        }
        if !old_line.is_empty() && !new_set.contains(old_line) {
            changes.removed += 1;
        }
        if !new_line.is_empty() && !old_set.contains(new_line) {
            changes.added += 1;
        }
    }
    changes
}

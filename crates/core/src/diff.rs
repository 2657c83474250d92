//! Display diffs between two commits.
//!
//! Uses the `diffy` crate (Myers diff) to render a unified patch and count
//! additions and deletions. This is presentation only; merge decisions are
//! made by [`Merger`](crate::conflict::Merger).

use diffy::Line;
use serde::{Deserialize, Serialize};

/// A rendered diff between two versions of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    /// Unified diff text.
    pub patch: String,
    /// Lines present only in the new version.
    pub additions: usize,
    /// Lines present only in the old version.
    pub deletions: usize,
}

impl CommitDiff {
    /// Diff `old` against `new`.
    pub fn between(old: &str, new: &str) -> Self {
        let patch = diffy::create_patch(old, new);

        let mut additions = 0;
        let mut deletions = 0;
        for hunk in patch.hunks() {
            for line in hunk.lines() {
                match line {
                    Line::Insert(_) => additions += 1,
                    Line::Delete(_) => deletions += 1,
                    Line::Context(_) => {}
                }
            }
        }

        Self {
            patch: patch.to_string(),
            additions,
            deletions,
        }
    }

    /// Returns `true` if both versions are identical.
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

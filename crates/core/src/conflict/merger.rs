//! Three-way merge engine.
//!
//! Performs a line-indexed three-way merge between a base, "current" (the
//! target branch) and "incoming" (the source branch) version of a prompt.
//! Lines are compared by position, not aligned by content: an insertion or
//! deletion upstream shifts every later index. Callers relying on conflict
//! boundaries depend on this behaviour, so it is not upgraded to an LCS
//! alignment.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::markers;
use super::stats::{line_changes, MergeStats};
use crate::errors::MergeError;

/// Prefix of every generated conflict ID.
const CONFLICT_ID_PREFIX: &str = "conflict-";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inclusive line range of a rendered marker block inside merged content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpan {
    /// Index of the start marker line.
    pub start: usize,
    /// Index of the end marker line.
    pub end: usize,
}

/// How a single conflict block should be settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the current (target branch) lines.
    AcceptCurrent,
    /// Keep the incoming (source branch) lines.
    AcceptIncoming,
    /// Replace the block with caller-supplied lines.
    AcceptCustom(Vec<String>),
}

/// One contiguous run of lines where both sides changed differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBlock {
    /// Unique within one merge result (`conflict-0`, `conflict-1`, ...).
    pub id: String,
    /// First conflicting line index (0-based, inclusive).
    pub start_line: usize,
    /// Last conflicting line index (0-based, inclusive).
    pub end_line: usize,
    /// Current-side lines for the span.
    pub current_content: Vec<String>,
    /// Incoming-side lines for the span.
    pub incoming_content: Vec<String>,
    /// Base lines for the span; empty strings where base is shorter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_content: Option<Vec<String>>,
    /// Whether a resolution has been chosen.
    #[serde(default)]
    pub resolved: bool,
    /// Lines replacing the block once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Vec<String>>,
    /// Where the engine rendered this block in `merged_content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_span: Option<MarkerSpan>,
}

impl ConflictBlock {
    /// Number of base-aligned lines covered by the block.
    pub fn len(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Always `false`: a block spans at least one line.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Settle the block with `resolution`.
    pub fn resolve(&mut self, resolution: Resolution) {
        let lines = match resolution {
            Resolution::AcceptCurrent => self.current_content.clone(),
            Resolution::AcceptIncoming => self.incoming_content.clone(),
            Resolution::AcceptCustom(lines) => lines,
        };
        debug!(id = %self.id, lines = lines.len(), "conflict block resolved");
        self.resolution = Some(lines);
        self.resolved = true;
    }

    /// Drop a previously chosen resolution.
    pub fn unresolve(&mut self) {
        self.resolution = None;
        self.resolved = false;
    }

    /// The replacement lines, if the block is resolved.
    pub fn resolved_lines(&self) -> Option<&[String]> {
        match (&self.resolution, self.resolved) {
            (Some(lines), true) => Some(lines),
            _ => None,
        }
    }
}

/// The output of one merge invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// `true` iff `conflicts` is non-empty.
    pub has_conflicts: bool,
    /// Conflict blocks in ascending `start_line` order.
    pub conflicts: Vec<ConflictBlock>,
    /// Merged text; unresolved conflicts are embedded with markers.
    pub merged_content: String,
    /// Display statistics.
    pub stats: MergeStats,
}

impl MergeResult {
    /// Number of blocks still waiting for a resolution.
    pub fn unresolved_count(&self) -> usize {
        self.conflicts
            .iter()
            .filter(|c| c.resolved_lines().is_none())
            .count()
    }

    /// Look up a block by ID for resolution.
    pub fn conflict_mut(&mut self, id: &str) -> Option<&mut ConflictBlock> {
        self.conflicts.iter_mut().find(|c| c.id == id)
    }

    /// Apply the same resolution to every unresolved block.
    pub fn resolve_all(&mut self, resolution: Resolution) {
        for conflict in self.conflicts.iter_mut().filter(|c| !c.resolved) {
            conflict.resolve(resolution.clone());
        }
    }
}

/// Merge inputs as received from an untyped boundary (JSON, a form).
///
/// Every side must be present; an empty string is a meaningful value ("no
/// content"), an absent one is a caller bug and is rejected rather than
/// coerced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeInputs {
    pub base: Option<String>,
    pub current: Option<String>,
    pub incoming: Option<String>,
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Merge `current` and `incoming` against their common ancestor `base`.
    ///
    /// Always returns a [`MergeResult`]. Conflicting spans are rendered into
    /// `merged_content` between markers and listed in `conflicts`; the
    /// engine never picks a side for them.
    pub fn detect_conflicts(base: &str, current: &str, incoming: &str) -> MergeResult {
        let base_lines: Vec<&str> = base.split('\n').collect();
        let current_lines: Vec<&str> = current.split('\n').collect();
        let incoming_lines: Vec<&str> = incoming.split('\n').collect();

        let max_len = base_lines
            .len()
            .max(current_lines.len())
            .max(incoming_lines.len());

        info!(
            base_lines = base_lines.len(),
            current_lines = current_lines.len(),
            incoming_lines = incoming_lines.len(),
            "performing three-way merge"
        );

        let mut merged: Vec<String> = Vec::new();
        let mut conflicts: Vec<ConflictBlock> = Vec::new();

        let mut i = 0;
        while i < max_len {
            let base_line = line_at(&base_lines, i);
            let current_line = line_at(&current_lines, i);
            let incoming_line = line_at(&incoming_lines, i);

            if current_line == incoming_line {
                merged.push(current_line);
                i += 1;
                continue;
            }
            if current_line == base_line {
                // Only incoming changed.
                merged.push(incoming_line);
                i += 1;
                continue;
            }
            if incoming_line == base_line {
                // Only current changed.
                merged.push(current_line);
                i += 1;
                continue;
            }

            // Both sides changed the line differently.
            let mut block = ConflictBlock {
                id: format!("{}{}", CONFLICT_ID_PREFIX, conflicts.len()),
                start_line: i,
                end_line: i,
                current_content: vec![current_line],
                incoming_content: vec![incoming_line],
                base_content: Some(vec![base_line]),
                resolved: false,
                resolution: None,
                marker_span: None,
            };

            let mut j = i + 1;
            while j < max_len {
                let next_base = line_at(&base_lines, j);
                let next_current = line_at(&current_lines, j);
                let next_incoming = line_at(&incoming_lines, j);

                let still_differs = next_current != next_incoming
                    && !(next_current == next_base && next_incoming == next_base);
                if !still_differs {
                    break;
                }

                block.end_line = j;
                block.current_content.push(next_current);
                block.incoming_content.push(next_incoming);
                if let Some(base_content) = block.base_content.as_mut() {
                    base_content.push(next_base);
                }
                j += 1;
            }

            let span_start = merged.len();
            let pushed =
                markers::push_block(&mut merged, &block.current_content, &block.incoming_content);
            block.marker_span = Some(MarkerSpan {
                start: span_start,
                end: span_start + pushed - 1,
            });

            debug!(
                id = %block.id,
                start_line = block.start_line,
                end_line = block.end_line,
                "conflict detected"
            );

            i = block.end_line + 1;
            conflicts.push(block);
        }

        let has_conflicts = !conflicts.is_empty();
        let total_lines = merged.len();

        let merged_content = if has_conflicts {
            merged.join("\n")
        } else if current != base {
            debug!("no conflicts, current side changed");
            current.to_string()
        } else {
            debug!("no conflicts, falling back to incoming side");
            incoming.to_string()
        };

        let changes = line_changes(base, current) + line_changes(base, incoming);
        let stats = MergeStats {
            total_lines,
            conflict_blocks: conflicts.len(),
            added_lines: changes.added,
            removed_lines: changes.removed,
        };

        info!(
            conflicts = conflicts.len(),
            total_lines, "three-way merge complete"
        );

        MergeResult {
            has_conflicts,
            conflicts,
            merged_content,
            stats,
        }
    }

    /// Merge inputs received from an untyped boundary.
    ///
    /// Fails with [`MergeError::MissingInput`] when any side is absent.
    pub fn merge_inputs(inputs: &MergeInputs) -> Result<MergeResult, MergeError> {
        let base = inputs
            .base
            .as_deref()
            .ok_or(MergeError::MissingInput { side: "base" })?;
        let current = inputs
            .current
            .as_deref()
            .ok_or(MergeError::MissingInput { side: "current" })?;
        let incoming = inputs
            .incoming
            .as_deref()
            .ok_or(MergeError::MissingInput { side: "incoming" })?;
        Ok(Self::detect_conflicts(base, current, incoming))
    }

    /// Quick check: would these three versions merge without conflicts?
    pub fn can_auto_merge(base: &str, current: &str, incoming: &str) -> bool {
        if current == base || incoming == base || current == incoming {
            return true;
        }
        !Self::detect_conflicts(base, current, incoming).has_conflicts
    }
}

/// Line `idx` of `lines`, or an empty line past the end.
fn line_at(lines: &[&str], idx: usize) -> String {
    lines.get(idx).copied().unwrap_or("").to_string()
}

//! Conflict resolution.
//!
//! The [`ConflictResolver`] turns marker-annotated merge output back into
//! plain text once the caller has chosen a [`Resolution`](super::Resolution)
//! for some or all conflict blocks.
//!
//! Blocks are located by the [`MarkerSpan`] the merge engine recorded for
//! them, not by searching the text, so several identical conflicts are each
//! replaced at their own position. Spans refer to the engine's original
//! `merged_content`; resolve every block against that text in one call.

use tracing::{debug, info, warn};

use super::markers::{self, END_MARKER, START_MARKER};
use super::merger::{ConflictBlock, MarkerSpan, MergeResult};
use crate::errors::MergeError;

/// Stateless conflict resolution operations.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Replace the marker block of every resolved conflict in
    /// `original_content` with its resolution lines.
    ///
    /// Unresolved conflicts keep their markers. Blocks are spliced from the
    /// bottom of the text upwards so earlier positions stay valid.
    ///
    /// A block without a recorded span (e.g. deserialised from an older
    /// client) is matched to the n-th marker block in the text, n being its
    /// rank by `start_line` among all supplied conflicts.
    pub fn resolve_conflicts(
        original_content: &str,
        conflicts: &[ConflictBlock],
    ) -> Result<String, MergeError> {
        let mut lines: Vec<String> = original_content.split('\n').map(str::to_string).collect();

        let mut ranked: Vec<&ConflictBlock> = conflicts.iter().collect();
        ranked.sort_by_key(|c| c.start_line);

        let scanned = {
            let view: Vec<&str> = lines.iter().map(String::as_str).collect();
            markers::find_blocks(&view)
        };

        let mut splices: Vec<(MarkerSpan, &[String], &str)> = Vec::new();
        for (rank, conflict) in ranked.iter().enumerate() {
            let Some(resolution) = conflict.resolved_lines() else {
                continue;
            };
            let span = match conflict.marker_span {
                Some(span) => {
                    check_span(&lines, span, &conflict.id)?;
                    span
                }
                None => {
                    let (start, end) = scanned
                        .get(rank)
                        .copied()
                        .ok_or_else(|| MergeError::MarkerBlockNotFound(conflict.id.clone()))?;
                    warn!(id = %conflict.id, start, end, "conflict has no marker span, matched by scan");
                    MarkerSpan { start, end }
                }
            };
            splices.push((span, resolution, conflict.id.as_str()));
        }

        splices.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        for window in splices.windows(2) {
            let (upper, lower) = (&window[0], &window[1]);
            if lower.0.end >= upper.0.start {
                return Err(MergeError::MarkerSpanMismatch {
                    id: upper.2.to_string(),
                    start: upper.0.start,
                    end: upper.0.end,
                });
            }
        }

        for (span, resolution, id) in &splices {
            debug!(id, start = span.start, end = span.end, "splicing resolution");
            lines.splice(span.start..=span.end, resolution.iter().cloned());
        }

        info!(
            resolved = splices.len(),
            total = conflicts.len(),
            "applied conflict resolutions"
        );
        Ok(lines.join("\n"))
    }

    /// Produce the final text of a merge whose conflicts are all resolved.
    pub fn assemble(result: &MergeResult) -> Result<String, MergeError> {
        if !result.has_conflicts {
            return Ok(result.merged_content.clone());
        }
        let unresolved = result.unresolved_count();
        if unresolved > 0 {
            debug!(unresolved, "cannot assemble merge with open conflicts");
            return Err(MergeError::ConflictsUnresolved);
        }
        Self::resolve_conflicts(&result.merged_content, &result.conflicts)
    }
}

/// Verify that `span` still brackets a marker block in `lines`.
fn check_span(lines: &[String], span: MarkerSpan, id: &str) -> Result<(), MergeError> {
    let brackets = span.start < span.end
        && span.end < lines.len()
        && lines[span.start].contains(START_MARKER)
        && lines[span.end].contains(END_MARKER);
    if brackets {
        Ok(())
    } else {
        Err(MergeError::MarkerSpanMismatch {
            id: id.to_string(),
            start: span.start,
            end: span.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::markers::has_unresolved_conflicts;
    use crate::conflict::{Merger, Resolution};

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_single_conflict() {
        let mut result = Merger::detect_conflicts("1\n2\n3", "a\nb\n3", "x\ny\n3");
        result.conflicts[0].resolve(Resolution::AcceptIncoming);

        let text = ConflictResolver::resolve_conflicts(&result.merged_content, &result.conflicts)
            .unwrap();
        assert_eq!(text, "x\ny\n3");
    }

    #[test]
    fn test_round_trip_leaves_no_markers() {
        let mut result = Merger::detect_conflicts(
            "h\n1\nm\n2\nt",
            "h\nA\nm\nB\nt",
            "h\nX\nm\nY\nt",
        );
        assert_eq!(result.conflicts.len(), 2);
        result.conflicts[0].resolve(Resolution::AcceptCurrent);
        result.conflicts[1].resolve(Resolution::AcceptCustom(lines(&["B", "Y"])));

        let text = ConflictResolver::assemble(&result).unwrap();
        assert!(!has_unresolved_conflicts(&text));
        assert_eq!(text, "h\nA\nm\nB\nY\nt");
    }

    #[test]
    fn test_identical_conflicts_resolved_in_place() {
        // Two blocks with the same content: each resolution must land on its
        // own block, not on the first match in the text.
        let mut result = Merger::detect_conflicts("1\n=\n1", "a\n=\na", "b\n=\nb");
        assert_eq!(result.conflicts.len(), 2);
        result.conflicts[0].resolve(Resolution::AcceptCustom(lines(&["first"])));
        result.conflicts[1].resolve(Resolution::AcceptCustom(lines(&["second"])));

        let text = ConflictResolver::assemble(&result).unwrap();
        assert_eq!(text, "first\n=\nsecond");
    }

    #[test]
    fn test_unresolved_blocks_keep_markers() {
        let mut result = Merger::detect_conflicts("1\n=\n2", "a\n=\nb", "x\n=\ny");
        result.conflicts[1].resolve(Resolution::AcceptIncoming);

        let text = ConflictResolver::resolve_conflicts(&result.merged_content, &result.conflicts)
            .unwrap();
        assert!(has_unresolved_conflicts(&text));
        assert!(text.starts_with(START_MARKER));
        assert!(text.ends_with("=\ny"));
    }

    #[test]
    fn test_assemble_rejects_open_conflicts() {
        let result = Merger::detect_conflicts("x", "y", "z");
        let err = ConflictResolver::assemble(&result).unwrap_err();
        assert!(matches!(err, MergeError::ConflictsUnresolved));
    }

    #[test]
    fn test_assemble_clean_merge() {
        let result = Merger::detect_conflicts("a", "a", "b");
        assert_eq!(ConflictResolver::assemble(&result).unwrap(), "b");
    }

    #[test]
    fn test_empty_resolution_removes_block() {
        let mut result = Merger::detect_conflicts("k\n1", "k\na", "k\nb");
        result.conflicts[0].resolve(Resolution::AcceptCustom(Vec::new()));
        assert_eq!(ConflictResolver::assemble(&result).unwrap(), "k");
    }

    #[test]
    fn test_blocks_without_span_fall_back_to_scan_order() {
        let mut result = Merger::detect_conflicts("1\n=\n2", "a\n=\nb", "x\n=\ny");
        for conflict in &mut result.conflicts {
            conflict.marker_span = None;
        }
        result.conflicts[0].resolve(Resolution::AcceptIncoming);
        result.conflicts[1].resolve(Resolution::AcceptCurrent);

        let text = ConflictResolver::assemble(&result).unwrap();
        assert_eq!(text, "x\n=\nb");
    }

    #[test]
    fn test_stale_span_is_rejected() {
        let mut result = Merger::detect_conflicts("x", "y", "z");
        result.conflicts[0].resolve(Resolution::AcceptCurrent);

        let edited = format!("prefix\n{}", result.merged_content);
        let err = ConflictResolver::resolve_conflicts(&edited, &result.conflicts).unwrap_err();
        assert!(matches!(err, MergeError::MarkerSpanMismatch { .. }));
    }

    #[test]
    fn test_missing_block_is_reported() {
        let mut block = Merger::detect_conflicts("x", "y", "z").conflicts.remove(0);
        block.marker_span = None;
        block.resolve(Resolution::AcceptCurrent);

        let err = ConflictResolver::resolve_conflicts("no markers here", &[block]).unwrap_err();
        assert!(matches!(err, MergeError::MarkerBlockNotFound(ref id) if id == "conflict-0"));
    }
}

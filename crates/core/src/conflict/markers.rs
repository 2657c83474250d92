//! Conflict marker rendering and detection.
//!
//! The marker tokens are fixed strings shared by the formatter, the resolver
//! and the scanner. They must be emitted verbatim so that annotated text
//! round-trips through [`ConflictResolver`](super::ConflictResolver).

/// Opens a conflict block; the current-side lines follow.
pub const START_MARKER: &str = "<<<<<<< 当前分支";
/// Separates the current-side lines from the incoming-side lines.
pub const SEPARATOR_MARKER: &str = "=======";
/// Closes a conflict block.
pub const END_MARKER: &str = ">>>>>>> 传入分支";

/// Prefixes that flag unresolved content when found anywhere in a text.
const SCAN_TOKENS: [&str; 3] = ["<<<<<<< ", "=======", ">>>>>>> "];

/// Append a marker-wrapped conflict block to `out`.
///
/// Returns the number of lines pushed (both sides plus three marker lines).
pub fn push_block(out: &mut Vec<String>, current: &[String], incoming: &[String]) -> usize {
    out.push(START_MARKER.to_string());
    out.extend(current.iter().cloned());
    out.push(SEPARATOR_MARKER.to_string());
    out.extend(incoming.iter().cloned());
    out.push(END_MARKER.to_string());
    current.len() + incoming.len() + 3
}

/// Render a single conflict block as text.
pub fn render_block(current: &[String], incoming: &[String]) -> String {
    let mut lines = Vec::with_capacity(current.len() + incoming.len() + 3);
    push_block(&mut lines, current, incoming);
    lines.join("\n")
}

/// Returns `true` if `content` still contains any conflict marker.
///
/// Matching is by substring, not whole line, so a genuine marker is never
/// missed at the cost of occasional false positives (e.g. a markdown rule
/// made of `=======`).
pub fn has_unresolved_conflicts(content: &str) -> bool {
    SCAN_TOKENS.iter().any(|token| content.contains(token))
}

/// Locate every marker block in `lines`.
///
/// Each returned pair holds the inclusive line indices of a start marker and
/// the next end marker after it. A start marker without a matching end is
/// ignored.
pub fn find_blocks(lines: &[&str]) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut open: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if line.contains(START_MARKER) {
            open = Some(idx);
        } else if line.contains(END_MARKER) {
            if let Some(start) = open.take() {
                blocks.push((start, idx));
            }
        }
    }

    blocks
}

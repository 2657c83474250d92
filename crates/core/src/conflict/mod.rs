//! Three-way merging, conflict markers, and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Merging** -- line-indexed three-way merge of base, current and incoming text.
//! 2. **Marking** -- rendering conflicting spans between sentinel markers and
//!    scanning text for leftover markers.
//! 3. **Resolution** -- splicing chosen resolutions back into marked-up text.
//! 4. **Statistics** -- display-only added/removed counts.

pub mod markers;
pub mod merger;
pub mod resolver;
pub mod stats;

pub use markers::has_unresolved_conflicts;
pub use merger::{ConflictBlock, MarkerSpan, MergeInputs, MergeResult, Merger, Resolution};
pub use resolver::ConflictResolver;
pub use stats::{line_changes, LineChanges, MergeStats};

//! PromptMerge core library.
//!
//! This crate provides the foundational components for versioning prompt
//! documents: configuration, the SQLite commit store, three-way merge with
//! conflict detection and resolution, commit diffs, and the branch merge
//! workflow that ties them together.

pub mod config;
pub mod conflict;
pub mod db;
pub mod diff;
pub mod errors;
pub mod merge_workflow;
pub mod models;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{has_unresolved_conflicts, ConflictBlock, ConflictResolver, MergeResult, Merger};
pub use db::Database;
pub use errors::CoreError;
pub use merge_workflow::{MergeOutcome, MergeWorkflow};

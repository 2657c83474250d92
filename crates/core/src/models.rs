//! Domain model types used throughout PromptMerge.
//!
//! These types bridge the store, the merge workflow and the CLI. All of them
//! serialise with camelCase keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::MergeResult;

// ---------------------------------------------------------------------------
// Projects, branches, commits
// ---------------------------------------------------------------------------

/// A collection of branches holding versions of one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named line of commits within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub is_default: bool,
    /// Head of the branch; `None` until the first commit.
    pub last_commit_id: Option<String>,
    /// Commit the branch was forked from, if any.
    pub created_from_commit_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable version of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub branch_id: String,
    pub message: String,
    pub content: String,
    pub parent_commit_id: Option<String>,
    /// Hex SHA-256 of the content and creation time.
    pub commit_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Merge workflow shapes
// ---------------------------------------------------------------------------

/// Request to merge a source branch into `target_branch`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub target_branch: String,
    pub merge_message: String,
    /// Caller-resolved full text; when absent the merge engine decides.
    #[serde(default)]
    pub resolved_content: Option<String>,
}

/// Read-path answer to "can `source` be merged into `target`?".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCheck {
    pub can_merge: bool,
    pub has_conflicts: bool,
    pub merge_result: MergeResult,
    pub analysis: MergeAnalysis,
}

/// Context attached to a [`MergeCheck`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeAnalysis {
    pub source_branch: String,
    pub target_branch: String,
    /// Commits on the source branch.
    pub commits_ahead: i64,
    /// Commits on the target branch.
    pub commits_behind: i64,
    pub source_last_commit: Option<Commit>,
    pub target_last_commit: Option<Commit>,
    pub base_content: String,
    pub recommendations: Vec<String>,
}

/// Paging parameters for commit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Page {
    /// Rows to skip before this page.
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_request_json() {
        let req: MergeRequest = serde_json::from_str(
            r#"{"targetBranch":"main","mergeMessage":"merge feature"}"#,
        )
        .unwrap();
        assert_eq!(req.target_branch, "main");
        assert!(req.resolved_content.is_none());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::default().offset(), 0);
        assert_eq!(Page { page: 3, limit: 10 }.offset(), 20);
        assert_eq!(Page { page: 0, limit: 10 }.offset(), 0);
    }

    #[test]
    fn test_page_offset_saturates() {
        let page = Page {
            page: u32::MAX,
            limit: u32::MAX,
        };
        assert_eq!(page.offset(), u32::MAX);
    }
}

//! End-to-end tests for branch merges against a real SQLite store.
//!
//! Each test opens a file-backed database in a temp dir, builds a small
//! project history and drives the `MergeWorkflow` the way the CLI does.

use tempfile::TempDir;

use promptmerge_core::conflict::{has_unresolved_conflicts, Resolution};
use promptmerge_core::db::Database;
use promptmerge_core::errors::{CoreError, MergeError};
use promptmerge_core::models::MergeRequest;
use promptmerge_core::{AppConfig, MergeOutcome, MergeWorkflow};

// ===========================================================================
// Helpers
// ===========================================================================

struct Fixture {
    _dir: TempDir,
    workflow: MergeWorkflow,
    project_id: String,
}

/// Project with `main` holding "base" then "current" and `feature` forked
/// from the base commit holding "incoming".
fn diverged(base: &str, current: &str, incoming: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("promptmerge.db")).unwrap();
    db.initialize().unwrap();
    let project = db.create_project("assistant", None, "main").unwrap();

    let mut config = AppConfig::default();
    config.merge.trim_commit_content = false;
    let workflow = MergeWorkflow::new(config, db);

    let root = workflow.commit(&project.id, "main", "root", base).unwrap();
    workflow
        .db()
        .create_branch(&project.id, "feature", Some(&root.id))
        .unwrap();
    workflow.commit(&project.id, "main", "edit main", current).unwrap();
    workflow
        .commit(&project.id, "feature", "edit feature", incoming)
        .unwrap();

    Fixture {
        _dir: dir,
        workflow,
        project_id: project.id,
    }
}

fn request(resolved: Option<&str>) -> MergeRequest {
    MergeRequest {
        target_branch: "main".into(),
        merge_message: "merge feature".into(),
        resolved_content: resolved.map(str::to_string),
    }
}

fn main_head(fx: &Fixture) -> Option<String> {
    fx.workflow
        .db()
        .find_branch(&fx.project_id, "main")
        .unwrap()
        .unwrap()
        .last_commit_id
}

fn main_commit_count(fx: &Fixture) -> i64 {
    let main = fx
        .workflow
        .db()
        .find_branch(&fx.project_id, "main")
        .unwrap()
        .unwrap();
    fx.workflow.db().count_commits(&main.id).unwrap()
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn test_check_merge_reports_conflicts() {
    let fx = diverged("A\nB\nC", "A\nX\nC", "A\nY\nC");

    let check = fx
        .workflow
        .check_merge(&fx.project_id, "feature", "main")
        .unwrap();
    assert!(check.can_merge);
    assert!(check.has_conflicts);
    assert_eq!(check.merge_result.conflicts.len(), 1);
    assert_eq!(check.merge_result.conflicts[0].start_line, 1);
    assert_eq!(check.analysis.base_content, "A\nB\nC");
    assert_eq!(check.analysis.commits_ahead, 1);
    assert_eq!(check.analysis.commits_behind, 2);
    assert_eq!(check.analysis.recommendations[0], "merge conflicts present");
}

#[test]
fn test_conflicting_merge_writes_nothing() {
    let fx = diverged("A\nB\nC", "A\nX\nC", "A\nY\nC");
    let head_before = main_head(&fx);

    let outcome = fx
        .workflow
        .merge_branch(&fx.project_id, "feature", &request(None))
        .unwrap();
    let result = match outcome {
        MergeOutcome::Conflicts(result) => result,
        other => panic!("expected conflicts, got {other:?}"),
    };
    assert!(has_unresolved_conflicts(&result.merged_content));
    assert_eq!(main_head(&fx), head_before);
    assert_eq!(main_commit_count(&fx), 2);

    let audit = fx.workflow.db().list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "merge_conflict");
    assert!(!audit[0].success);
}

#[test]
fn test_resolved_content_with_markers_is_rejected() {
    let fx = diverged("A\nB\nC", "A\nX\nC", "A\nY\nC");
    let head_before = main_head(&fx);

    let check = fx
        .workflow
        .check_merge(&fx.project_id, "feature", "main")
        .unwrap();
    let err = fx
        .workflow
        .merge_branch(
            &fx.project_id,
            "feature",
            &request(Some(&check.merge_result.merged_content)),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Merge(MergeError::ConflictsUnresolved)));

    assert_eq!(main_head(&fx), head_before);
    assert_eq!(main_commit_count(&fx), 2);

    let audit = fx.workflow.db().list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "merge_rejected");
}

#[test]
fn test_clean_merge_advances_target() {
    let fx = diverged("A\nB\nC", "A\nB\nC", "A\nB\nC\nD");
    let head_before = main_head(&fx);

    let outcome = fx
        .workflow
        .merge_branch(&fx.project_id, "feature", &request(None))
        .unwrap();
    let (commit, target) = match outcome {
        MergeOutcome::Merged {
            commit,
            target_branch,
        } => (commit, target_branch),
        other => panic!("expected merge commit, got {other:?}"),
    };

    assert_eq!(commit.content, "A\nB\nC\nD");
    assert_eq!(commit.message, "merge feature");
    assert_eq!(commit.parent_commit_id, head_before);
    assert_eq!(target.last_commit_id.as_deref(), Some(commit.id.as_str()));
    assert_eq!(main_head(&fx).as_deref(), Some(commit.id.as_str()));
    assert_eq!(main_commit_count(&fx), 3);
}

#[test]
fn test_resolved_content_is_committed_verbatim() {
    let fx = diverged("A\nB\nC", "A\nX\nC", "A\nY\nC");

    let outcome = fx
        .workflow
        .merge_branch(&fx.project_id, "feature", &request(Some("A\nX and Y\nC")))
        .unwrap();
    match outcome {
        MergeOutcome::Merged { commit, .. } => assert_eq!(commit.content, "A\nX and Y\nC"),
        other => panic!("expected merge commit, got {other:?}"),
    }
}

#[test]
fn test_merge_from_block_resolutions() {
    let fx = diverged("A\nB\nC", "A\nX\nC", "A\nY\nC");

    let mut check = fx
        .workflow
        .check_merge(&fx.project_id, "feature", "main")
        .unwrap();
    check.merge_result.resolve_all(Resolution::AcceptIncoming);

    let outcome = fx
        .workflow
        .merge_resolved(
            &fx.project_id,
            "feature",
            "main",
            "take feature",
            &check.merge_result,
        )
        .unwrap();
    match outcome {
        MergeOutcome::Merged { commit, .. } => assert_eq!(commit.content, "A\nY\nC"),
        other => panic!("expected merge commit, got {other:?}"),
    }
}

#[test]
fn test_empty_block_resolution_is_committed() {
    let fx = diverged("A", "X", "Y");

    let mut check = fx
        .workflow
        .check_merge(&fx.project_id, "feature", "main")
        .unwrap();
    assert_eq!(check.merge_result.conflicts.len(), 1);
    check
        .merge_result
        .resolve_all(Resolution::AcceptCustom(Vec::new()));

    let outcome = fx
        .workflow
        .merge_resolved(&fx.project_id, "feature", "main", "drop both", &check.merge_result)
        .unwrap();
    let commit = match outcome {
        MergeOutcome::Merged { commit, .. } => commit,
        other => panic!("expected merge commit, got {other:?}"),
    };
    assert_eq!(commit.content, "");
    assert_eq!(main_head(&fx).as_deref(), Some(commit.id.as_str()));
    assert_eq!(main_commit_count(&fx), 3);
}

#[test]
fn test_revert_after_merge() {
    let fx = diverged("A\nB", "A\nB", "A\nB\nC");
    let before = main_head(&fx).unwrap();

    fx.workflow
        .merge_branch(&fx.project_id, "feature", &request(None))
        .unwrap();
    let revert = fx.workflow.revert(&fx.project_id, "main", &before).unwrap();

    assert_eq!(revert.content, "A\nB");
    assert!(revert.message.starts_with("Revert to: "));
    assert_eq!(main_head(&fx).as_deref(), Some(revert.id.as_str()));
    assert_eq!(main_commit_count(&fx), 4);
}

#[test]
fn test_store_survives_reopen() {
    let fx = diverged("v1", "v2", "v1");
    let path = fx._dir.path().join("promptmerge.db");

    let reopened = Database::new(&path).unwrap();
    reopened.initialize().unwrap();
    let projects = reopened.list_projects().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "assistant");
}

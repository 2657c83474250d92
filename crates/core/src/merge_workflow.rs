//! Branch merge workflow.
//!
//! The [`MergeWorkflow`] ties the merge engine to the commit store:
//!
//! 1. Read the source head, the target head and the base (parent of the
//!    target head).
//! 2. Run the three-way merge, or validate caller-resolved content.
//! 3. Commit the result onto the target branch, or hand the conflicts back.
//!
//! Steps 1-3 run inside one store transaction so a merge is never committed
//! against a head that moved after it was read. Retrying on contention means
//! calling [`MergeWorkflow::merge_branch`] again, which re-reads everything.

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::conflict::{has_unresolved_conflicts, ConflictResolver, MergeResult, Merger};
use crate::db::{queries, Database};
use crate::diff::CommitDiff;
use crate::errors::{CoreError, DatabaseError, MergeError};
use crate::models::{Branch, Commit, MergeAnalysis, MergeCheck, MergeRequest};

/// Result of a merge-commit attempt.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// A merge commit was written and the target head advanced.
    Merged {
        commit: Commit,
        target_branch: Branch,
    },
    /// The automatic merge hit conflicts; nothing was written.
    Conflicts(MergeResult),
}

/// The three texts fed to the merge engine for one branch pair.
struct MergeSides {
    source: Branch,
    target: Branch,
    source_head: Option<Commit>,
    target_head: Option<Commit>,
    base: String,
}

impl MergeSides {
    fn load(
        conn: &rusqlite::Connection,
        project_id: &str,
        source_name: &str,
        target_name: &str,
    ) -> Result<Self, DatabaseError> {
        let source = queries::require_branch(conn, project_id, source_name)?;
        let target = queries::require_branch(conn, project_id, target_name)?;
        let source_head = queries::head_commit(conn, &source)?;
        let target_head = queries::head_commit(conn, &target)?;

        let base = match target_head.as_ref().and_then(|c| c.parent_commit_id.as_deref()) {
            Some(parent_id) => queries::get_commit(conn, parent_id)?
                .map(|c| c.content)
                .unwrap_or_default(),
            None => String::new(),
        };

        Ok(Self {
            source,
            target,
            source_head,
            target_head,
            base,
        })
    }

    /// Current side: the target head's content.
    fn current(&self) -> &str {
        self.target_head.as_ref().map(|c| c.content.as_str()).unwrap_or("")
    }

    /// Incoming side: the source head's content.
    fn incoming(&self) -> &str {
        self.source_head.as_ref().map(|c| c.content.as_str()).unwrap_or("")
    }
}

/// Merge and commit operations over a project's branches.
pub struct MergeWorkflow {
    config: AppConfig,
    db: Database,
}

impl MergeWorkflow {
    pub fn new(config: AppConfig, db: Database) -> Self {
        Self { config, db }
    }

    /// Return a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Commit new prompt content on a branch.
    ///
    /// Message and content must be non-blank. Content is trimmed when
    /// `merge.trim_commit_content` is set.
    pub fn commit(
        &self,
        project_id: &str,
        branch_name: &str,
        message: &str,
        content: &str,
    ) -> Result<Commit, CoreError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(MergeError::InvalidRequest("commit message must not be empty".into()).into());
        }
        if content.trim().is_empty() {
            return Err(MergeError::InvalidRequest("commit content must not be empty".into()).into());
        }
        let content = if self.config.merge.trim_commit_content {
            content.trim()
        } else {
            content
        };
        self.check_size("commit", content)?;

        let commit = self.db.create_commit(project_id, branch_name, message, content)?;
        info!(id = %commit.id, branch = branch_name, "created commit");
        Ok(commit)
    }

    /// Analyse whether `source` can be merged into `target` without writing.
    pub fn check_merge(
        &self,
        project_id: &str,
        source_name: &str,
        target_name: &str,
    ) -> Result<MergeCheck, CoreError> {
        if target_name.is_empty() {
            return Err(MergeError::InvalidRequest("target branch must be specified".into()).into());
        }

        self.db.transaction(|conn| -> Result<MergeCheck, CoreError> {
            let sides = MergeSides::load(conn, project_id, source_name, target_name)?;
            self.check_sides(&sides)?;

            let can_merge = sides.source_head.is_some() && sides.source.name != sides.target.name;
            let merge_result = Merger::detect_conflicts(&sides.base, sides.current(), sides.incoming());
            let commits_ahead = queries::count_commits(conn, &sides.source.id)?;
            let commits_behind = queries::count_commits(conn, &sides.target.id)?;

            let recommendations = recommendations(can_merge, merge_result.has_conflicts);
            debug!(
                source = source_name,
                target = target_name,
                can_merge,
                has_conflicts = merge_result.has_conflicts,
                "merge check complete"
            );

            Ok(MergeCheck {
                can_merge,
                has_conflicts: merge_result.has_conflicts,
                merge_result,
                analysis: MergeAnalysis {
                    source_branch: source_name.to_string(),
                    target_branch: target_name.to_string(),
                    commits_ahead,
                    commits_behind,
                    source_last_commit: sides.source_head,
                    target_last_commit: sides.target_head,
                    base_content: sides.base,
                    recommendations,
                },
            })
        })
    }

    /// Merge `source_name` into `request.target_branch`.
    ///
    /// With `resolved_content` the text is committed as-is, unless it still
    /// contains conflict markers, in which case the merge is rejected with
    /// [`MergeError::ConflictsUnresolved`] and nothing is written. Without
    /// it the merge engine runs; conflicts are returned as
    /// [`MergeOutcome::Conflicts`] and nothing is committed.
    ///
    /// An empty `resolved_content` counts as absent.
    pub fn merge_branch(
        &self,
        project_id: &str,
        source_name: &str,
        request: &MergeRequest,
    ) -> Result<MergeOutcome, CoreError> {
        let (target_name, message) =
            validate_merge(source_name, &request.target_branch, &request.merge_message)?;
        let resolved = request.resolved_content.as_deref().filter(|c| !c.is_empty());
        self.merge_into(project_id, source_name, target_name, message, resolved)
    }

    /// Finish a conflicted merge from per-block resolutions.
    ///
    /// `result` must be the [`MergeResult`] returned for this branch pair
    /// with every conflict resolved. The assembled text is committed even
    /// when it is empty.
    pub fn merge_resolved(
        &self,
        project_id: &str,
        source_name: &str,
        target_name: &str,
        message: &str,
        result: &MergeResult,
    ) -> Result<MergeOutcome, CoreError> {
        let (target_name, message) = validate_merge(source_name, target_name, message)?;
        let content = ConflictResolver::assemble(result)?;
        self.merge_into(project_id, source_name, target_name, message, Some(&content))
    }

    fn merge_into(
        &self,
        project_id: &str,
        source_name: &str,
        target_name: &str,
        message: &str,
        resolved: Option<&str>,
    ) -> Result<MergeOutcome, CoreError> {
        info!(project_id, source = source_name, target = target_name, "merging branches");

        let outcome = self.db.transaction(|conn| -> Result<MergeOutcome, CoreError> {
            let sides = MergeSides::load(conn, project_id, source_name, target_name)?;
            if sides.source_head.is_none() {
                return Err(MergeError::SourceHasNoCommits(source_name.to_string()).into());
            }

            let final_content = match resolved {
                Some(content) => {
                    if has_unresolved_conflicts(content) {
                        return Err(MergeError::ConflictsUnresolved.into());
                    }
                    self.check_size("resolved", content)?;
                    content.to_string()
                }
                None => {
                    self.check_sides(&sides)?;
                    let result =
                        Merger::detect_conflicts(&sides.base, sides.current(), sides.incoming());
                    if result.has_conflicts {
                        queries::insert_audit_log(
                            conn,
                            "merge_conflict",
                            Some(project_id),
                            Some(&format!(
                                "{} -> {}: {} conflict block(s)",
                                source_name,
                                target_name,
                                result.conflicts.len()
                            )),
                            false,
                        )?;
                        return Ok(MergeOutcome::Conflicts(result));
                    }
                    result.merged_content
                }
            };

            let (commit, target_branch) =
                queries::insert_commit(conn, &sides.target, message, &final_content)?;
            queries::insert_audit_log(
                conn,
                "merge",
                Some(project_id),
                Some(&format!("{} -> {}: commit {}", source_name, target_name, commit.id)),
                true,
            )?;
            Ok(MergeOutcome::Merged {
                commit,
                target_branch,
            })
        });

        match &outcome {
            Ok(MergeOutcome::Merged { commit, .. }) => {
                info!(id = %commit.id, source = source_name, target = target_name, "merge committed");
            }
            Ok(MergeOutcome::Conflicts(result)) => {
                info!(conflicts = result.conflicts.len(), "merge stopped on conflicts");
            }
            Err(CoreError::Merge(MergeError::ConflictsUnresolved)) => {
                warn!(source = source_name, target = target_name, "rejected merge with unresolved markers");
                let details = format!("{} -> {}: unresolved markers", source_name, target_name);
                if let Err(e) = queries::insert_audit_log(
                    &self.db.conn(),
                    "merge_rejected",
                    Some(project_id),
                    Some(&details),
                    false,
                ) {
                    warn!(error = %e, "failed to record rejected merge");
                }
            }
            Err(e) => warn!(error = %e, "merge failed"),
        }
        outcome
    }

    /// Commit the content of an earlier commit of the branch as its new head.
    pub fn revert(
        &self,
        project_id: &str,
        branch_name: &str,
        commit_id: &str,
    ) -> Result<Commit, CoreError> {
        let commit = self.db.transaction(|conn| -> Result<Commit, CoreError> {
            let branch = queries::require_branch(conn, project_id, branch_name)?;
            let target = queries::get_commit(conn, commit_id)?
                .filter(|c| c.branch_id == branch.id)
                .ok_or_else(|| DatabaseError::not_found("commit", commit_id))?;

            let message = format!("Revert to: {}", target.message);
            let (commit, _) = queries::insert_commit(conn, &branch, &message, &target.content)?;
            queries::insert_audit_log(
                conn,
                "revert",
                Some(project_id),
                Some(&format!("{}: {} -> {}", branch_name, commit_id, commit.id)),
                true,
            )?;
            Ok(commit)
        })?;
        info!(id = %commit.id, branch = branch_name, reverted_to = commit_id, "reverted branch");
        Ok(commit)
    }

    /// Diff a commit against `against`, or against its parent by default.
    pub fn diff_commit(&self, commit_id: &str, against: Option<&str>) -> Result<CommitDiff, CoreError> {
        let commit = self
            .db
            .get_commit(commit_id)?
            .ok_or_else(|| DatabaseError::not_found("commit", commit_id))?;

        let old = match against.or(commit.parent_commit_id.as_deref()) {
            Some(id) => {
                self.db
                    .get_commit(id)?
                    .ok_or_else(|| DatabaseError::not_found("commit", id))?
                    .content
            }
            None => String::new(),
        };
        Ok(CommitDiff::between(&old, &commit.content))
    }

    fn check_sides(&self, sides: &MergeSides) -> Result<(), MergeError> {
        self.check_size("base", &sides.base)?;
        self.check_size("current", sides.current())?;
        self.check_size("incoming", sides.incoming())
    }

    fn check_size(&self, side: &'static str, content: &str) -> Result<(), MergeError> {
        match self.config.merge.max_content_bytes {
            Some(max) if content.len() > max => Err(MergeError::ContentTooLarge {
                side,
                len: content.len(),
                max,
            }),
            _ => Ok(()),
        }
    }
}

/// Check the fields of a merge request and return the trimmed target and
/// message.
fn validate_merge<'a>(
    source_name: &str,
    target_name: &'a str,
    message: &'a str,
) -> Result<(&'a str, &'a str), MergeError> {
    let target_name = target_name.trim();
    let message = message.trim();
    if target_name.is_empty() {
        return Err(MergeError::InvalidRequest("target branch must not be empty".into()));
    }
    if message.is_empty() {
        return Err(MergeError::InvalidRequest("merge message must not be empty".into()));
    }
    if source_name == target_name {
        return Err(MergeError::SameBranch(source_name.to_string()));
    }
    Ok((target_name, message))
}

/// Human-readable advice shown with a merge check.
fn recommendations(can_merge: bool, has_conflicts: bool) -> Vec<String> {
    let items: &[&str] = match (can_merge, has_conflicts) {
        (true, true) => &[
            "merge conflicts present",
            "resolve conflicts manually",
            "back up current work first",
        ],
        (true, false) => &["safe to merge", "no conflicts detected"],
        (false, _) => &[
            "source branch has no new commits",
            "commit changes on the source branch first",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

//! Typed query helpers for every table in the PromptMerge database.
//!
//! The free functions take a plain `&Connection` so they can run inside a
//! [`Database::transaction`] closure; the `impl Database` block wraps them
//! for one-shot use.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{Branch, Commit, Page, Project};

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub project_id: Option<String>,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: String,
}

const PROJECT_COLUMNS: &str = "id, name, description, default_branch, created_at, updated_at";
const BRANCH_COLUMNS: &str = "id, project_id, name, is_default, last_commit_id, \
     created_from_commit_id, created_at, updated_at";
const COMMIT_COLUMNS: &str =
    "id, branch_id, message, content, parent_commit_id, commit_hash, created_at";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Current time at the precision stored in the database.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn to_text(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        default_branch: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        is_default: row.get(3)?,
        last_commit_id: row.get(4)?,
        created_from_commit_id: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    Ok(Commit {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        message: row.get(2)?,
        content: row.get(3)?,
        parent_commit_id: row.get(4)?,
        commit_hash: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}

/// Hex SHA-256 identifying a commit's content at a point in time.
pub fn commit_hash(content: &str, at: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(to_text(at).as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

/// Insert a project together with its default branch.
pub fn insert_project(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    default_branch: &str,
) -> Result<Project, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM projects WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(DatabaseError::AlreadyExists {
            entity: "project".into(),
            name: name.to_string(),
        });
    }

    let at = now();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.map(str::to_string),
        default_branch: default_branch.to_string(),
        created_at: at,
        updated_at: at,
    };
    conn.execute(
        "INSERT INTO projects (id, name, description, default_branch, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            project.id,
            project.name,
            project.description,
            project.default_branch,
            to_text(&at),
            to_text(&at)
        ],
    )?;
    insert_branch(conn, &project.id, default_branch, None, true)?;

    debug!(id = %project.id, name, "inserted project");
    Ok(project)
}

pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>, DatabaseError> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], project_from_row)
        .optional()?)
}

pub fn find_project_by_name(conn: &Connection, name: &str) -> Result<Option<Project>, DatabaseError> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1");
    Ok(conn
        .query_row(&sql, params![name], project_from_row)
        .optional()?)
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>, DatabaseError> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC");
    let mut stmt = conn.prepare(&sql)?;
    let projects = stmt
        .query_map([], project_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

/// Delete a project; branches and commits go with it.
pub fn delete_project(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("project", id));
    }
    debug!(id, "deleted project");
    Ok(())
}

/// Rename a project and replace its description.
///
/// The name is trimmed and must stay unique; a blank description is stored
/// as `NULL`.
pub fn update_project(
    conn: &Connection,
    id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<Project, DatabaseError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DatabaseError::InvalidOperation(
            "project name must not be empty".into(),
        ));
    }
    let mut project = get_project(conn, id)?.ok_or_else(|| DatabaseError::not_found("project", id))?;
    if name != project.name && find_project_by_name(conn, name)?.is_some() {
        return Err(DatabaseError::AlreadyExists {
            entity: "project".into(),
            name: name.to_string(),
        });
    }

    let at = now();
    project.name = name.to_string();
    project.description = description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string);
    project.updated_at = at;
    conn.execute(
        "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![project.name, project.description, to_text(&at), id],
    )?;

    debug!(id, name, "updated project");
    Ok(project)
}

fn touch_project(conn: &Connection, id: &str, at: &DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
        params![to_text(at), id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// branches
// ---------------------------------------------------------------------------

/// Insert a branch, optionally forked from `from_commit_id`.
///
/// A forked branch starts with its head on the fork commit.
pub fn insert_branch(
    conn: &Connection,
    project_id: &str,
    name: &str,
    from_commit_id: Option<&str>,
    is_default: bool,
) -> Result<Branch, DatabaseError> {
    if find_branch(conn, project_id, name)?.is_some() {
        return Err(DatabaseError::AlreadyExists {
            entity: "branch".into(),
            name: name.to_string(),
        });
    }
    if let Some(commit_id) = from_commit_id {
        if get_commit(conn, commit_id)?.is_none() {
            return Err(DatabaseError::not_found("commit", commit_id));
        }
    }

    let at = now();
    let branch = Branch {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        is_default,
        last_commit_id: from_commit_id.map(str::to_string),
        created_from_commit_id: from_commit_id.map(str::to_string),
        created_at: at,
        updated_at: at,
    };
    conn.execute(
        "INSERT INTO branches (id, project_id, name, is_default, last_commit_id,
                               created_from_commit_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            branch.id,
            branch.project_id,
            branch.name,
            branch.is_default,
            branch.last_commit_id,
            branch.created_from_commit_id,
            to_text(&at),
            to_text(&at)
        ],
    )?;

    debug!(id = %branch.id, project_id, name, "inserted branch");
    Ok(branch)
}

/// Look up a branch by project and name.
pub fn find_branch(
    conn: &Connection,
    project_id: &str,
    name: &str,
) -> Result<Option<Branch>, DatabaseError> {
    let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND name = ?2");
    Ok(conn
        .query_row(&sql, params![project_id, name], branch_from_row)
        .optional()?)
}

/// Like [`find_branch`] but a missing branch is an error.
pub fn require_branch(
    conn: &Connection,
    project_id: &str,
    name: &str,
) -> Result<Branch, DatabaseError> {
    find_branch(conn, project_id, name)?.ok_or_else(|| DatabaseError::not_found("branch", name))
}

/// The project's default branch.
pub fn default_branch(conn: &Connection, project_id: &str) -> Result<Option<Branch>, DatabaseError> {
    let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND is_default = 1");
    Ok(conn
        .query_row(&sql, params![project_id], branch_from_row)
        .optional()?)
}

/// Delete a branch and its commits.
///
/// The default branch and a project's last remaining branch cannot be
/// deleted.
pub fn delete_branch(conn: &Connection, project_id: &str, name: &str) -> Result<(), DatabaseError> {
    let branch = require_branch(conn, project_id, name)?;
    if branch.is_default {
        return Err(DatabaseError::InvalidOperation(format!(
            "cannot delete the default branch '{}'",
            name
        )));
    }
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM branches WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    if remaining <= 1 {
        return Err(DatabaseError::InvalidOperation(
            "a project must keep at least one branch".into(),
        ));
    }

    conn.execute("DELETE FROM branches WHERE id = ?1", params![branch.id])?;
    debug!(id = %branch.id, project_id, name, "deleted branch");
    Ok(())
}

pub fn list_branches(conn: &Connection, project_id: &str) -> Result<Vec<Branch>, DatabaseError> {
    let sql = format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1
         ORDER BY is_default DESC, name ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let branches = stmt
        .query_map(params![project_id], branch_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(branches)
}

// ---------------------------------------------------------------------------
// commits
// ---------------------------------------------------------------------------

/// Append a commit to `branch` and advance its head.
///
/// The new commit's parent is the branch's current head. The returned
/// branch reflects the new head.
pub fn insert_commit(
    conn: &Connection,
    branch: &Branch,
    message: &str,
    content: &str,
) -> Result<(Commit, Branch), DatabaseError> {
    let at = now();
    let commit = Commit {
        id: Uuid::new_v4().to_string(),
        branch_id: branch.id.clone(),
        message: message.to_string(),
        content: content.to_string(),
        parent_commit_id: branch.last_commit_id.clone(),
        commit_hash: commit_hash(content, &at),
        created_at: at,
    };
    conn.execute(
        "INSERT INTO commits (id, branch_id, message, content, parent_commit_id, commit_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            commit.id,
            commit.branch_id,
            commit.message,
            commit.content,
            commit.parent_commit_id,
            commit.commit_hash,
            to_text(&at)
        ],
    )?;

    let changed = conn.execute(
        "UPDATE branches SET last_commit_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![commit.id, to_text(&at), branch.id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("branch", &branch.id));
    }
    touch_project(conn, &branch.project_id, &at)?;

    let mut updated = branch.clone();
    updated.last_commit_id = Some(commit.id.clone());
    updated.updated_at = at;

    debug!(id = %commit.id, branch = %branch.name, hash = %commit.commit_hash, "inserted commit");
    Ok((commit, updated))
}

pub fn get_commit(conn: &Connection, id: &str) -> Result<Option<Commit>, DatabaseError> {
    let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], commit_from_row).optional()?)
}

/// The commit a branch head points at, if any.
pub fn head_commit(conn: &Connection, branch: &Branch) -> Result<Option<Commit>, DatabaseError> {
    match branch.last_commit_id.as_deref() {
        Some(id) => get_commit(conn, id),
        None => Ok(None),
    }
}

/// Commits created on a branch, newest first.
pub fn list_commits(
    conn: &Connection,
    branch_id: &str,
    page: Page,
) -> Result<Vec<Commit>, DatabaseError> {
    let sql = format!(
        "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let commits = stmt
        .query_map(params![branch_id, page.limit, page.offset()], commit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(commits)
}

pub fn count_commits(conn: &Connection, branch_id: &str) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM commits WHERE branch_id = ?1",
        params![branch_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Walk parent links from `commit_id`, nearest first, at most `limit` steps.
///
/// The starting commit is not included. The walk stops early at a parent
/// that no longer exists.
pub fn ancestors(
    conn: &Connection,
    commit_id: &str,
    limit: usize,
) -> Result<Vec<Commit>, DatabaseError> {
    let start = get_commit(conn, commit_id)?.ok_or_else(|| DatabaseError::not_found("commit", commit_id))?;

    let mut chain = Vec::new();
    let mut next = start.parent_commit_id;
    while let Some(id) = next {
        if chain.len() >= limit {
            break;
        }
        // Parents on a deleted branch end the walk.
        let Some(commit) = get_commit(conn, &id)? else {
            break;
        };
        next = commit.parent_commit_id.clone();
        chain.push(commit);
    }
    Ok(chain)
}

// ---------------------------------------------------------------------------
// audit_log
// ---------------------------------------------------------------------------

pub fn insert_audit_log(
    conn: &Connection,
    action: &str,
    project_id: Option<&str>,
    details: Option<&str>,
    success: bool,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (action, project_id, details, success, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![action, project_id, details, success, to_text(&now())],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, action, "inserted audit_log entry");
    Ok(id)
}

pub fn list_audit_log(conn: &Connection, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, action, project_id, details, success, created_at
         FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit], |row| {
            Ok(AuditLogEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                project_id: row.get(2)?,
                details: row.get(3)?,
                success: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Database wrappers
// ---------------------------------------------------------------------------

impl Database {
    /// Create a project and its default branch atomically.
    pub fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        default_branch: &str,
    ) -> Result<Project, DatabaseError> {
        self.transaction(|conn| insert_project(conn, name, description, default_branch))
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>, DatabaseError> {
        get_project(&self.conn(), id)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, DatabaseError> {
        list_projects(&self.conn())
    }

    /// Resolve a project by id, falling back to its name.
    pub fn lookup_project(&self, id_or_name: &str) -> Result<Project, DatabaseError> {
        let conn = self.conn();
        match get_project(&conn, id_or_name)? {
            Some(project) => Ok(project),
            None => find_project_by_name(&conn, id_or_name)?
                .ok_or_else(|| DatabaseError::not_found("project", id_or_name)),
        }
    }

    pub fn delete_project(&self, id: &str) -> Result<(), DatabaseError> {
        delete_project(&self.conn(), id)
    }

    pub fn update_project(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, DatabaseError> {
        self.transaction(|conn| update_project(conn, id, name, description))
    }

    /// Create a branch starting at `from_commit_id`, or at the default
    /// branch's head when none is given.
    ///
    /// The name is trimmed. Fails when no commit is given and the default
    /// branch has no commits yet.
    pub fn create_branch(
        &self,
        project_id: &str,
        name: &str,
        from_commit_id: Option<&str>,
    ) -> Result<Branch, DatabaseError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DatabaseError::InvalidOperation(
                "branch name must not be empty".into(),
            ));
        }
        self.transaction(|conn| {
            if get_project(conn, project_id)?.is_none() {
                return Err(DatabaseError::not_found("project", project_id));
            }
            if find_branch(conn, project_id, name)?.is_some() {
                return Err(DatabaseError::AlreadyExists {
                    entity: "branch".into(),
                    name: name.to_string(),
                });
            }
            let source = match from_commit_id {
                Some(id) => id.to_string(),
                None => default_branch(conn, project_id)?
                    .and_then(|b| b.last_commit_id)
                    .ok_or_else(|| {
                        DatabaseError::InvalidOperation(
                            "default branch has no commits to branch from".into(),
                        )
                    })?,
            };
            insert_branch(conn, project_id, name, Some(&source), false)
        })
    }

    /// Delete a non-default branch and its commits.
    pub fn delete_branch(&self, project_id: &str, name: &str) -> Result<(), DatabaseError> {
        self.transaction(|conn| delete_branch(conn, project_id, name))
    }

    pub fn find_branch(&self, project_id: &str, name: &str) -> Result<Option<Branch>, DatabaseError> {
        find_branch(&self.conn(), project_id, name)
    }

    pub fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>, DatabaseError> {
        list_branches(&self.conn(), project_id)
    }

    /// Commit `content` on the named branch, advancing its head.
    pub fn create_commit(
        &self,
        project_id: &str,
        branch_name: &str,
        message: &str,
        content: &str,
    ) -> Result<Commit, DatabaseError> {
        self.transaction(|conn| {
            let branch = require_branch(conn, project_id, branch_name)?;
            let (commit, _) = insert_commit(conn, &branch, message, content)?;
            Ok(commit)
        })
    }

    pub fn get_commit(&self, id: &str) -> Result<Option<Commit>, DatabaseError> {
        get_commit(&self.conn(), id)
    }

    pub fn list_commits(&self, branch_id: &str, page: Page) -> Result<Vec<Commit>, DatabaseError> {
        list_commits(&self.conn(), branch_id, page)
    }

    pub fn count_commits(&self, branch_id: &str) -> Result<i64, DatabaseError> {
        count_commits(&self.conn(), branch_id)
    }

    pub fn ancestors(&self, commit_id: &str, limit: usize) -> Result<Vec<Commit>, DatabaseError> {
        ancestors(&self.conn(), commit_id, limit)
    }

    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        list_audit_log(&self.conn(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_create_project_with_default_branch() {
        let db = test_db();
        let project = db.create_project("greeter", Some("says hi"), "main").unwrap();

        let branches = db.list_branches(&project.id).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "main");
        assert!(branches[0].is_default);
        assert!(branches[0].last_commit_id.is_none());

        let loaded = db.get_project(&project.id).unwrap().unwrap();
        assert_eq!(loaded, project);
        assert_eq!(db.lookup_project("greeter").unwrap().id, project.id);
        assert_eq!(db.lookup_project(&project.id).unwrap().name, "greeter");
        assert!(matches!(
            db.lookup_project("nope"),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_project_name() {
        let db = test_db();
        db.create_project("greeter", None, "main").unwrap();
        let err = db.create_project("greeter", None, "main").unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
    }

    #[test]
    fn test_commits_advance_head_and_link_parents() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();

        let first = db.create_commit(&project.id, "main", "first", "v1").unwrap();
        let second = db.create_commit(&project.id, "main", "second", "v2").unwrap();
        assert!(first.parent_commit_id.is_none());
        assert_eq!(second.parent_commit_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(second.commit_hash.len(), 64);

        let main = db.find_branch(&project.id, "main").unwrap().unwrap();
        assert_eq!(main.last_commit_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(db.count_commits(&main.id).unwrap(), 2);

        let history = db.list_commits(&main.id, Page::default()).unwrap();
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        let chain = db.ancestors(&second.id, 10).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].content, "v1");
    }

    #[test]
    fn test_forked_branch_starts_at_commit() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        let base = db.create_commit(&project.id, "main", "base", "v1").unwrap();

        let feature = db.create_branch(&project.id, "feature", Some(&base.id)).unwrap();
        assert_eq!(feature.last_commit_id.as_deref(), Some(base.id.as_str()));
        assert_eq!(db.count_commits(&feature.id).unwrap(), 0);

        let on_feature = db.create_commit(&project.id, "feature", "edit", "v2").unwrap();
        assert_eq!(on_feature.parent_commit_id.as_deref(), Some(base.id.as_str()));
    }

    #[test]
    fn test_branch_errors() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();

        let err = db.create_branch(&project.id, "main", None).unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));

        let err = db.create_branch(&project.id, "x", Some("missing")).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        let err = db.create_branch("no-project", "x", None).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        let err = db.create_commit(&project.id, "ghost", "m", "c").unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn test_branch_without_source_forks_default_head() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();

        let err = db.create_branch(&project.id, "early", None).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidOperation(_)));

        let head = db.create_commit(&project.id, "main", "base", "v1").unwrap();
        let feature = db.create_branch(&project.id, "  feature ", None).unwrap();
        assert_eq!(feature.name, "feature");
        assert!(!feature.is_default);
        assert_eq!(feature.last_commit_id.as_deref(), Some(head.id.as_str()));
        assert_eq!(feature.created_from_commit_id.as_deref(), Some(head.id.as_str()));

        let err = db.create_branch(&project.id, "feature", None).unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
        let err = db.create_branch(&project.id, "   ", None).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidOperation(_)));
    }

    #[test]
    fn test_delete_branch_rules() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        let base = db.create_commit(&project.id, "main", "base", "v1").unwrap();

        let err = db.delete_branch(&project.id, "main").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidOperation(_)));
        let err = db.delete_branch(&project.id, "ghost").unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        db.create_branch(&project.id, "feature", None).unwrap();
        let edit = db.create_commit(&project.id, "feature", "edit", "v2").unwrap();
        db.delete_branch(&project.id, "feature").unwrap();

        assert!(db.find_branch(&project.id, "feature").unwrap().is_none());
        assert!(db.get_commit(&edit.id).unwrap().is_none());
        assert!(db.get_commit(&base.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_last_branch_refused() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        // A lone non-default branch.
        db.conn()
            .execute(
                "UPDATE branches SET is_default = 0 WHERE project_id = ?1",
                params![project.id],
            )
            .unwrap();
        let err = db.delete_branch(&project.id, "main").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidOperation(_)));
    }

    #[test]
    fn test_update_project() {
        let db = test_db();
        let project = db.create_project("greeter", Some("old"), "main").unwrap();
        db.create_project("taken", None, "main").unwrap();

        let updated = db
            .update_project(&project.id, "  welcomer ", Some("  "))
            .unwrap();
        assert_eq!(updated.name, "welcomer");
        assert!(updated.description.is_none());
        assert_eq!(db.get_project(&project.id).unwrap().unwrap(), updated);

        let same = db
            .update_project(&project.id, "welcomer", Some("new text"))
            .unwrap();
        assert_eq!(same.description.as_deref(), Some("new text"));

        let err = db.update_project(&project.id, "taken", None).unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
        let err = db.update_project(&project.id, "", None).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidOperation(_)));
        let err = db.update_project("missing", "x", None).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn test_ancestors_stop_at_deleted_parent() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        db.create_commit(&project.id, "main", "base", "v1").unwrap();
        db.create_branch(&project.id, "feature", None).unwrap();
        let on_feature = db.create_commit(&project.id, "feature", "f", "v2").unwrap();
        let forked = db
            .create_branch(&project.id, "nested", Some(&on_feature.id))
            .unwrap();
        let on_nested = db.create_commit(&project.id, "nested", "n", "v3").unwrap();
        assert_eq!(forked.last_commit_id.as_deref(), Some(on_feature.id.as_str()));

        db.delete_branch(&project.id, "feature").unwrap();
        assert!(db.ancestors(&on_nested.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_project_cascades() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        let commit = db.create_commit(&project.id, "main", "m", "c").unwrap();

        db.delete_project(&project.id).unwrap();
        assert!(db.get_project(&project.id).unwrap().is_none());
        assert!(db.get_commit(&commit.id).unwrap().is_none());
        assert!(db.delete_project(&project.id).is_err());
    }

    #[test]
    fn test_paging() {
        let db = test_db();
        let project = db.create_project("p", None, "main").unwrap();
        for i in 0..5 {
            db.create_commit(&project.id, "main", &format!("c{i}"), "x").unwrap();
        }
        let main = db.find_branch(&project.id, "main").unwrap().unwrap();
        let page = db.list_commits(&main.id, Page { page: 2, limit: 2 }).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message, "c2");
    }

    #[test]
    fn test_audit_log() {
        let db = test_db();
        let id = insert_audit_log(&db.conn(), "merge", Some("p1"), Some("details"), true).unwrap();
        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert!(entries[0].success);
    }

    #[test]
    fn test_commit_hash_is_deterministic() {
        let at = Utc::now();
        assert_eq!(commit_hash("x", &at), commit_hash("x", &at));
        assert_ne!(commit_hash("x", &at), commit_hash("y", &at));
    }
}

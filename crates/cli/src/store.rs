//! Commands that operate on the local commit store.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use promptmerge_core::config::AppConfig;
use promptmerge_core::db::Database;
use promptmerge_core::models::{MergeRequest, Page};
use promptmerge_core::{MergeOutcome, MergeWorkflow};

use crate::{print_merge_summary, read_text, style, Commands};

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Create a project with its default branch.
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, default_value = "main")]
        default_branch: String,
    },
    /// List all projects.
    List,
    /// Rename a project or replace its description.
    Update {
        /// Project id or name.
        project: String,

        /// New name (defaults to the current one).
        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a project with all its branches and commits.
    Delete {
        /// Project id or name.
        project: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BranchAction {
    /// Create a branch at an existing commit, or at the default branch's head.
    Create {
        /// Project id or name.
        project: String,
        name: String,

        /// Commit to fork from.
        #[arg(long)]
        from: Option<String>,
    },
    /// Delete a branch and its commits.
    Delete {
        /// Project id or name.
        project: String,
        name: String,
    },
    /// List a project's branches.
    List {
        /// Project id or name.
        project: String,
    },
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db_path = config.store.database_path();
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    let db = Database::new(&db_path).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

pub(crate) fn run(command: Commands, config: AppConfig) -> Result<ExitCode> {
    let db = open_database(&config)?;
    let workflow = MergeWorkflow::new(config, db);

    let result = match command {
        Commands::Project { action } => cmd_project(&workflow, action),
        Commands::Branch { action } => cmd_branch(&workflow, action),
        Commands::Commit {
            project,
            branch,
            message,
            file,
        } => {
            let content = read_text(&file)?;
            let project = workflow.db().lookup_project(&project)?;
            let commit = workflow
                .commit(&project.id, &branch, &message, &content)
                .context("failed to create commit")?;
            println!(
                "{}",
                style::success(&format!(
                    "[{} {}] {}",
                    branch,
                    style::short_id(&commit.id),
                    commit.message
                ))
            );
            Ok(())
        }
        Commands::Log {
            project,
            branch,
            page,
            limit,
        } => cmd_log(&workflow, &project, &branch, Page { page, limit }),
        Commands::Diff { commit, against } => {
            let diff = workflow
                .diff_commit(&commit, against.as_deref())
                .context("failed to diff commit")?;
            if diff.is_empty() {
                println!("{}", style::dim("no changes"));
            } else {
                for line in diff.patch.lines() {
                    println!("{}", style::patch_line(line));
                }
                println!(
                    "{}",
                    style::dim(&format!("+{} -{}", diff.additions, diff.deletions))
                );
            }
            Ok(())
        }
        Commands::MergeCheck {
            project,
            source,
            target,
            json,
        } => return cmd_merge_check(&workflow, &project, &source, &target, json),
        Commands::MergeBranch {
            project,
            source,
            into,
            message,
            resolved,
            json,
        } => {
            let resolved_content = resolved.as_deref().map(read_text).transpose()?;
            let request = MergeRequest {
                target_branch: into,
                merge_message: message,
                resolved_content,
            };
            return cmd_merge_branch(&workflow, &project, &source, &request, json);
        }
        Commands::Revert {
            project,
            branch,
            commit,
        } => {
            let project = workflow.db().lookup_project(&project)?;
            let revert = workflow
                .revert(&project.id, &branch, &commit)
                .context("failed to revert")?;
            println!(
                "{}",
                style::success(&format!(
                    "[{} {}] {}",
                    branch,
                    style::short_id(&revert.id),
                    revert.message
                ))
            );
            Ok(())
        }
        Commands::History { commit, limit } => cmd_history(workflow.db(), &commit, limit),
        Commands::Audit { limit } => cmd_audit(workflow.db(), limit),
        other => anyhow::bail!("{:?} does not use the store", other),
    };
    result.map(|()| ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Projects and branches
// ---------------------------------------------------------------------------

fn cmd_project(workflow: &MergeWorkflow, action: ProjectAction) -> Result<()> {
    let db = workflow.db();
    match action {
        ProjectAction::Create {
            name,
            description,
            default_branch,
        } => {
            let project = db
                .create_project(&name, description.as_deref(), &default_branch)
                .context("failed to create project")?;
            println!(
                "{}",
                style::success(&format!(
                    "Created project {} ({}) on branch {}",
                    project.name, project.id, project.default_branch
                ))
            );
        }
        ProjectAction::List => {
            let projects = db.list_projects().context("failed to list projects")?;
            if projects.is_empty() {
                println!("No projects found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Name", "Default", "Description", "Updated"]);
            for p in &projects {
                table.add_row(vec![
                    Cell::new(style::short_id(&p.id)),
                    Cell::new(&p.name),
                    Cell::new(&p.default_branch),
                    Cell::new(p.description.as_deref().unwrap_or("")),
                    Cell::new(p.updated_at.format("%Y-%m-%d %H:%M")),
                ]);
            }
            println!("{}", table);
        }
        ProjectAction::Update {
            project,
            name,
            description,
        } => {
            let project = db.lookup_project(&project)?;
            let name = name.unwrap_or_else(|| project.name.clone());
            let updated = db
                .update_project(&project.id, &name, description.as_deref())
                .context("failed to update project")?;
            println!(
                "{}",
                style::success(&format!("Updated project {}", updated.name))
            );
        }
        ProjectAction::Delete { project } => {
            let project = db.lookup_project(&project)?;
            db.delete_project(&project.id)
                .context("failed to delete project")?;
            println!(
                "{}",
                style::success(&format!("Deleted project {}", project.name))
            );
        }
    }
    Ok(())
}

fn cmd_branch(workflow: &MergeWorkflow, action: BranchAction) -> Result<()> {
    let db = workflow.db();
    match action {
        BranchAction::Create {
            project,
            name,
            from,
        } => {
            let project = db.lookup_project(&project)?;
            let branch = db
                .create_branch(&project.id, &name, from.as_deref())
                .context("failed to create branch")?;
            println!(
                "{}",
                style::success(&format!("Created branch {} in {}", branch.name, project.name))
            );
        }
        BranchAction::Delete { project, name } => {
            let project = db.lookup_project(&project)?;
            db.delete_branch(&project.id, &name)
                .context("failed to delete branch")?;
            println!(
                "{}",
                style::success(&format!("Deleted branch {} in {}", name, project.name))
            );
        }
        BranchAction::List { project } => {
            let project = db.lookup_project(&project)?;
            let branches = db
                .list_branches(&project.id)
                .context("failed to list branches")?;

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Branch", "Head", "Commits", "Updated"]);
            for b in &branches {
                let name = if b.is_default {
                    format!("{} *", b.name)
                } else {
                    b.name.clone()
                };
                let head = b
                    .last_commit_id
                    .as_deref()
                    .map(style::short_id)
                    .unwrap_or("—");
                let count = db.count_commits(&b.id).context("failed to count commits")?;
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(head),
                    Cell::new(count),
                    Cell::new(b.updated_at.format("%Y-%m-%d %H:%M")),
                ]);
            }
            println!("{}", style::header(&project.name));
            println!("{}", table);
        }
    }
    Ok(())
}

fn cmd_log(workflow: &MergeWorkflow, project: &str, branch: &str, page: Page) -> Result<()> {
    let db = workflow.db();
    let project = db.lookup_project(project)?;
    let branch = db
        .find_branch(&project.id, branch)?
        .with_context(|| format!("branch not found: {}", branch))?;

    let commits = db
        .list_commits(&branch.id, page)
        .context("failed to list commits")?;
    if commits.is_empty() {
        println!("No commits found.");
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("{} / {} (page {})", project.name, branch.name, page.page))
    );
    println!();
    for commit in &commits {
        println!(
            "  {}  {}  {}",
            style::dim(&commit.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            style::short_id(&commit.id),
            commit.message
        );
    }
    println!();
    Ok(())
}

fn cmd_history(db: &Database, commit_id: &str, limit: usize) -> Result<()> {
    let start = db
        .get_commit(commit_id)?
        .with_context(|| format!("commit not found: {}", commit_id))?;
    let chain = db
        .ancestors(commit_id, limit)
        .context("failed to walk commit parents")?;

    for commit in std::iter::once(&start).chain(chain.iter()) {
        println!(
            "  {}  {}  {}",
            style::dim(&commit.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            style::short_id(&commit.id),
            commit.message
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

fn cmd_merge_check(
    workflow: &MergeWorkflow,
    project: &str,
    source: &str,
    target: &str,
    json: bool,
) -> Result<ExitCode> {
    let project = workflow.db().lookup_project(project)?;
    let check = workflow
        .check_merge(&project.id, source, target)
        .context("merge check failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&check).context("failed to serialise merge check")?
        );
    } else {
        let a = &check.analysis;
        println!("{}", style::header(&format!("{} -> {}", a.source_branch, a.target_branch)));
        println!("  Commits on source : {}", a.commits_ahead);
        println!("  Commits on target : {}", a.commits_behind);
        println!("  Can merge         : {}", if check.can_merge { "yes" } else { "no" });
        print_merge_summary(&check.merge_result);
        for rec in &a.recommendations {
            println!("  - {}", rec);
        }
    }

    Ok(if check.can_merge && !check.has_conflicts {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_merge_branch(
    workflow: &MergeWorkflow,
    project: &str,
    source: &str,
    request: &MergeRequest,
    json: bool,
) -> Result<ExitCode> {
    let project = workflow.db().lookup_project(project)?;
    let outcome = workflow
        .merge_branch(&project.id, source, request)
        .context("merge failed")?;

    match outcome {
        MergeOutcome::Merged {
            commit,
            target_branch,
        } => {
            if json {
                let value = serde_json::json!({ "commit": commit, "targetBranch": target_branch });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!(
                    "{}",
                    style::success(&format!(
                        "Merged {} into {} as {}",
                        source,
                        target_branch.name,
                        style::short_id(&commit.id)
                    ))
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        MergeOutcome::Conflicts(result) => {
            if json {
                let value = serde_json::json!({ "hasConflicts": true, "mergeResult": result });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_merge_summary(&result);
                eprintln!(
                    "{}",
                    style::dim("resolve the conflicts and retry with --resolved <file>")
                );
            }
            Ok(ExitCode::from(1))
        }
    }
}

fn cmd_audit(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;
    if entries.is_empty() {
        println!("No merge history found.");
        return Ok(());
    }

    for entry in &entries {
        let timestamp = &entry.created_at[..19.min(entry.created_at.len())];
        let marker = if entry.success {
            style::success(&entry.action)
        } else {
            style::error(&entry.action)
        };
        println!(
            "  {}  {}  {}",
            style::dim(timestamp),
            marker,
            entry.details.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

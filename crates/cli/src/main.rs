//! PromptMerge command-line tool.
//!
//! Provides offline three-way merges of prompt files, marker scanning and
//! conflict resolution, plus project, branch, commit and merge commands
//! against the local commit store.

mod store;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use promptmerge_core::config::{AppConfig, DEFAULT_CONFIG_TOML};
use promptmerge_core::conflict::{
    has_unresolved_conflicts, ConflictResolver, MergeResult, Merger, Resolution,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// PromptMerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "promptmerge",
    version,
    about = "Version, diff and three-way merge prompt documents"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overrides `store.log_level`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Three-way merge of three files.
    Merge {
        /// Common ancestor.
        base: PathBuf,
        /// Our side.
        current: PathBuf,
        /// Their side.
        incoming: PathBuf,

        /// Print the full merge result as JSON.
        #[arg(long)]
        json: bool,

        /// Write the merged text here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report whether a file still contains conflict markers.
    Scan {
        file: PathBuf,
    },

    /// Apply the resolutions recorded in a JSON merge result.
    Resolve {
        /// JSON file produced by `merge --json`.
        result: PathBuf,

        /// Resolve every open conflict with one side: current or incoming.
        #[arg(long)]
        accept: Option<String>,

        /// Write the resolved text here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path (defaults to the platform config location).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: store::ProjectAction,
    },

    /// Manage branches.
    Branch {
        #[command(subcommand)]
        action: store::BranchAction,
    },

    /// Commit a file's content to a branch.
    Commit {
        /// Project id or name.
        project: String,
        branch: String,

        /// Commit message.
        #[arg(short, long)]
        message: String,

        /// File holding the new prompt content.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show a branch's commit history.
    Log {
        /// Project id or name.
        project: String,
        branch: String,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show the diff introduced by a commit.
    Diff {
        commit: String,

        /// Compare against this commit instead of the parent.
        #[arg(long)]
        against: Option<String>,
    },

    /// Commit the content of an earlier commit as the branch's new head.
    Revert {
        /// Project id or name.
        project: String,
        branch: String,
        commit: String,
    },

    /// Walk a commit's parents, nearest first.
    History {
        commit: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Check whether one branch merges cleanly into another.
    MergeCheck {
        /// Project id or name.
        project: String,
        source: String,
        target: String,

        #[arg(long)]
        json: bool,
    },

    /// Merge one branch into another and commit the result.
    MergeBranch {
        /// Project id or name.
        project: String,
        source: String,

        /// Target branch.
        #[arg(long)]
        into: String,

        /// Merge commit message.
        #[arg(short, long)]
        message: String,

        /// File with hand-resolved content to commit instead of merging.
        #[arg(long)]
        resolved: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Show recent merge audit entries.
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

impl Commands {
    /// Commands that work on plain files and need no store.
    fn is_offline(&self) -> bool {
        matches!(
            self,
            Commands::Merge { .. }
                | Commands::Scan { .. }
                | Commands::Resolve { .. }
                | Commands::Init { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = if cli.command.is_offline() {
        Ok(None)
    } else {
        load_config(cli.config.as_deref()).map(Some)
    };

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            config
                .as_ref()
                .ok()
                .and_then(|c| c.as_ref().map(|c| c.store.log_level.clone()))
        })
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = config.and_then(|config| run(cli, config));
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Option<AppConfig>) -> Result<ExitCode> {
    match cli.command {
        Commands::Merge {
            base,
            current,
            incoming,
            json,
            output,
        } => cmd_merge(&base, &current, &incoming, json, output.as_deref()),
        Commands::Scan { file } => cmd_scan(&file),
        Commands::Resolve {
            result,
            accept,
            output,
        } => cmd_resolve(&result, accept.as_deref(), output.as_deref()),
        Commands::Init { output } => cmd_init(output).map(|()| ExitCode::SUCCESS),
        command => {
            let config = config.context("configuration was not loaded")?;
            store::run(command, config)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let config =
                AppConfig::load_from_file(path).context("failed to load configuration file")?;
            config.validate().context("invalid configuration")?;
            Ok(config)
        }
        None => match AppConfig::default_path() {
            Some(path) => {
                AppConfig::load_or_default(&path).context("failed to load configuration file")
            }
            None => Ok(AppConfig::default()),
        },
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_or_print(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Offline commands
// ---------------------------------------------------------------------------

fn cmd_merge(
    base: &Path,
    current: &Path,
    incoming: &Path,
    json: bool,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let base = read_text(base)?;
    let current = read_text(current)?;
    let incoming = read_text(incoming)?;

    let result = Merger::detect_conflicts(&base, &current, &incoming);

    if json {
        let rendered =
            serde_json::to_string_pretty(&result).context("failed to serialise merge result")?;
        write_or_print(output, &rendered)?;
    } else {
        write_or_print(output, &result.merged_content)?;
        print_merge_summary(&result);
    }

    Ok(if result.has_conflicts {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Conflict table and stats, on stderr so stdout stays the merged text.
pub(crate) fn print_merge_summary(result: &MergeResult) {
    let stats = &result.stats;
    if !result.has_conflicts {
        eprintln!("{}", style::success("merged without conflicts"));
    } else {
        eprintln!(
            "{}",
            style::warn(&format!("{} conflict block(s)", result.conflicts.len()))
        );

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["ID", "Lines", "Current", "Incoming"]);
        for c in &result.conflicts {
            table.add_row(vec![
                Cell::new(&c.id),
                Cell::new(format!("{}-{}", c.start_line + 1, c.end_line + 1)),
                Cell::new(c.current_content.join("\n")),
                Cell::new(c.incoming_content.join("\n")),
            ]);
        }
        eprintln!("{}", table);
    }
    eprintln!(
        "{}",
        style::dim(&format!(
            "{} lines, +{} -{}",
            stats.total_lines, stats.added_lines, stats.removed_lines
        ))
    );
}

fn cmd_scan(file: &Path) -> Result<ExitCode> {
    let content = read_text(file)?;
    if has_unresolved_conflicts(&content) {
        println!(
            "{}",
            style::warn(&format!("{} contains unresolved conflict markers", file.display()))
        );
        Ok(ExitCode::from(1))
    } else {
        println!("{}", style::success(&format!("{} is clean", file.display())));
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_resolve(result_path: &Path, accept: Option<&str>, output: Option<&Path>) -> Result<ExitCode> {
    let raw = read_text(result_path)?;
    let mut result: MergeResult =
        serde_json::from_str(&raw).context("failed to parse merge result JSON")?;

    if let Some(accept) = accept {
        let resolution = match accept {
            "current" => Resolution::AcceptCurrent,
            "incoming" => Resolution::AcceptIncoming,
            other => anyhow::bail!("invalid resolution '{}': use 'current' or 'incoming'", other),
        };
        result.resolve_all(resolution);
    }

    let resolved = ConflictResolver::resolve_conflicts(&result.merged_content, &result.conflicts)
        .context("failed to apply resolutions")?;
    write_or_print(output, &resolved)?;

    let open = result.unresolved_count();
    if open > 0 {
        eprintln!(
            "{}",
            style::warn(&format!("{} conflict(s) still unresolved", open))
        );
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_init(output: Option<PathBuf>) -> Result<()> {
    let output = match output {
        Some(path) => path,
        None => AppConfig::default_path().context("no default configuration directory")?,
    };

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    std::fs::write(&output, DEFAULT_CONFIG_TOML).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Adjust data_dir and limits in the config file");
    println!("  2. Create a project: promptmerge project create <name>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["promptmerge"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_parse_project_update_and_delete() {
        match parse(&["project", "update", "assistant", "--name", "helper", "-d", "v2"]) {
            Commands::Project {
                action:
                    store::ProjectAction::Update {
                        project,
                        name,
                        description,
                    },
            } => {
                assert_eq!(project, "assistant");
                assert_eq!(name.as_deref(), Some("helper"));
                assert_eq!(description.as_deref(), Some("v2"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(matches!(
            parse(&["project", "delete", "assistant"]),
            Commands::Project {
                action: store::ProjectAction::Delete { .. }
            }
        ));
    }

    #[test]
    fn test_parse_branch_delete() {
        match parse(&["branch", "delete", "assistant", "feature"]) {
            Commands::Branch {
                action: store::BranchAction::Delete { project, name },
            } => {
                assert_eq!(project, "assistant");
                assert_eq!(name, "feature");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_revert_and_history() {
        match parse(&["revert", "assistant", "main", "abc123"]) {
            Commands::Revert {
                project,
                branch,
                commit,
            } => {
                assert_eq!((project.as_str(), branch.as_str()), ("assistant", "main"));
                assert_eq!(commit, "abc123");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        match parse(&["history", "abc123", "-l", "5"]) {
            Commands::History { commit, limit } => {
                assert_eq!(commit, "abc123");
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!parse(&["history", "abc123"]).is_offline());
    }

    #[test]
    fn test_branch_create_without_source() {
        match parse(&["branch", "create", "assistant", "feature"]) {
            Commands::Branch {
                action: store::BranchAction::Create { from, .. },
            } => assert!(from.is_none()),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use covtree::cli::{self, Style, View};
use covtree::diff::{DiffSource, FileDiff, GitDiff, StdinDiff};
use covtree::ingest;
use covtree::node::CoverageNode;

/// covtree: change coverage and indirect coverage changes of a coverage tree.
#[derive(Parser)]
#[command(name = "covtree", version, about)]
struct Cli {
    /// Log filter, e.g. "debug" or "covtree=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Accept trees whose indirect coverage changes refer to lines without
    /// coverage. Such entries are dropped with a warning.
    #[arg(long, global = true)]
    lenient: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the metric distribution of a coverage tree.
    Summary {
        /// Path to the coverage tree (JSON).
        tree: PathBuf,
    },

    /// List per-file rows of a table.
    Files {
        /// Path to the coverage tree (JSON).
        tree: PathBuf,

        /// Table id: coverage-table, change-coverage-table or
        /// coverage-changes-table.
        #[arg(long, default_value = covtree::view::COVERAGE_TABLE_ID)]
        table: String,

        /// Sort by coverage rate ascending (show worst files first).
        #[arg(long)]
        sort_by_coverage: bool,
    },

    /// Report coverage of the changed lines.
    ChangeCoverage {
        /// Path to the coverage tree (JSON).
        tree: PathBuf,

        /// Git diff arguments, e.g. "HEAD~1" or "main..HEAD".
        #[arg(long, conflicts_with_all = ["diff_file", "stdin_diff"])]
        git_diff: Option<String>,

        /// Read a unified diff from a file.
        #[arg(long, conflicts_with = "stdin_diff")]
        diff_file: Option<PathBuf>,

        /// Read a unified diff from stdin.
        #[arg(long)]
        stdin_diff: bool,

        /// Optional path prefix to prepend to diff paths for matching
        /// against coverage tree paths.
        #[arg(long)]
        path_prefix: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        style: Style,

        /// Commit SHA used to link line ranges in markdown output.
        #[arg(long)]
        sha: Option<String>,
    },

    /// Report coverage changes of lines that were not changed.
    IndirectChanges {
        /// Path to the coverage tree (JSON).
        tree: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        style: Style,

        /// Commit SHA used to link line ranges in markdown output.
        #[arg(long)]
        sha: Option<String>,
    },

    /// Print a tree as JSON.
    Tree {
        /// Path to the coverage tree (JSON).
        tree: PathBuf,

        #[arg(long, value_enum, default_value = "full")]
        view: View,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(args.log_level.as_deref())?;

    let strict = !args.lenient;
    let output = match args.command {
        Commands::Summary { tree } => cli::cmd_summary(&load(&tree, strict)?)?,
        Commands::Files {
            tree,
            table,
            sort_by_coverage,
        } => cli::cmd_files(Arc::new(load(&tree, strict)?), &table, sort_by_coverage)?,
        Commands::ChangeCoverage {
            tree,
            git_diff,
            diff_file,
            stdin_diff,
            path_prefix,
            style,
            sha,
        } => {
            let source: Option<Box<dyn DiffSource>> = if let Some(args) = git_diff {
                Some(Box::new(GitDiff { args }))
            } else if let Some(path) = diff_file {
                Some(Box::new(FileDiff { path }))
            } else if stdin_diff {
                Some(Box::new(StdinDiff))
            } else {
                None
            };
            let diff_text = source.map(|s| s.fetch_diff()).transpose()?;
            cli::cmd_change_coverage(
                load(&tree, strict)?,
                diff_text.as_deref(),
                path_prefix.as_deref(),
                style,
                sha.as_deref(),
            )?
        }
        Commands::IndirectChanges { tree, style, sha } => {
            cli::cmd_indirect_changes(load(&tree, strict)?, style, sha.as_deref())?
        }
        Commands::Tree { tree, view } => cli::cmd_tree(Arc::new(load(&tree, strict)?), view)?,
    };

    print!("{output}");
    Ok(())
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load(path: &Path, strict: bool) -> Result<CoverageNode> {
    let root = ingest::load_tree(path, strict)
        .with_context(|| format!("Failed to load coverage tree from {}", path.display()))?;
    info!("{}: {}", path.display(), cli::describe(&root));
    Ok(root)
}

//! Command handler functions for the covtree CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;

use crate::diff;
use crate::metric::Metric;
use crate::model::rate;
use crate::node::CoverageNode;
use crate::report::{self, MarkdownFormatter, TextFormatter};
use crate::view::{CoverageViewModel, TableKind};

/// Output style for the report commands.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
    Json,
}

/// Tree selected by the `tree` command.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum View {
    Full,
    Change,
    Indirect,
}

impl From<View> for TableKind {
    fn from(view: View) -> Self {
        match view {
            View::Full => TableKind::Coverage,
            View::Change => TableKind::ChangeCoverage,
            View::Indirect => TableKind::IndirectCoverageChanges,
        }
    }
}

pub fn cmd_summary(root: &CoverageNode) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{} {}", root.metric, root.name).unwrap();
    for (metric, coverage) in root.metrics_distribution() {
        if metric == root.metric {
            continue;
        }
        writeln!(
            out,
            "  {:<12} {:>8}/{:<8} ({:.1}%)",
            metric.as_str(),
            coverage.covered(),
            coverage.total(),
            rate(coverage.covered(), coverage.total()) * 100.0
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_files(root: Arc<CoverageNode>, table_id: &str, sort_by_coverage: bool) -> Result<String> {
    let view = CoverageViewModel::new(root);
    let mut table = view.table(table_id);

    if sort_by_coverage {
        table.rows.sort_by(|a, b| {
            let a = rate(a.line_coverage.covered(), a.line_coverage.total());
            let b = rate(b.line_coverage.covered(), b.line_coverage.total());
            a.total_cmp(&b)
        });
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<50} {:>10} {:>10} {:>8} {:>6}",
        "FILE", "LINES", "BRANCHES", "DELTA", "LOC"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(88)).unwrap();

    for row in &table.rows {
        let delta = row
            .line_delta
            .map_or_else(|| "n/a".to_string(), |d| format!("{d:+.1}"));
        writeln!(
            out,
            "{:<50} {:>10} {:>10} {:>8} {:>6}",
            row.path,
            row.line_coverage.format_covered_percentage(),
            row.branch_coverage.format_covered_percentage(),
            delta,
            row.loc
        )
        .unwrap();
    }

    Ok(out)
}

/// Change coverage report. When `diff_text` is given, its added lines
/// replace the changed lines recorded in the tree.
pub fn cmd_change_coverage(
    mut root: CoverageNode,
    diff_text: Option<&str>,
    path_prefix: Option<&str>,
    style: Style,
    sha: Option<&str>,
) -> Result<String> {
    if let Some(diff_text) = diff_text {
        let mut diff_lines = diff::parse_diff(diff_text);
        if let Some(prefix) = path_prefix {
            diff_lines = diff::apply_path_prefix(diff_lines, prefix);
        }
        diff::apply_changed_lines(&mut root, &diff_lines);
    }

    render(root, TableKind::ChangeCoverage, style, sha)
}

pub fn cmd_indirect_changes(root: CoverageNode, style: Style, sha: Option<&str>) -> Result<String> {
    render(root, TableKind::IndirectCoverageChanges, style, sha)
}

/// Dump one tree of the view as JSON.
pub fn cmd_tree(root: Arc<CoverageNode>, view: View) -> Result<String> {
    let view_model = CoverageViewModel::new(root);
    let mut out = serde_json::to_string_pretty(view_model.tree(view.into()))?;
    out.push('\n');
    Ok(out)
}

fn render(root: CoverageNode, kind: TableKind, style: Style, sha: Option<&str>) -> Result<String> {
    let view = CoverageViewModel::new(Arc::new(root));
    let report = report::build_report(&view, kind, sha);

    let output = match style {
        Style::Text => report.format(&TextFormatter),
        Style::Markdown => report.format(&MarkdownFormatter),
        Style::Json => {
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            json
        }
    };

    Ok(output)
}

/// Number of files and LINE coverage, for log output.
pub fn describe(root: &CoverageNode) -> String {
    let line = root.coverage(Metric::Line);
    format!("{} files, {line} lines covered", root.all_file_nodes().len())
}

//! Output formatting for coverage trees and their filtered views.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use serde::Serialize;

use crate::metric::Metric;
use crate::model::{rate, Coverage};
use crate::node::FileData;
use crate::view::{CoverageViewModel, TableKind};

/// One file of a [`TreeReport`].
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub line_coverage: Coverage,
    pub branch_coverage: Coverage,
    /// Percentage points against the total coverage of the file.
    pub line_delta: Option<f64>,
    /// Lines worth pointing at: uncovered lines, missed changed lines or
    /// lines that lost coverage, depending on the report kind.
    pub lines: Vec<u32>,
    #[serde(skip)]
    pub ranges: LineRanges,
}

impl FileReport {
    fn line_rate(&self) -> f64 {
        rate(self.line_coverage.covered(), self.line_coverage.total())
    }
}

/// Aggregated data of one tree view, ready to be formatted.
#[derive(Debug, Clone, Serialize)]
pub struct TreeReport {
    pub kind: TableKind,
    /// LINE coverage of the selected tree.
    pub line_coverage: Coverage,
    pub branch_coverage: Coverage,
    /// LINE coverage of the unfiltered tree.
    pub total_line_coverage: Coverage,
    pub files: Vec<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl TreeReport {
    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }

    fn title(&self) -> &'static str {
        match self.kind {
            TableKind::Coverage => "Coverage",
            TableKind::ChangeCoverage => "Change coverage",
            TableKind::IndirectCoverageChanges => "Indirect coverage changes",
        }
    }

    fn lines_label(&self) -> &'static str {
        match self.kind {
            TableKind::IndirectCoverageChanges => "lost coverage",
            _ => "missed",
        }
    }

    fn empty_message(&self) -> &'static str {
        match self.kind {
            TableKind::Coverage => "No files in coverage tree.",
            TableKind::ChangeCoverage => "No changed lines with coverage found.",
            TableKind::IndirectCoverageChanges => "No indirect coverage changes found.",
        }
    }

    /// Files with at least one line to report, lowest line rate first.
    fn files_with_lines(&self) -> Vec<&FileReport> {
        let mut files: Vec<&FileReport> =
            self.files.iter().filter(|f| !f.lines.is_empty()).collect();
        files.sort_by(|a, b| a.line_rate().total_cmp(&b.line_rate()));
        files
    }
}

/// Trait for formatting tree reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &TreeReport) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &TreeReport) -> String {
        let mut out = String::new();

        if report.files.is_empty() {
            writeln!(out, "{}", report.empty_message()).unwrap();
            return out;
        }

        let title = report.title();
        let line = report.line_coverage;
        let pct = rate(line.covered(), line.total()) * 100.0;
        let (covered, total) = (line.covered(), line.total());
        let files = report.files.len();
        writeln!(
            out,
            "{title}: {pct:.1}% ({covered}/{total} lines covered in {files} files)"
        )
        .unwrap();
        let branch = report.branch_coverage;
        if branch.is_set() {
            let pct = rate(branch.covered(), branch.total()) * 100.0;
            writeln!(
                out,
                "Branches: {pct:.1}% ({}/{} covered)",
                branch.covered(),
                branch.total()
            )
            .unwrap();
        }

        let files_with_lines = report.files_with_lines();
        if !files_with_lines.is_empty() {
            out.push('\n');
            let label = report.lines_label();
            for f in &files_with_lines {
                let path = &f.path;
                let file_covered = f.line_coverage.covered();
                let file_total = f.line_coverage.total();
                let file_rate = f.line_rate() * 100.0;
                let ranges = &f.ranges;
                writeln!(
                    out,
                    "  {path}  {file_covered}/{file_total} ({file_rate:.1}%)  {label}: {ranges}",
                )
                .unwrap();
            }
        }

        if report.kind != TableKind::Coverage && report.total_line_coverage.is_set() {
            out.push('\n');
            let total = report.total_line_coverage;
            let pct = rate(total.covered(), total.total()) * 100.0;
            writeln!(out, "Full project coverage: {pct:.1}%").unwrap();
        }

        out
    }
}

/// Markdown formatter.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &TreeReport) -> String {
        let mut md = String::new();
        let title = report.title();

        if report.files.is_empty() {
            writeln!(md, "### {title}\n\n{}", report.empty_message()).unwrap();
            return md;
        }

        let line = report.line_coverage;
        let pct = rate(line.covered(), line.total()) * 100.0;
        writeln!(md, "### {title}: {pct:.1}%\n").unwrap();

        let (covered, total) = (line.covered(), line.total());
        write!(md, "**{covered}** of **{total}** lines covered").unwrap();
        if let Some(ref sha) = report.sha {
            let short_sha = if sha.len() > 7 { &sha[..7] } else { sha };
            write!(md, " ({short_sha})").unwrap();
        }
        md.push('\n');

        md.push_str("\n| File | Lines | Branches | Delta |\n");
        md.push_str("|:-----|------:|---------:|------:|\n");
        for f in &report.files {
            let path = &f.path;
            let delta = f
                .line_delta
                .map_or_else(|| "n/a".to_string(), |d| format!("{d:+.1}"));
            writeln!(
                md,
                "| `{path}` | {} | {} | {delta} |",
                f.line_coverage.format_covered_percentage(),
                f.branch_coverage.format_covered_percentage(),
            )
            .unwrap();
        }

        let files_with_lines = report.files_with_lines();
        if files_with_lines.is_empty() {
            if report.kind == TableKind::ChangeCoverage {
                md.push_str("\nAll changed lines are covered.\n");
            }
        } else {
            let label = report.lines_label();
            writeln!(md, "\n<details>\n<summary>Lines {label}</summary>\n").unwrap();
            for f in &files_with_lines {
                let path = &f.path;
                let ranges = if let Some(ref sha) = report.sha {
                    f.ranges.linked(sha, path)
                } else {
                    f.ranges.to_string()
                };
                writeln!(md, "**`{path}`**: {ranges}\n").unwrap();
            }
            md.push_str("</details>\n");
        }

        if report.kind != TableKind::Coverage && report.total_line_coverage.is_set() {
            let total = report.total_line_coverage;
            let pct = rate(total.covered(), total.total()) * 100.0;
            writeln!(md, "\n<sub>Full project coverage: **{pct:.1}%**</sub>").unwrap();
        }

        md
    }
}

/// Build a [`TreeReport`] for one tree of `view`.
pub fn build_report(view: &CoverageViewModel, kind: TableKind, sha: Option<&str>) -> TreeReport {
    let tree = view.tree(kind);
    let table = view.table_for(kind);

    // rows and file nodes come from the same pre-order walk
    let files = tree
        .all_file_nodes()
        .into_iter()
        .zip(table.rows)
        .filter_map(|(node, row)| {
            let data = node.file_data()?;
            let ranges = LineRanges::for_file(kind, data);
            Some(FileReport {
                path: row.path,
                line_coverage: row.line_coverage,
                branch_coverage: row.branch_coverage,
                line_delta: row.line_delta,
                lines: ranges.lines().to_vec(),
                ranges,
            })
        })
        .collect();

    TreeReport {
        kind,
        line_coverage: tree.coverage(Metric::Line),
        branch_coverage: tree.coverage(Metric::Branch),
        total_line_coverage: view.node().coverage(Metric::Line),
        files,
        sha: sha.map(|s| s.to_owned()),
    }
}

/// Widest run of non-instrumented lines folded into a surrounding range.
const MAX_BRIDGE_GAP: u32 = 2;

/// One range of reported lines. For indirect coverage changes it also
/// carries the hits the range lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
    pub lost_hits: Option<u64>,
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)?;
        } else {
            write!(f, "{}-{}", self.start, self.end)?;
        }
        self.fmt_lost_hits(f)
    }
}

impl LineRange {
    fn fmt_lost_hits(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self.lost_hits {
            Some(hits) => write!(f, " (-{hits})"),
            None => Ok(()),
        }
    }
}

/// The lines a report points at for one file, coalesced into ranges.
///
/// What is reported depends on the [`TableKind`]: uncovered lines for the
/// full tree, missed changed lines for change coverage and lines with a
/// negative delta for indirect coverage changes. Neighbouring lines are
/// merged when at most [`MAX_BRIDGE_GAP`] lines separate them and none of
/// those is instrumented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineRanges {
    lines: Vec<u32>,
    ranges: Vec<LineRange>,
}

impl LineRanges {
    pub fn for_file(kind: TableKind, data: &FileData) -> Self {
        let lines: BTreeMap<u32, Option<u64>> = match kind {
            TableKind::Coverage => data
                .coverage_per_line
                .iter()
                .filter(|(_, coverage)| coverage.covered() == 0)
                .map(|(line, _)| (*line, None))
                .collect(),
            TableKind::ChangeCoverage => data
                .changed_instrumented_lines()
                .filter(|(_, coverage)| coverage.covered() == 0)
                .map(|(line, _)| (line, None))
                .collect(),
            TableKind::IndirectCoverageChanges => data
                .indirect_coverage_changes
                .iter()
                .filter(|(_, delta)| **delta < 0)
                .map(|(line, delta)| (*line, Some(delta.unsigned_abs())))
                .collect(),
        };
        Self::coalesce(lines, |line| data.coverage_per_line.contains_key(&line))
    }

    fn coalesce(
        lines: BTreeMap<u32, Option<u64>>,
        is_instrumented: impl Fn(u32) -> bool,
    ) -> Self {
        let mut ranges: Vec<LineRange> = Vec::new();
        for (&line, &lost_hits) in &lines {
            if let Some(last) = ranges.last_mut() {
                let gap = line - last.end - 1;
                if gap <= MAX_BRIDGE_GAP && !(last.end + 1..line).any(&is_instrumented) {
                    last.end = line;
                    last.lost_hits = match (last.lost_hits, lost_hits) {
                        (Some(a), Some(b)) => Some(a.saturating_add(b)),
                        (a, b) => a.or(b),
                    };
                    continue;
                }
            }
            ranges.push(LineRange {
                start: line,
                end: line,
                lost_hits,
            });
        }
        Self {
            lines: lines.into_keys().collect(),
            ranges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[LineRange] {
        &self.ranges
    }

    /// Reported line numbers, ascending. Bridged gap lines are not included.
    pub fn lines(&self) -> &[u32] {
        &self.lines
    }

    /// Render every range as a markdown link into the blob view of `sha`,
    /// e.g. `[3-5](../blob/{sha}/{path}#L3-L5)`.
    pub fn linked(&self, sha: &str, path: &str) -> String {
        let mut out = String::new();
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let (start, end) = (r.start, r.end);
            if start == end {
                write!(out, "[{start}](../blob/{sha}/{path}#L{start})").unwrap();
            } else {
                write!(out, "[{start}-{end}](../blob/{sha}/{path}#L{start}-L{end})").unwrap();
            }
            r.fmt_lost_hits(&mut out).unwrap();
        }
        out
    }
}

impl fmt::Display for LineRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

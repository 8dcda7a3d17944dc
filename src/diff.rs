/// Parse a unified diff to find the lines added in each file and mark them
/// as changed code lines on the file nodes of a coverage tree.
///
/// Also provides a [`DiffSource`] trait that abstracts over different
/// ways to obtain a diff (stdin, git, a diff file).
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::node::CoverageNode;

// ---------------------------------------------------------------------------
// Diff sources
// ---------------------------------------------------------------------------

/// A source for obtaining a unified diff.
pub trait DiffSource {
    /// Fetch the diff text.
    fn fetch_diff(&self) -> Result<String>;
}

/// Diff from stdin.
pub struct StdinDiff;

impl DiffSource for StdinDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::io::read_to_string(std::io::stdin()).context("Failed to read diff from stdin")
    }
}

/// Diff from a git command (e.g., `git diff HEAD~1`).
pub struct GitDiff {
    /// Arguments to pass to `git diff`.
    pub args: String,
}

impl DiffSource for GitDiff {
    fn fetch_diff(&self) -> Result<String> {
        let diff_args: Vec<&str> = self.args.split_whitespace().collect();
        let output = Command::new("git")
            .arg("diff")
            .args(&diff_args)
            .output()
            .context("Failed to run git diff")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git diff failed: {stderr}");
        }

        String::from_utf8(output.stdout).context("git diff output not valid UTF-8")
    }
}

/// Diff stored in a file.
pub struct FileDiff {
    pub path: PathBuf,
}

impl DiffSource for FileDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read diff from {}", self.path.display()))
    }
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// Added line numbers (in the new file) per file path.
pub type ChangedLines = HashMap<String, BTreeSet<u32>>;

/// Prepend a path prefix to all file paths in a diff result.
pub fn apply_path_prefix(diff_lines: ChangedLines, prefix: &str) -> ChangedLines {
    let prefix = prefix.trim_end_matches('/');
    diff_lines
        .into_iter()
        .map(|(path, lines)| (format!("{prefix}/{path}"), lines))
        .collect()
}

/// Parse a unified diff (e.g., `git diff`) into the lines it adds to each
/// file. Deleted files contribute nothing.
pub fn parse_diff(diff_text: &str) -> ChangedLines {
    let mut result = ChangedLines::new();
    let mut target: Option<&str> = None;
    let mut next_line: u32 = 0;

    for line in diff_text.lines() {
        if let Some(header) = line.strip_prefix("+++ ") {
            target = target_path(header);
            continue;
        }
        if line.starts_with("@@ ") {
            if let Some(start) = hunk_start(line) {
                next_line = start;
            }
            continue;
        }
        let Some(path) = target else {
            continue;
        };
        match line.as_bytes().first() {
            Some(b'+') => {
                result.entry(path.to_string()).or_default().insert(next_line);
                next_line = next_line.saturating_add(1);
            }
            // removed lines and "\ No newline at end of file"
            Some(b'-' | b'\\') => {}
            _ => next_line = next_line.saturating_add(1),
        }
    }

    result
}

/// Path of the new file from a `+++` header, without the VCS prefix
/// (`b/`, or `a/` from some tools) and any trailing timestamp.
fn target_path(header: &str) -> Option<&str> {
    let path = header.split_once('\t').map_or(header, |(path, _)| path);
    if path == "/dev/null" {
        return None;
    }
    Some(
        path.strip_prefix("b/")
            .or_else(|| path.strip_prefix("a/"))
            .unwrap_or(path),
    )
}

/// First new-file line of a hunk header like `@@ -10,5 +20,8 @@`.
fn hunk_start(header: &str) -> Option<u32> {
    let (_, new_range) = header.split_once(" +")?;
    let new_range = new_range.split_once(' ').map_or(new_range, |(range, _)| range);
    new_range.split(',').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tree annotation
// ---------------------------------------------------------------------------

/// Replace the changed code lines of every file node with the added lines of
/// the diff entry for its path. Files without an entry end up with no changed
/// lines. Indirect coverage changes recorded for lines that are now changed
/// are dropped, since those lines were edited directly.
///
/// Returns the number of file nodes matched by the diff.
pub fn apply_changed_lines(root: &mut CoverageNode, diff_lines: &ChangedLines) -> usize {
    let mut matched = 0;
    root.for_each_file_mut(|node| {
        let Some(data) = node.file_data_mut() else {
            return;
        };
        let changed = diff_lines.get(&data.path).cloned().unwrap_or_default();
        if !changed.is_empty() {
            matched += 1;
        }
        data.indirect_coverage_changes
            .retain(|line, _| !changed.contains(line));
        data.changed_code_lines = changed;
    });
    debug!(
        files = diff_lines.len(),
        matched, "applied diff to coverage tree"
    );
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::model::Coverage;
    use crate::node::FileData;

    // -- Diff parsing tests -------------------------------------------------

    #[test]
    fn test_hunk_start() {
        assert_eq!(hunk_start("@@ -10,5 +20,8 @@"), Some(20));
        assert_eq!(hunk_start("@@ -0,0 +1,3 @@ fn main() {"), Some(1));
        assert_eq!(hunk_start("@@ -5 +5 @@"), Some(5));
        assert_eq!(hunk_start("@@ garbage"), None);
    }

    #[test]
    fn test_target_path() {
        assert_eq!(target_path("b/src/main.rs"), Some("src/main.rs"));
        assert_eq!(target_path("src/main.rs"), Some("src/main.rs"));
        assert_eq!(target_path("b/src/main.rs\t2024-01-01 10:00:00"), Some("src/main.rs"));
        assert_eq!(target_path("/dev/null"), None);
    }

    #[test]
    fn test_parse_diff() {
        let diff = include_str!("../tests/fixtures/diffs/modified_file.diff");
        let result = parse_diff(diff);
        assert_eq!(result.len(), 1);
        // Line 11 (y=2), line 12 (z=x+y), line 14 (println z)
        assert_eq!(result["src/main.rs"], BTreeSet::from([11, 12, 14]));
    }

    #[test]
    fn test_parse_diff_new_file() {
        let diff = include_str!("../tests/fixtures/diffs/new_file.diff");
        let result = parse_diff(diff);
        assert_eq!(result["src/new.rs"], BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_parse_diff_deleted_file() {
        let diff = include_str!("../tests/fixtures/diffs/deleted_file.diff");
        assert!(parse_diff(diff).is_empty());
    }

    #[test]
    fn test_parse_diff_no_newline_at_eof() {
        let diff = include_str!("../tests/fixtures/diffs/no_newline_at_eof.diff");
        let result = parse_diff(diff);
        assert_eq!(result.len(), 1);
        // The "\ No newline at end of file" marker must not shift line numbers.
        assert_eq!(result["src/lib.rs"], BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_parse_diff_multiple_files() {
        let diff = include_str!("../tests/fixtures/diffs/multiple_files.diff");
        let result = parse_diff(diff);
        assert_eq!(result.len(), 2);
        assert_eq!(result["a.rs"], BTreeSet::from([2]));
        assert_eq!(result["b.rs"], BTreeSet::from([2]));
    }

    #[test]
    fn test_parse_diff_added_line_starting_with_plus() {
        let diff = "+++ b/a.rs\n@@ -1,1 +1,2 @@\n x\n+++counter;\n";
        let result = parse_diff(diff);
        // "+++counter;" is content, not a header: no space after the marker
        assert_eq!(result["a.rs"], BTreeSet::from([2]));
    }

    #[test]
    fn test_apply_path_prefix() {
        let diff = ChangedLines::from([("app.rs".to_string(), BTreeSet::from([1]))]);
        let prefixed = apply_path_prefix(diff, "project/");
        assert_eq!(prefixed["project/app.rs"], BTreeSet::from([1]));
    }

    // -- Tree annotation tests ----------------------------------------------

    fn tree() -> CoverageNode {
        let mut a = FileData::new("src/a.rs");
        a.coverage_per_line.insert(1, Coverage::new(1, 0));
        a.coverage_per_line.insert(2, Coverage::new(0, 1));
        a.indirect_coverage_changes.insert(1, 1);
        a.indirect_coverage_changes.insert(2, -1);

        let mut b = FileData::new("src/b.rs");
        b.coverage_per_line.insert(1, Coverage::new(1, 0));
        b.changed_code_lines.insert(1);

        CoverageNode::new(Metric::Package, "src")
            .with_child(CoverageNode::file("a.rs", a))
            .with_child(CoverageNode::file("b.rs", b))
    }

    #[test]
    fn test_apply_changed_lines() {
        let mut root = tree();
        let diff = ChangedLines::from([
            ("src/a.rs".to_string(), BTreeSet::from([2, 5])),
            ("src/missing.rs".to_string(), BTreeSet::from([1])),
        ]);

        let matched = apply_changed_lines(&mut root, &diff);

        assert_eq!(matched, 1);
        let a = root.children[0].file_data().unwrap();
        assert_eq!(a.changed_code_lines, BTreeSet::from([2, 5]));
        assert_eq!(a.indirect_coverage_changes.len(), 1);
        assert!(a.indirect_coverage_changes.contains_key(&1));

        let b = root.children[1].file_data().unwrap();
        assert!(b.changed_code_lines.is_empty());
    }
}

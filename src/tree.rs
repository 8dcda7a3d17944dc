//! Change coverage and indirect coverage change trees.
//!
//! Both entry points copy the tree they are handed, prune the copy down to the
//! files accepted by a predicate and attach synthesized LINE and BRANCH leaves
//! to every remaining file. When no file survives, the copy is returned with
//! its children and leaves cleared. The input tree is never modified.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::error::{CovtreeError, Result};
use crate::metric::Metric;
use crate::model::Coverage;
use crate::node::{CoverageNode, FileData, NodeKind};

/// Synthesized LINE and BRANCH aggregates for a single file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileLeaves {
    pub line: Coverage,
    pub branch: Coverage,
}

impl FileLeaves {
    /// Attach each aggregate that carries data.
    fn attach_to(self, node: &mut CoverageNode) {
        if self.line.is_set() {
            node.add_leaf(Metric::Line, self.line);
        }
        if self.branch.is_set() {
            node.add_leaf(Metric::Branch, self.branch);
        }
    }
}

/// Build the tree of files with at least one changed, instrumented line.
pub fn create_change_coverage_tree(root: &CoverageNode) -> CoverageNode {
    create_filtered_tree(
        root,
        "change coverage",
        FileData::has_changed_coverage,
        change_coverage_leaves,
    )
}

/// Build the tree of files with indirect coverage changes.
pub fn create_indirect_coverage_changes_tree(root: &CoverageNode) -> CoverageNode {
    create_filtered_tree(
        root,
        "indirect coverage changes",
        FileData::has_indirect_coverage_changes,
        indirect_coverage_changes_leaves,
    )
}

fn create_filtered_tree(
    root: &CoverageNode,
    view: &str,
    retain: fn(&FileData) -> bool,
    synthesize: fn(&FileData) -> FileLeaves,
) -> CoverageNode {
    let mut copy = root.copy_tree();

    if prune(&mut copy, &retain) {
        let mut files = 0usize;
        copy.for_each_file_mut(|node| {
            if let Some(leaves) = node.file_data().map(synthesize) {
                leaves.attach_to(node);
                files += 1;
            }
        });
        debug!(root = %root.name, files, "built {view} tree");
    } else {
        copy.clear_children_and_leaves();
        debug!(root = %root.name, "no {view}");
    }

    copy
}

/// Prune `node` in place, post-order, keeping only files accepted by
/// `retain` and the containers above them. Returns whether `node` itself is
/// kept.
///
/// File nodes lose their children and leaves whether kept or not; the
/// synthesized leaves replace them.
pub fn prune<F>(node: &mut CoverageNode, retain: &F) -> bool
where
    F: Fn(&FileData) -> bool,
{
    match &node.kind {
        NodeKind::File(data) => {
            let keep = retain(data);
            node.clear_children_and_leaves();
            keep
        }
        NodeKind::Container => {
            node.children.retain_mut(|child| prune(child, retain));
            !node.children.is_empty()
        }
    }
}

/// LINE and BRANCH coverage of the changed, instrumented lines of a file.
///
/// Every line counts once towards LINE. Branch-bearing lines (`total > 1`)
/// also contribute their raw branch counts to BRANCH.
pub fn change_coverage_leaves(file: &FileData) -> FileLeaves {
    let mut leaves = FileLeaves::default();
    for (_, coverage) in file.changed_instrumented_lines() {
        let covered = u64::from(coverage.covered() > 0);
        if coverage.total() > 1 {
            leaves.branch = leaves
                .branch
                .add(Coverage::new(coverage.covered(), coverage.missed()));
            leaves.line = leaves.line.add(Coverage::new(covered, 1 - covered));
        } else {
            let missed = u64::from(coverage.missed() > 0);
            leaves.line = leaves.line.add(Coverage::new(covered, missed));
        }
    }
    leaves
}

/// LINE and BRANCH deltas of the indirect coverage changes of a file.
///
/// LINE only moves when a delta flips the binary status of a line: a positive
/// delta equal to the current hit count opens it, a negative delta leaving it
/// without hits closes it. BRANCH receives every delta of a branch-bearing
/// line.
///
/// An entry for a line without coverage is inconsistent data. It is logged
/// and skipped; debug builds additionally fail an assertion, since loaded
/// trees have already been checked or cleaned by
/// [`drop_inconsistent_changes`].
pub fn indirect_coverage_changes_leaves(file: &FileData) -> FileLeaves {
    let mut leaves = FileLeaves::default();
    for (&line, &delta) in &file.indirect_coverage_changes {
        let Some(current) = file.coverage_per_line.get(&line) else {
            let err = CovtreeError::MissingLineCoverage {
                path: file.path.clone(),
                line,
            };
            warn!("{err}; skipping entry");
            debug_assert!(false, "{err}");
            continue;
        };

        let hits = delta.unsigned_abs();
        match delta.cmp(&0) {
            Ordering::Greater => {
                if hits == current.covered() {
                    leaves.line = leaves.line.add(Coverage::new(1, 0));
                }
                if current.total() > 1 {
                    leaves.branch = leaves.branch.add(Coverage::new(hits, 0));
                }
            }
            Ordering::Less => {
                if current.covered() == 0 {
                    leaves.line = leaves.line.add(Coverage::new(0, 1));
                }
                if current.total() > 1 {
                    leaves.branch = leaves.branch.add(Coverage::new(0, hits));
                }
            }
            Ordering::Equal => {}
        }
    }
    leaves
}

/// Verify that every indirect coverage change refers to an instrumented line.
pub fn check_consistency(root: &CoverageNode) -> Result<()> {
    for node in root.all_file_nodes() {
        let Some(data) = node.file_data() else {
            continue;
        };
        if let Some(&line) = data
            .indirect_coverage_changes
            .keys()
            .find(|line| !data.coverage_per_line.contains_key(line))
        {
            return Err(CovtreeError::MissingLineCoverage {
                path: data.path.clone(),
                line,
            });
        }
    }
    Ok(())
}

/// Remove every indirect coverage change that refers to a line without
/// coverage, logging each one. Returns the number of removed entries.
pub fn drop_inconsistent_changes(root: &mut CoverageNode) -> usize {
    let mut dropped = 0;
    root.for_each_file_mut(|node| {
        let Some(data) = node.file_data_mut() else {
            return;
        };
        let FileData {
            path,
            coverage_per_line,
            indirect_coverage_changes,
            ..
        } = data;
        indirect_coverage_changes.retain(|&line, _| {
            let keep = coverage_per_line.contains_key(&line);
            if !keep {
                let err = CovtreeError::MissingLineCoverage {
                    path: path.clone(),
                    line,
                };
                warn!("{err}; dropping entry");
                dropped += 1;
            }
            keep
        });
    });
    dropped
}

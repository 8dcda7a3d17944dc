#![allow(dead_code)]

use std::path::PathBuf;

use covtree::metric::Metric;
use covtree::model::Coverage;
use covtree::node::{CoverageNode, FileData};
use tempfile::TempDir;

pub const SAMPLE_TREE: &[u8] = include_bytes!("../fixtures/sample_tree.json");

/// The fixture tree: `src/main.rs` with changed line 15, `src/util/util.rs`
/// with indirect coverage changes on lines 1-3 and `src/util/empty.rs`
/// without either.
pub fn sample_tree() -> CoverageNode {
    covtree::ingest::parse_tree(SAMPLE_TREE, true).unwrap()
}

/// Write `content` to a tree file in a fresh temporary directory.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn write_tree(content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.json");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

/// File node with per-line `(line, covered, missed)` data and a LINE leaf
/// counting each line once.
pub fn file(
    name: &str,
    path: &str,
    lines: &[(u32, u64, u64)],
    changed: &[u32],
    indirect: &[(u32, i64)],
) -> CoverageNode {
    let mut data = FileData::new(path);
    for &(line, covered, missed) in lines {
        data.coverage_per_line
            .insert(line, Coverage::new(covered, missed));
    }
    data.changed_code_lines.extend(changed.iter().copied());
    data.indirect_coverage_changes.extend(indirect.iter().copied());

    let line = lines
        .iter()
        .map(|&(_, covered, _)| Coverage::new(u64::from(covered > 0), u64::from(covered == 0)))
        .sum();
    CoverageNode::file(name, data).with_leaf(Metric::Line, line)
}

pub fn leaf(node: &CoverageNode, metric: Metric) -> Option<Coverage> {
    node.leaves
        .iter()
        .find(|l| l.metric == metric)
        .map(|l| l.coverage)
}

pub fn paths(node: &CoverageNode) -> Vec<&str> {
    node.all_file_nodes().iter().map(|n| n.path()).collect()
}

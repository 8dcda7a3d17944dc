//! Results view over a single coverage tree.
//!
//! A [`CoverageViewModel`] is created once per view activation. It derives the
//! change coverage and indirect coverage change trees on construction and
//! keeps them for its lifetime; the unfiltered tree itself is shared
//! read-only between activations.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::CovtreeError;
use crate::metric::Metric;
use crate::model::Coverage;
use crate::node::CoverageNode;
use crate::tree;

pub const COVERAGE_TABLE_ID: &str = "coverage-table";
pub const CHANGE_COVERAGE_TABLE_ID: &str = "change-coverage-table";
pub const COVERAGE_CHANGES_TABLE_ID: &str = "coverage-changes-table";

/// Which tree a table or overview is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    Coverage,
    ChangeCoverage,
    IndirectCoverageChanges,
}

impl TableKind {
    /// Map a table id to its kind. Unknown ids show the full coverage.
    pub fn from_table_id(id: &str) -> Self {
        match id {
            CHANGE_COVERAGE_TABLE_ID => TableKind::ChangeCoverage,
            COVERAGE_CHANGES_TABLE_ID => TableKind::IndirectCoverageChanges,
            _ => TableKind::Coverage,
        }
    }

    pub fn table_id(&self) -> &'static str {
        match self {
            TableKind::Coverage => COVERAGE_TABLE_ID,
            TableKind::ChangeCoverage => CHANGE_COVERAGE_TABLE_ID,
            TableKind::IndirectCoverageChanges => COVERAGE_CHANGES_TABLE_ID,
        }
    }
}

impl std::str::FromStr for TableKind {
    type Err = CovtreeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coverage" | "full" | COVERAGE_TABLE_ID => Ok(TableKind::Coverage),
            "change" | "change-coverage" | CHANGE_COVERAGE_TABLE_ID => {
                Ok(TableKind::ChangeCoverage)
            }
            "indirect" | "indirect-changes" | COVERAGE_CHANGES_TABLE_ID => {
                Ok(TableKind::IndirectCoverageChanges)
            }
            _ => Err(CovtreeError::UnknownTable(s.to_string())),
        }
    }
}

/// Map the metric names used by chart requests. Only `"Branch"` selects
/// branch coverage; everything else falls back to line coverage.
pub fn metric_from_text(text: &str) -> Metric {
    if text == "Branch" {
        Metric::Branch
    } else {
        Metric::Line
    }
}

/// One file row of a coverage table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    /// [`CoverageNode::stable_hash`] of the file, used to link to its source.
    pub file_hash: u32,
    pub package_name: String,
    pub file_name: String,
    pub path: String,
    pub line_coverage: Coverage,
    pub branch_coverage: Coverage,
    /// Percentage points; `None` when not available.
    pub line_delta: Option<f64>,
    pub branch_delta: Option<f64>,
    /// Lines of code counted for this row.
    pub loc: usize,
}

/// Rows of one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableModel {
    pub id: String,
    pub kind: TableKind,
    pub rows: Vec<CoverageRow>,
}

/// Per-metric totals for the overview chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageOverview {
    pub metrics: Vec<Metric>,
    pub covered: Vec<u64>,
    pub missed: Vec<u64>,
    pub covered_percentages: Vec<f64>,
    pub missed_percentages: Vec<f64>,
}

impl CoverageOverview {
    fn from_node(node: &CoverageNode) -> Self {
        let mut overview = CoverageOverview::default();
        // the root always counts as 1 of 1
        for (metric, coverage) in node
            .metrics_distribution()
            .into_iter()
            .filter(|(metric, _)| *metric != node.metric)
        {
            overview.metrics.push(metric);
            overview.covered.push(coverage.covered());
            overview.missed.push(coverage.missed());
            overview
                .covered_percentages
                .push(coverage.covered_fraction().unwrap_or(0.0) * 100.0);
            overview
                .missed_percentages
                .push(coverage.missed_fraction().unwrap_or(0.0) * 100.0);
        }
        overview
    }
}

pub struct CoverageViewModel {
    root: Arc<CoverageNode>,
    change_coverage_tree: CoverageNode,
    indirect_coverage_changes_tree: CoverageNode,
}

impl CoverageViewModel {
    pub fn new(root: Arc<CoverageNode>) -> Self {
        let change_coverage_tree = tree::create_change_coverage_tree(&root);
        let indirect_coverage_changes_tree = tree::create_indirect_coverage_changes_tree(&root);
        Self {
            root,
            change_coverage_tree,
            indirect_coverage_changes_tree,
        }
    }

    /// The unfiltered tree.
    pub fn node(&self) -> &CoverageNode {
        &self.root
    }

    pub fn change_coverage_tree(&self) -> &CoverageNode {
        &self.change_coverage_tree
    }

    pub fn indirect_coverage_changes_tree(&self) -> &CoverageNode {
        &self.indirect_coverage_changes_tree
    }

    pub fn tree(&self, kind: TableKind) -> &CoverageNode {
        match kind {
            TableKind::Coverage => &self.root,
            TableKind::ChangeCoverage => &self.change_coverage_tree,
            TableKind::IndirectCoverageChanges => &self.indirect_coverage_changes_tree,
        }
    }

    pub fn has_change_coverage(&self) -> bool {
        !self.change_coverage_tree.is_empty()
    }

    pub fn has_indirect_coverage_changes(&self) -> bool {
        !self.indirect_coverage_changes_tree.is_empty()
    }

    pub fn overview(&self, kind: TableKind) -> CoverageOverview {
        CoverageOverview::from_node(self.tree(kind))
    }

    /// The table for `table_id`; unknown ids get the full coverage table.
    pub fn table(&self, table_id: &str) -> TableModel {
        TableModel {
            id: table_id.to_string(),
            ..self.table_for(TableKind::from_table_id(table_id))
        }
    }

    pub fn table_for(&self, kind: TableKind) -> TableModel {
        let rows = self
            .tree(kind)
            .walk()
            .filter(|(_, node)| node.is_file())
            .map(|(parent, node)| {
                let package_name = parent.map_or("-", |p| p.name.as_str());
                self.row(kind, package_name, node)
            })
            .collect();
        TableModel {
            id: kind.table_id().to_string(),
            kind,
            rows,
        }
    }

    fn row(&self, kind: TableKind, package_name: &str, node: &CoverageNode) -> CoverageRow {
        let original = match kind {
            TableKind::Coverage => node,
            _ => self.find_original_node(node),
        };
        let data = node.file_data();

        let (line_delta, branch_delta, loc) = match kind {
            TableKind::Coverage => (
                data.and_then(|d| d.coverage_delta(Metric::Line)),
                data.and_then(|d| d.coverage_delta(Metric::Branch)),
                data.map_or(0, |d| d.coverage_per_line.len()),
            ),
            TableKind::ChangeCoverage => (
                filtered_delta(node, original, Metric::Line),
                filtered_delta(node, original, Metric::Branch),
                data.map_or(0, |d| d.changed_instrumented_lines().count()),
            ),
            TableKind::IndirectCoverageChanges => (
                filtered_delta(node, original, Metric::Line),
                filtered_delta(node, original, Metric::Branch),
                data.map_or(0, |d| d.indirect_coverage_changes.len()),
            ),
        };

        CoverageRow {
            file_hash: original.stable_hash(),
            package_name: package_name.to_string(),
            file_name: node.name.clone(),
            path: node.path().to_string(),
            line_coverage: node.coverage(Metric::Line),
            branch_coverage: node.coverage(Metric::Branch),
            line_delta,
            branch_delta,
            loc,
        }
    }

    /// Find the file of the unfiltered tree with the same `(path, name)` as
    /// `file`. Falls back to `file` itself when there is none.
    pub fn find_original_node<'a>(&'a self, file: &'a CoverageNode) -> &'a CoverageNode {
        self.root
            .all_file_nodes()
            .into_iter()
            .find(|node| node.path() == file.path() && node.name == file.name)
            .unwrap_or_else(|| {
                debug!(path = file.path(), name = %file.name, "no matching file in unfiltered tree");
                file
            })
    }

    /// Resolve a file hash from a table row back to the unfiltered file node.
    pub fn find_file_by_hash(&self, hash: u32) -> Option<&CoverageNode> {
        self.root.find_by_hash_code(Metric::File, hash)
    }
}

/// Difference between the filtered coverage of a file and its total
/// coverage, in percentage points.
fn filtered_delta(filtered: &CoverageNode, original: &CoverageNode, metric: Metric) -> Option<f64> {
    let filtered = filtered.coverage(metric).covered_fraction()?;
    let total = original.coverage(metric).covered_fraction().unwrap_or(0.0);
    Some((filtered - total) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CoverageDelta, FileData};

    fn file(
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
            .map(|&(_, c, _)| Coverage::new(u64::from(c > 0), u64::from(c == 0)))
            .sum();
        CoverageNode::file(name, data).with_leaf(Metric::Line, line)
    }

    fn view() -> CoverageViewModel {
        let mut a = file(
            "a.rs",
            "src/core/a.rs",
            &[(1, 1, 0), (2, 0, 1), (3, 1, 0), (4, 1, 0)],
            &[2, 3, 9],
            &[],
        );
        if let Some(data) = a.file_data_mut() {
            data.coverage_deltas.push(CoverageDelta {
                metric: Metric::Line,
                delta: 2.5,
            });
        }
        let b = file("b.rs", "src/util/b.rs", &[(1, 2, 0)], &[], &[(1, 2)]);

        let root = CoverageNode::new(Metric::Module, "app")
            .with_child(CoverageNode::new(Metric::Package, "core").with_child(a))
            .with_child(CoverageNode::new(Metric::Package, "util").with_child(b));
        CoverageViewModel::new(Arc::new(root))
    }

    #[test]
    fn test_table_kind_from_table_id() {
        assert_eq!(
            TableKind::from_table_id(CHANGE_COVERAGE_TABLE_ID),
            TableKind::ChangeCoverage
        );
        assert_eq!(
            TableKind::from_table_id(COVERAGE_CHANGES_TABLE_ID),
            TableKind::IndirectCoverageChanges
        );
        assert_eq!(TableKind::from_table_id("anything"), TableKind::Coverage);
        assert_eq!("indirect".parse::<TableKind>().unwrap(), TableKind::IndirectCoverageChanges);
        assert!("bogus".parse::<TableKind>().is_err());
    }

    #[test]
    fn test_metric_from_text() {
        assert_eq!(metric_from_text("Branch"), Metric::Branch);
        assert_eq!(metric_from_text("Line"), Metric::Line);
        assert_eq!(metric_from_text("branch"), Metric::Line);
    }

    #[test]
    fn test_filtered_trees_are_cached() {
        let view = view();
        assert!(view.has_change_coverage());
        assert!(view.has_indirect_coverage_changes());
        assert_eq!(view.change_coverage_tree().all_file_nodes().len(), 1);
        assert_eq!(view.indirect_coverage_changes_tree().all_file_nodes().len(), 1);
        assert_eq!(view.node().all_file_nodes().len(), 2);
    }

    #[test]
    fn test_coverage_table_rows() {
        let view = view();
        let table = view.table("whatever");
        assert_eq!(table.id, "whatever");
        assert_eq!(table.kind, TableKind::Coverage);
        assert_eq!(table.rows.len(), 2);

        let a = &table.rows[0];
        assert_eq!(a.package_name, "core");
        assert_eq!(a.file_name, "a.rs");
        assert_eq!(a.line_coverage, Coverage::new(3, 1));
        assert_eq!(a.branch_coverage, Coverage::NO_COVERAGE);
        assert_eq!(a.line_delta, Some(2.5));
        assert_eq!(a.branch_delta, None);
        assert_eq!(a.loc, 4);
    }

    #[test]
    fn test_change_coverage_table_rows() {
        let view = view();
        let table = view.table(CHANGE_COVERAGE_TABLE_ID);
        assert_eq!(table.kind, TableKind::ChangeCoverage);
        assert_eq!(table.rows.len(), 1);

        let a = &table.rows[0];
        assert_eq!(a.path, "src/core/a.rs");
        assert_eq!(a.line_coverage, Coverage::new(1, 1));
        // 50% changed vs 75% total
        assert_eq!(a.line_delta, Some(-25.0));
        assert_eq!(a.branch_delta, None);
        // line 9 is not instrumented
        assert_eq!(a.loc, 2);
        assert_eq!(a.file_hash, view.node().all_file_nodes()[0].stable_hash());
    }

    #[test]
    fn test_indirect_table_rows() {
        let view = view();
        let table = view.table_for(TableKind::IndirectCoverageChanges);
        assert_eq!(table.id, COVERAGE_CHANGES_TABLE_ID);

        let b = &table.rows[0];
        assert_eq!(b.package_name, "util");
        assert_eq!(b.line_coverage, Coverage::new(1, 0));
        assert_eq!(b.line_delta, Some(0.0));
        assert_eq!(b.loc, 1);
    }

    #[test]
    fn test_find_original_node() {
        let view = view();
        let files = view.change_coverage_tree().all_file_nodes();
        let filtered = files[0];
        let original = view.find_original_node(filtered);
        assert_eq!(original.coverage(Metric::Line), Coverage::new(3, 1));

        let stranger = file("x.rs", "src/x.rs", &[(1, 1, 0)], &[1], &[]);
        assert!(std::ptr::eq(view.find_original_node(&stranger), &stranger));
    }

    #[test]
    fn test_find_file_by_hash() {
        let view = view();
        let hash = view.table_for(TableKind::Coverage).rows[1].file_hash;
        let node = view.find_file_by_hash(hash).unwrap();
        assert_eq!(node.name, "b.rs");
        assert!(view.find_file_by_hash(hash.wrapping_add(1)).is_none());
    }

    #[test]
    fn test_overview_skips_root() {
        let view = view();
        let overview = view.overview(TableKind::Coverage);
        assert_eq!(
            overview.metrics,
            vec![Metric::Package, Metric::File, Metric::Line]
        );
        assert_eq!(overview.covered, vec![2, 2, 4]);
        assert_eq!(overview.missed, vec![0, 0, 1]);
        assert_eq!(overview.covered_percentages[2], 80.0);
    }

    #[test]
    fn test_empty_views() {
        let root = CoverageNode::new(Metric::Module, "app").with_child(file(
            "a.rs",
            "a.rs",
            &[(1, 1, 0)],
            &[],
            &[],
        ));
        let view = CoverageViewModel::new(Arc::new(root));

        assert!(!view.has_change_coverage());
        assert!(!view.has_indirect_coverage_changes());
        assert!(view.table(CHANGE_COVERAGE_TABLE_ID).rows.is_empty());
        assert_eq!(view.overview(TableKind::ChangeCoverage), CoverageOverview::default());
    }
}

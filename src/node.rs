//! Coverage tree model.
//!
//! A tree is built once per build by report ingestion and is never mutated
//! afterwards. Structural nodes (module, package, ...) are plain containers;
//! nodes at FILE level additionally carry per-line coverage together with the
//! changed lines and indirect coverage deltas supplied by the diff
//! collaborator. Line-level data never materializes as nodes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::metric::Metric;
use crate::model::Coverage;

/// A `(metric, coverage)` pair attached directly to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageLeaf {
    pub metric: Metric,
    pub coverage: Coverage,
}

impl CoverageLeaf {
    pub fn new(metric: Metric, coverage: Coverage) -> Self {
        Self { metric, coverage }
    }
}

/// Total coverage delta of a file against the reference build, in
/// percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageDelta {
    pub metric: Metric,
    pub delta: f64,
}

/// Payload of a file node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    /// One entry per instrumented line. `total > 1` marks a branch-bearing line.
    #[serde(default)]
    pub coverage_per_line: BTreeMap<u32, Coverage>,
    /// Lines touched by the change under analysis.
    #[serde(default)]
    pub changed_code_lines: BTreeSet<u32>,
    /// Hit-count delta against the reference build for lines that were not
    /// changed themselves.
    #[serde(default)]
    pub indirect_coverage_changes: BTreeMap<u32, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_deltas: Vec<CoverageDelta>,
}

impl FileData {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Changed lines that coverage instrumentation tracks, in line order.
    pub fn changed_instrumented_lines(&self) -> impl Iterator<Item = (u32, Coverage)> + '_ {
        self.changed_code_lines
            .iter()
            .filter_map(|line| self.coverage_per_line.get(line).map(|c| (*line, *c)))
    }

    /// Whether at least one changed line is instrumented. Comment or
    /// whitespace-only edits do not count.
    #[must_use]
    pub fn has_changed_coverage(&self) -> bool {
        self.changed_instrumented_lines().next().is_some()
    }

    #[must_use]
    pub fn has_indirect_coverage_changes(&self) -> bool {
        !self.indirect_coverage_changes.is_empty()
    }

    #[must_use]
    pub fn coverage_delta(&self, metric: Metric) -> Option<f64> {
        self.coverage_deltas
            .iter()
            .find(|d| d.metric == metric)
            .map(|d| d.delta)
    }
}

/// Node kind. The filters switch on this exactly once per visited node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Container,
    File(FileData),
}

/// A node of the coverage tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageNode {
    pub metric: Metric,
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<CoverageNode>,
    #[serde(default)]
    pub leaves: Vec<CoverageLeaf>,
}

impl CoverageNode {
    /// Create a container node.
    pub fn new(metric: Metric, name: impl Into<String>) -> Self {
        Self {
            metric,
            name: name.into(),
            kind: NodeKind::Container,
            children: Vec::new(),
            leaves: Vec::new(),
        }
    }

    /// Create a file node.
    pub fn file(name: impl Into<String>, data: FileData) -> Self {
        Self {
            metric: Metric::File,
            name: name.into(),
            kind: NodeKind::File(data),
            children: Vec::new(),
            leaves: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: CoverageNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_leaf(mut self, metric: Metric, coverage: Coverage) -> Self {
        self.add_leaf(metric, coverage);
        self
    }

    pub fn add_child(&mut self, child: CoverageNode) {
        self.children.push(child);
    }

    pub fn add_leaf(&mut self, metric: Metric, coverage: Coverage) {
        self.leaves.push(CoverageLeaf::new(metric, coverage));
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    pub fn file_data(&self) -> Option<&FileData> {
        match &self.kind {
            NodeKind::File(data) => Some(data),
            NodeKind::Container => None,
        }
    }

    pub fn file_data_mut(&mut self) -> Option<&mut FileData> {
        match &mut self.kind {
            NodeKind::File(data) => Some(data),
            NodeKind::Container => None,
        }
    }

    /// Source path of a file node; empty for containers.
    pub fn path(&self) -> &str {
        self.file_data().map_or("", |data| data.path.as_str())
    }

    /// A node without children and leaves carries no data of its kind.
    /// Filtered trees use this state instead of an absent tree.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.leaves.is_empty()
    }

    pub fn clear_children_and_leaves(&mut self) {
        self.children.clear();
        self.leaves.clear();
    }

    /// Deep copy of the whole subtree. Every node and every per-file
    /// collection of the copy is owned independently of `self`. This holds as
    /// long as nodes own all their data; a shared handle (`Rc`, `Arc`) in any
    /// field would alias the copy with the original.
    #[must_use]
    pub fn copy_tree(&self) -> CoverageNode {
        self.clone()
    }

    /// Aggregated coverage of `metric` over all leaves in this subtree.
    /// Computed on every call; nothing is cached on the node.
    pub fn coverage(&self, metric: Metric) -> Coverage {
        self.iter()
            .flat_map(|node| node.leaves.iter())
            .filter(|leaf| leaf.metric == metric)
            .map(|leaf| leaf.coverage)
            .sum()
    }

    /// Coverage per metric present in this subtree.
    ///
    /// Leaf metrics are summed from the leaves. Structural metrics count the
    /// nodes of that metric: a node is covered when at least one of its lines
    /// is covered.
    pub fn metrics_distribution(&self) -> BTreeMap<Metric, Coverage> {
        let mut distribution: BTreeMap<Metric, Coverage> = BTreeMap::new();
        for node in self.iter() {
            if !node.metric.is_leaf() {
                let hit = if node.coverage(Metric::Line).covered() > 0 {
                    Coverage::new(1, 0)
                } else {
                    Coverage::new(0, 1)
                };
                let entry = distribution.entry(node.metric).or_default();
                *entry = entry.add(hit);
            }
            for leaf in &node.leaves {
                let entry = distribution.entry(leaf.metric).or_default();
                *entry = entry.add(leaf.coverage);
            }
        }
        distribution
    }

    /// Pre-order traversal yielding each node with its parent.
    pub fn walk(&self) -> Nodes<'_> {
        Nodes {
            stack: vec![(None, self)],
        }
    }

    /// Pre-order traversal of this subtree, starting with `self`.
    pub fn iter(&self) -> impl Iterator<Item = &CoverageNode> {
        self.walk().map(|(_, node)| node)
    }

    /// All nodes with the given metric, in pre-order.
    pub fn all(&self, metric: Metric) -> Vec<&CoverageNode> {
        self.iter().filter(|node| node.metric == metric).collect()
    }

    /// All file nodes, in pre-order.
    pub fn all_file_nodes(&self) -> Vec<&CoverageNode> {
        self.iter().filter(|node| node.is_file()).collect()
    }

    /// Apply `f` to every file node. File nodes are not descended into.
    pub fn for_each_file_mut(&mut self, mut f: impl FnMut(&mut CoverageNode)) {
        let mut stack: Vec<&mut CoverageNode> = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_file() {
                f(node);
            } else {
                stack.extend(node.children.iter_mut());
            }
        }
    }

    pub fn find(&self, metric: Metric, name: &str) -> Option<&CoverageNode> {
        self.iter()
            .find(|node| node.metric == metric && node.name == name)
    }

    /// Look up a node by metric and [`stable_hash`](Self::stable_hash).
    pub fn find_by_hash_code(&self, metric: Metric, hash: u32) -> Option<&CoverageNode> {
        self.iter()
            .find(|node| node.metric == metric && node.stable_hash() == hash)
    }

    /// 32-bit FNV-1a hash of the node identity: the path for file nodes, the
    /// name otherwise. Stable across builds and processes.
    pub fn stable_hash(&self) -> u32 {
        let identity = match &self.kind {
            NodeKind::File(data) if !data.path.is_empty() => data.path.as_str(),
            _ => self.name.as_str(),
        };
        fnv1a(identity.as_bytes())
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    })
}

/// Iterator returned by [`CoverageNode::walk`].
pub struct Nodes<'a> {
    stack: Vec<(Option<&'a CoverageNode>, &'a CoverageNode)>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = (Option<&'a CoverageNode>, &'a CoverageNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (parent, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (Some(node), child)));
        Some((parent, node))
    }
}

use std::path::Path;

use tracing::debug;

use crate::error::{CovtreeError, Result};
use crate::metric::Metric;
use crate::node::CoverageNode;
use crate::tree;

/// Read a coverage tree from a JSON file.
///
/// With `strict`, a tree whose indirect coverage changes refer to lines
/// without coverage is rejected. Without it such entries are dropped with a
/// warning.
pub fn load_tree(path: &Path, strict: bool) -> Result<CoverageNode> {
    let content = std::fs::read(path)?;
    let root = parse_tree(&content, strict)?;
    debug!(path = %path.display(), files = root.all_file_nodes().len(), "loaded coverage tree");
    Ok(root)
}

/// Parse a coverage tree from JSON bytes. See [`load_tree`].
pub fn parse_tree(content: &[u8], strict: bool) -> Result<CoverageNode> {
    let mut root: CoverageNode = serde_json::from_slice(content)?;
    validate(&root)?;
    if strict {
        tree::check_consistency(&root)?;
    } else {
        let dropped = tree::drop_inconsistent_changes(&mut root);
        if dropped > 0 {
            debug!(dropped, "dropped indirect coverage changes without line coverage");
        }
    }
    Ok(root)
}

/// File payloads belong to FILE nodes, and FILE nodes carry a payload.
fn validate(root: &CoverageNode) -> Result<()> {
    for node in root.iter() {
        match (node.metric == Metric::File, node.is_file()) {
            (true, false) => {
                return Err(CovtreeError::InvalidTree(format!(
                    "FILE node '{}' has no file data",
                    node.name
                )));
            }
            (false, true) => {
                return Err(CovtreeError::InvalidTree(format!(
                    "{} node '{}' carries file data",
                    node.metric, node.name
                )));
            }
            _ => {}
        }
        if node.metric.is_leaf() {
            return Err(CovtreeError::InvalidTree(format!(
                "{} is not a node metric ('{}')",
                node.metric, node.name
            )));
        }
    }
    Ok(())
}

#![no_main]
use libfuzzer_sys::fuzz_target;

use covtree::ingest::parse_tree;
use covtree::tree::{create_change_coverage_tree, create_indirect_coverage_changes_tree};

fuzz_target!(|data: &[u8]| {
    // Strict loading rejects inconsistent indirect changes, so neither
    // filter may panic on a tree that loads.
    if let Ok(root) = parse_tree(data, true) {
        let change = create_change_coverage_tree(&root);
        let indirect = create_indirect_coverage_changes_tree(&root);
        assert_eq!(change.name, root.name);
        assert_eq!(indirect.name, root.name);
    }
});

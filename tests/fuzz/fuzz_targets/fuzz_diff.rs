#![no_main]
use libfuzzer_sys::fuzz_target;

use covtree::diff::{apply_changed_lines, parse_diff, ChangedLines};
use covtree::metric::Metric;
use covtree::node::{CoverageNode, FileData};

fuzz_target!(|data: &[u8]| {
    // Diff parser must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        let lines: ChangedLines = parse_diff(s);
        let mut root = CoverageNode::new(Metric::Module, "fuzz");
        for path in lines.keys() {
            root.add_child(CoverageNode::file(path.clone(), FileData::new(path.clone())));
        }
        let _ = apply_changed_lines(&mut root, &lines);
    }
});

/// Granularity of a coverage value or tree node.
///
/// The declaration order is significant: metrics compare from the coarsest
/// structural level (`Module`) down to the finest instrumented one
/// (`Instruction`), which is also the column order used by tables.
use serde::{Deserialize, Serialize};

use crate::error::CovtreeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    Module,
    Package,
    File,
    Class,
    Method,
    Line,
    Branch,
    Instruction,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Module,
        Metric::Package,
        Metric::File,
        Metric::Class,
        Metric::Method,
        Metric::Line,
        Metric::Branch,
        Metric::Instruction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Module => "MODULE",
            Metric::Package => "PACKAGE",
            Metric::File => "FILE",
            Metric::Class => "CLASS",
            Metric::Method => "METHOD",
            Metric::Line => "LINE",
            Metric::Branch => "BRANCH",
            Metric::Instruction => "INSTRUCTION",
        }
    }

    /// Leaf metrics carry instrumented coverage values; the others describe
    /// the structure of the tree.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Metric::Line | Metric::Branch | Metric::Instruction)
    }
}

impl std::str::FromStr for Metric {
    type Err = CovtreeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CovtreeError::UnknownMetric(s.to_string()))
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

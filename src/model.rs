//! The coverage value type shared by every node of a coverage tree.
//!
//! A [`Coverage`] is an immutable `(covered, missed)` pair. Trees only ever
//! aggregate coverage with [`Coverage::add`], never by subtraction, so sums are
//! independent of traversal order.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// Number of covered and missed items for one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coverage {
    covered: u64,
    missed: u64,
}

impl Coverage {
    /// Coverage without any data. `is_set()` is false.
    pub const NO_COVERAGE: Coverage = Coverage::new(0, 0);

    pub const fn new(covered: u64, missed: u64) -> Self {
        Self { covered, missed }
    }

    #[must_use]
    pub fn covered(&self) -> u64 {
        self.covered
    }

    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.covered.saturating_add(self.missed)
    }

    /// Distinguishes "no data" from "0% covered".
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.total() > 0
    }

    /// Pairwise sum of both counters, saturating at `u64::MAX`.
    #[must_use]
    pub fn add(self, other: Coverage) -> Coverage {
        Coverage::new(
            self.covered.saturating_add(other.covered),
            self.missed.saturating_add(other.missed),
        )
    }

    /// `covered / total`, or `None` when no data is available.
    #[must_use]
    pub fn covered_fraction(&self) -> Option<f64> {
        self.is_set().then(|| rate(self.covered, self.total()))
    }

    /// `missed / total`, or `None` when no data is available.
    #[must_use]
    pub fn missed_fraction(&self) -> Option<f64> {
        self.is_set().then(|| rate(self.missed, self.total()))
    }

    /// Covered fraction scaled to 0.0–100.0.
    #[must_use]
    pub fn covered_percentage(&self) -> Option<f64> {
        self.covered_fraction().map(|f| f * 100.0)
    }

    /// Render as e.g. `"66.67%"`, or `"n/a"` without data.
    #[must_use]
    pub fn format_covered_percentage(&self) -> String {
        match self.covered_percentage() {
            Some(pct) => format!("{pct:.2}%"),
            None => "n/a".to_string(),
        }
    }
}

impl Add for Coverage {
    type Output = Coverage;

    fn add(self, other: Coverage) -> Coverage {
        Coverage::add(self, other)
    }
}

impl Sum for Coverage {
    fn sum<I: Iterator<Item = Coverage>>(iter: I) -> Coverage {
        iter.fold(Coverage::NO_COVERAGE, Coverage::add)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.covered, self.total())
    }
}

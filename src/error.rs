use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovtreeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown metric: '{0}'")]
    UnknownMetric(String),

    #[error("Unknown table: '{0}'")]
    UnknownTable(String),

    #[error("Indirect coverage change on line {line} of '{path}' has no line coverage")]
    MissingLineCoverage { path: String, line: u32 },

    #[error("Invalid coverage tree: {0}")]
    InvalidTree(String),
}

pub type Result<T> = std::result::Result<T, CovtreeError>;

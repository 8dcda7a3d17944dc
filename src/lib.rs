pub mod cli;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod metric;
pub mod model;
pub mod node;
pub mod report;
pub mod tree;
pub mod view;

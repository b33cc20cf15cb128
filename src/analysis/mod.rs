//! Aggregation of vote tallies across sources.

pub mod aggregator;
pub mod summary;

pub use aggregator::Aggregator;
pub use summary::{percentage, summarize};

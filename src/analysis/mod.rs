//! Analysis modules.
//!
//! Aggregation of task lists into report and dashboard statistics.

pub mod aggregator;

pub use aggregator::*;

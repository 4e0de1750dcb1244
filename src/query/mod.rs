// src/query/mod.rs
pub mod aggregate;
pub mod classify;
pub mod qualitative;

pub use aggregate::aggregate_sum;
pub use classify::{Classification, MetricGroup};
pub use qualitative::{qualitative_table, QualitativeTable};

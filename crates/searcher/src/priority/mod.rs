//! Priority-driven selection.
//!
//! - `weigher`: the [`Weigher`] capability and the sum combinator
//! - `weighers`: concrete policies
//! - `bucket`: bucketed searcher with lazy re-bucketing and aging
//! - `rescan`: full-scan searcher with exact priorities

mod bucket;
mod rescan;
mod weigher;
pub mod weighers;

pub use bucket::PrioritySearcher;
pub use rescan::RescanSearcher;
pub use weigher::{SumWeigher, Weigher};
pub use weighers::{BucketByFunctionWeigher, CoverageWeigher, MetricWeigher, TraceWeigher};

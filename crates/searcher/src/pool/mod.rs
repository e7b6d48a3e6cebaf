//! Decorators that gather states into shared pools: epochs and merge points.

mod bump_merging;
mod epoch;
mod merging;

pub use bump_merging::BumpMergingSearcher;
pub use epoch::{EpochSearcher, DEFAULT_WATERMARK};
pub use merging::MergingSearcher;

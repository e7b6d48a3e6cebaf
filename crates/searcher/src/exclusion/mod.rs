//! Decorators that park states away from their base.

mod demotion;
mod filter;

pub use demotion::DemotionSearcher;
pub use filter::{read_filter_file, FilterMode, FilterSearcher};

//! Decorators that keep the executor on one state for a while.

mod batching;
mod second_chance;

pub use batching::{BatchingSearcher, Budgets};
pub use second_chance::SecondChanceSearcher;

//! Container-backed strategies with no inner searcher.

mod fifo;
mod lifo;
mod phased;
mod random;
mod round_robin;
mod weighted;

pub use fifo::FifoSearcher;
pub use lifo::LifoSearcher;
pub use phased::PhasedSearcher;
pub use random::RandomSearcher;
pub use round_robin::RoundRobinSearcher;
pub use weighted::WeightedRandomSearcher;

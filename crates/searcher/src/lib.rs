//! State scheduling for the symbolic executor.
//!
//! A scheduler is a chain of [`Searcher`]s: one base strategy that actually
//! holds states, wrapped by decorators that buffer, park, merge, or audit
//! states on their way in and out. [`build_searcher`] assembles a chain from
//! a [`SearcherConfig`].
//!
//! - `primitive`: container-backed strategies (FIFO, LIFO, random, ...)
//! - `priority`: weighers and the bucketed and rescan priority engines
//! - `interleaved`: several strategies taking turns
//! - `budget`: batching and second-chance decorators
//! - `exclusion`: filter and demotion decorators
//! - `pool`: epoch, convergence-merge and bump-merge decorators
//! - `xchk`, `deepening`, `string_prune`: single-purpose decorators

pub mod budget;
pub mod config;
pub mod deepening;
pub mod error;
pub mod exclusion;
pub mod factory;
pub mod interleaved;
pub mod pool;
pub mod primitive;
pub mod priority;
pub mod rng;
pub mod searcher;
pub mod string_prune;
pub mod weight;
pub mod xchk;

#[cfg(test)]
mod test_support;

pub use config::{BaseStrategy, SearcherConfig, WeigherKind};
pub use error::SearchError;
pub use factory::{build_base, build_searcher};
pub use rng::SharedRng;
pub use searcher::Searcher;
pub use weight::WeightKind;

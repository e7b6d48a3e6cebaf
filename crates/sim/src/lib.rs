//! Drives a configured searcher chain against a synthetic workload.
//!
//! The workload forks, terminates, and mutates states from a seeded RNG so a
//! run is fully reproducible: same config and seed, same selection trace.

pub mod workload;

pub use workload::{simulate, Run, RunSummary, Workload};

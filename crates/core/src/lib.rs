//! Executor-side vocabulary shared by every scheduler component.
//!
//! States live in the executor's arena; schedulers only ever hold
//! [`StateId`] handles and read [`StateAttributes`] through the
//! [`Executor`] trait.

pub mod config;
pub mod error;
pub mod executor;
pub mod sim;
pub mod state;
pub mod update;

pub use error::*;
pub use executor::{ExecutionStats, Executor};
pub use sim::SimExecutor;
pub use state::*;
pub use update::Update;

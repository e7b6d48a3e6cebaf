use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::invariant_violation;
use crate::state::{FunctionId, StateAttributes, StateId};

/// Global execution counters the scheduler reads.
///
/// All counters are monotonic. `uncovered_instructions` grows as new code is
/// discovered, so `covered + uncovered` rising means new code was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub instructions: u64,
    pub covered_instructions: u64,
    pub uncovered_instructions: u64,
    pub queries_top_level: u64,
}

impl ExecutionStats {
    pub fn total_instructions(&self) -> u64 {
        self.covered_instructions + self.uncovered_instructions
    }
}

/// The executor as seen from the scheduler.
///
/// Mutating calls are only issued by the epoch and merge decorators.
pub trait Executor {
    /// Attributes of a live state, `None` if the handle is unknown.
    fn state(&self, id: StateId) -> Option<&StateAttributes>;

    fn stats(&self) -> ExecutionStats;

    /// Monotonic wall time.
    fn now(&self) -> Duration;

    fn pretty_name(&self, function: FunctionId) -> String;

    /// Printable view of the state's address space, used for cross-checking.
    fn address_space_dump(&self, id: StateId) -> String;

    fn concretize_state(&mut self, id: StateId);

    /// Retire a state. Its removal arrives through a later `notify`.
    fn terminate_state(&mut self, id: StateId);

    /// Fold `other` into `base`. Returns `false` if the two are incompatible.
    fn merge_states(&mut self, base: StateId, other: StateId) -> bool;

    /// Advance a state held at a merge point past it.
    fn step_past_merge(&mut self, id: StateId);

    /// Attributes of a state the caller is known to track.
    #[track_caller]
    fn attributes(&self, id: StateId) -> &StateAttributes {
        match self.state(id) {
            Some(attrs) => attrs,
            None => invariant_violation("executor", Some(id), "attributes requested for unknown state"),
        }
    }

    fn is_compact(&self, id: StateId) -> bool {
        self.attributes(id).is_compact_form
    }
}

//! In-memory executor used by tests and the search simulator.
//!
//! States carry their attributes plus a toy byte-addressed memory whose
//! dump feeds cross-checking. Time is virtual and only moves when the
//! driver calls [`SimExecutor::advance_clock`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::error::invariant_violation;
use crate::executor::{ExecutionStats, Executor};
use crate::state::{FunctionId, StateAttributes, StateId};

/// Concretization pins symbolic bytes; the sim records it as a write here.
const CONCRETE_ADDR: u64 = 0xc0c0;

#[derive(Debug, Clone, Default)]
struct SimState {
    attrs: StateAttributes,
    memory: BTreeMap<u64, u8>,
}

/// Arena executor with virtual time and scripted statistics.
#[derive(Debug, Default)]
pub struct SimExecutor {
    states: BTreeMap<StateId, SimState>,
    next_id: u64,
    stats: ExecutionStats,
    clock: Duration,
    names: BTreeMap<FunctionId, String>,
    terminated: Vec<StateId>,
    concretized: Vec<StateId>,
    merges: Vec<(StateId, StateId)>,
}

impl SimExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh state with the given attributes.
    pub fn spawn(&mut self, attrs: StateAttributes) -> StateId {
        let id = StateId(self.next_id);
        self.next_id += 1;
        self.states.insert(
            id,
            SimState {
                attrs,
                memory: BTreeMap::new(),
            },
        );
        id
    }

    /// Copy `parent` into a new state, as a two-way branch would.
    pub fn fork(&mut self, parent: StateId) -> StateId {
        let mut child = self.sim_state(parent).clone();
        child.attrs.depth_weight /= 2.0;
        child.attrs.covered_new = false;
        if let Some(parent_state) = self.states.get_mut(&parent) {
            parent_state.attrs.depth_weight /= 2.0;
        }
        let id = StateId(self.next_id);
        self.next_id += 1;
        self.states.insert(id, child);
        id
    }

    /// Drop a state from the arena once its removal has been reported.
    pub fn discard(&mut self, id: StateId) {
        self.states.remove(&id);
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn live_ids(&self) -> Vec<StateId> {
        self.states.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn attrs_mut(&mut self, id: StateId) -> &mut StateAttributes {
        match self.states.get_mut(&id) {
            Some(s) => &mut s.attrs,
            None => invariant_violation("sim", Some(id), "mutable access to unknown state"),
        }
    }

    /// Write one byte into a state's memory.
    pub fn write_memory(&mut self, id: StateId, addr: u64, byte: u8) {
        match self.states.get_mut(&id) {
            Some(s) => {
                s.memory.insert(addr, byte);
            }
            None => invariant_violation("sim", Some(id), "memory write to unknown state"),
        }
    }

    pub fn set_function_name(&mut self, function: FunctionId, name: impl Into<String>) {
        self.names.insert(function, name.into());
    }

    pub fn advance_clock(&mut self, by: Duration) {
        self.clock += by;
    }

    /// Count `n` executed instructions.
    pub fn step(&mut self, n: u64) {
        self.stats.instructions += n;
    }

    /// Mark `n` more instructions as covered.
    pub fn cover(&mut self, n: u64) {
        self.stats.covered_instructions += n;
    }

    /// Register `n` newly discovered, not yet covered instructions.
    pub fn discover(&mut self, n: u64) {
        self.stats.uncovered_instructions += n;
    }

    /// Count `n` top-level solver queries.
    pub fn solve(&mut self, n: u64) {
        self.stats.queries_top_level += n;
    }

    /// States retired through [`Executor::terminate_state`] since the last call.
    pub fn take_terminated(&mut self) -> Vec<StateId> {
        std::mem::take(&mut self.terminated)
    }

    pub fn terminated(&self) -> &[StateId] {
        &self.terminated
    }

    pub fn concretized(&self) -> &[StateId] {
        &self.concretized
    }

    /// Successful merges as `(base, absorbed)` pairs.
    pub fn merges(&self) -> &[(StateId, StateId)] {
        &self.merges
    }

    fn sim_state(&self, id: StateId) -> &SimState {
        match self.states.get(&id) {
            Some(s) => s,
            None => invariant_violation("sim", Some(id), "unknown state"),
        }
    }

    fn mergeable(&self, base: StateId, other: StateId) -> bool {
        let (a, b) = (self.sim_state(base), self.sim_state(other));
        a.attrs.program_counter == b.attrs.program_counter
            && a.attrs.call_stack == b.attrs.call_stack
            && a.memory.keys().eq(b.memory.keys())
    }
}

impl Executor for SimExecutor {
    fn state(&self, id: StateId) -> Option<&StateAttributes> {
        self.states.get(&id).map(|s| &s.attrs)
    }

    fn stats(&self) -> ExecutionStats {
        self.stats
    }

    fn now(&self) -> Duration {
        self.clock
    }

    fn pretty_name(&self, function: FunctionId) -> String {
        self.names
            .get(&function)
            .cloned()
            .unwrap_or_else(|| format!("fn{}", function.0))
    }

    fn address_space_dump(&self, id: StateId) -> String {
        let state = self.sim_state(id);
        let mut out = format!("pc={}\n", state.attrs.program_counter.0);
        for (addr, byte) in &state.memory {
            let _ = writeln!(out, "{addr:#010x}: {byte:02x}");
        }
        out
    }

    fn concretize_state(&mut self, id: StateId) {
        let attrs = self.attrs_mut(id);
        attrs.constraint_count = 0;
        attrs.string_compares.clear();
        self.write_memory(id, CONCRETE_ADDR, 0);
        self.concretized.push(id);
    }

    fn terminate_state(&mut self, id: StateId) {
        if !self.terminated.contains(&id) {
            self.terminated.push(id);
        }
    }

    fn merge_states(&mut self, base: StateId, other: StateId) -> bool {
        if base == other || !self.mergeable(base, other) {
            return false;
        }
        let absorbed = self.sim_state(other).attrs.clone();
        let target = self.attrs_mut(base);
        target.constraint_count = target.constraint_count.min(absorbed.constraint_count);
        target.depth_weight += absorbed.depth_weight;
        self.merges.push((base, other));
        true
    }

    fn step_past_merge(&mut self, id: StateId) {
        self.attrs_mut(id).program_counter.0 += 1;
    }
}

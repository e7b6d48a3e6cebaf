use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to one execution state in the executor's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "es#{}", self.0)
    }
}

/// Identity of a function in the program under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Identity of an instruction; merge points are expressed in these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramPoint(pub u64);

/// Identity of the most recent branch a state took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchId(pub u32);

/// One `(byte == const)` comparison against a symbolic array at a constant index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringCompare {
    pub array: String,
    pub index: u64,
}

impl StringCompare {
    pub fn new(array: impl Into<String>, index: u64) -> Self {
        Self {
            array: array.into(),
            index,
        }
    }
}

/// Read-only view of a state, as far as scheduling is concerned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateAttributes {
    /// Frozen form; only scheduled when nothing else is available.
    pub is_compact_form: bool,
    /// The last step executed at least one previously uncovered instruction.
    pub covered_new: bool,
    /// Call stack, outermost frame first.
    pub call_stack: Vec<FunctionId>,
    pub last_branch_id: BranchId,
    pub program_counter: ProgramPoint,

    // ── Metric inputs ──────────────────────────────────────────
    /// Fork-depth weight (halves on every fork in the classic scheme).
    pub depth_weight: f64,
    /// Global hit count of the instruction at the program counter.
    pub pc_hit_count: u64,
    /// Instructions executed along the current call path.
    pub call_path_instructions: u64,
    /// Accumulated solver time spent on this state, in seconds.
    pub query_cost: f64,
    /// Static distance to the nearest uncovered instruction (0 = unknown).
    pub min_dist_to_uncovered: u64,
    /// Instructions since this state last covered new code (0 = never).
    pub insts_since_cov_new: u64,
    /// Instructions this state has executed in total.
    pub total_insts: u64,
    /// Size of the path constraint set.
    pub constraint_count: u64,

    /// Byte comparisons against symbolic arrays in the path constraints.
    pub string_compares: Vec<StringCompare>,
}

impl StateAttributes {
    /// Innermost frame, if any.
    pub fn top_frame(&self) -> Option<FunctionId> {
        self.call_stack.last().copied()
    }

    /// The last `depth` frames, innermost last.
    pub fn trace(&self, depth: usize) -> &[FunctionId] {
        let start = self.call_stack.len().saturating_sub(depth);
        &self.call_stack[start..]
    }
}

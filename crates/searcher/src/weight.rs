use serde::{Deserialize, Serialize};

use klee_core::StateAttributes;

/// Per-state metrics usable as sampling weights or priorities.
///
/// Larger weight means more attractive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightKind {
    /// Fork-depth weight; shallow states weigh more.
    Depth,
    /// Inverse square of the hit count at the program counter.
    InstCount,
    /// Inverse of the instructions spent on the current call path.
    CallPathInstCount,
    /// Inverse solver cost.
    QueryCost,
    /// Inverse square distance to uncovered code.
    MinDistToUncovered,
    /// Distance to uncovered code plus recency of new coverage.
    CoveringNew,
    ConstraintCount,
    StackDepth,
}

impl WeightKind {
    pub fn weigh(self, attrs: &StateAttributes) -> f64 {
        match self {
            WeightKind::Depth => attrs.depth_weight,
            WeightKind::InstCount => {
                let inv = 1.0 / attrs.pc_hit_count.max(1) as f64;
                inv * inv
            }
            WeightKind::CallPathInstCount => 1.0 / attrs.call_path_instructions.max(1) as f64,
            WeightKind::QueryCost => {
                if attrs.query_cost < 0.1 {
                    1.0
                } else {
                    1.0 / attrs.query_cost
                }
            }
            WeightKind::MinDistToUncovered => {
                let inv = inv_dist(attrs.min_dist_to_uncovered);
                inv * inv
            }
            WeightKind::CoveringNew => {
                let inv_md2u = inv_dist(attrs.min_dist_to_uncovered);
                let inv_cov_new = if attrs.insts_since_cov_new == 0 {
                    0.0
                } else {
                    1.0 / attrs.insts_since_cov_new.saturating_sub(1000).max(1) as f64
                };
                inv_cov_new * inv_cov_new + inv_md2u * inv_md2u
            }
            WeightKind::ConstraintCount => attrs.constraint_count as f64,
            WeightKind::StackDepth => attrs.call_stack.len() as f64,
        }
    }
}

/// Unknown distance counts as far away.
fn inv_dist(d: u64) -> f64 {
    1.0 / if d == 0 { 10_000.0 } else { d as f64 }
}

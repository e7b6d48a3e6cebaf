//! Concrete weighing policies.

use std::collections::HashMap;

use klee_core::{Executor, FunctionId, StateId};

use crate::priority::weigher::Weigher;
use crate::weight::WeightKind;

/// Pushes a state that just covered new code to the back (-1), letting the
/// others catch up.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoverageWeigher;

impl Weigher for CoverageWeigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        if exe.attributes(id).covered_new {
            -1
        } else {
            0
        }
    }

    fn spawn_fresh(&self) -> Box<dyn Weigher> {
        Box::new(*self)
    }

    fn describe(&self) -> String {
        "Coverage".into()
    }
}

/// Penalizes functions that keep getting scheduled.
///
/// Keyed by the innermost frame; states with an empty stack share one key.
#[derive(Debug, Default)]
pub struct BucketByFunctionWeigher {
    hits: HashMap<Option<FunctionId>, u64>,
}

impl BucketByFunctionWeigher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self, function: Option<FunctionId>) -> u64 {
        self.hits.get(&function).copied().unwrap_or(0)
    }
}

impl Weigher for BucketByFunctionWeigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        let attrs = exe.attributes(id);
        let hits = self.hits(attrs.top_frame());
        if attrs.covered_new && hits < 2 {
            return -1;
        }
        -((hits / 2) as i64)
    }

    fn on_selected(&mut self, exe: &dyn Executor, id: StateId) {
        let key = exe.attributes(id).top_frame();
        *self.hits.entry(key).or_insert(0) += 1;
    }

    fn spawn_fresh(&self) -> Box<dyn Weigher> {
        Box::new(Self::new())
    }

    fn describe(&self) -> String {
        "BucketByFunction".into()
    }
}

/// Penalizes call-stack suffixes that have been scheduled before.
#[derive(Debug)]
pub struct TraceWeigher {
    depth: usize,
    counts: HashMap<Vec<FunctionId>, u64>,
}

impl TraceWeigher {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            counts: HashMap::new(),
        }
    }
}

impl Weigher for TraceWeigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        let trace = exe.attributes(id).trace(self.depth);
        -(self.counts.get(trace).copied().unwrap_or(0) as i64)
    }

    fn on_selected(&mut self, exe: &dyn Executor, id: StateId) {
        let trace = exe.attributes(id).trace(self.depth).to_vec();
        *self.counts.entry(trace).or_insert(0) += 1;
    }

    fn spawn_fresh(&self) -> Box<dyn Weigher> {
        Box::new(Self::new(self.depth))
    }

    fn describe(&self) -> String {
        format!("Trace(depth={})", self.depth)
    }
}

/// A [`WeightKind`] metric scaled into integer priorities.
#[derive(Debug, Clone, Copy)]
pub struct MetricWeigher {
    kind: WeightKind,
    scale: f64,
}

impl MetricWeigher {
    pub fn new(kind: WeightKind, scale: f64) -> Self {
        Self { kind, scale }
    }
}

impl Weigher for MetricWeigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        // float-to-int casts saturate
        (self.kind.weigh(exe.attributes(id)) * self.scale).round() as i64
    }

    fn spawn_fresh(&self) -> Box<dyn Weigher> {
        Box::new(*self)
    }

    fn describe(&self) -> String {
        format!("Metric({:?} x {})", self.kind, self.scale)
    }
}

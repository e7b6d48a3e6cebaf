use indexmap::IndexMap;

use klee_core::{Executor, StateId, Update};

use crate::rng::SharedRng;
use crate::searcher::Searcher;
use crate::weight::WeightKind;

/// Full reweigh every this many notifies.
const REWEIGH_INTERVAL: u32 = 16;

/// Samples states with probability proportional to a metric weight.
#[derive(Debug)]
pub struct WeightedRandomSearcher {
    weights: IndexMap<StateId, f64>,
    kind: WeightKind,
    rng: SharedRng,
    notifies: u32,
}

impl WeightedRandomSearcher {
    pub fn new(kind: WeightKind, rng: SharedRng) -> Self {
        Self {
            weights: IndexMap::new(),
            kind,
            rng,
            notifies: 0,
        }
    }

    fn sample(&self, exe: &dyn Executor, allow_compact: bool) -> Option<StateId> {
        let eligible: Vec<(StateId, f64)> = self
            .weights
            .iter()
            .filter(|(id, _)| allow_compact || !exe.is_compact(**id))
            .map(|(id, w)| (*id, w.max(0.0)))
            .collect();
        let pool: Vec<(StateId, f64)> = if eligible.is_empty() {
            self.weights.iter().map(|(id, w)| (*id, w.max(0.0))).collect()
        } else {
            eligible
        };
        if pool.is_empty() {
            return None;
        }

        let total: f64 = pool.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Some(pool[self.rng.index(pool.len())].0);
        }
        let mut remaining = self.rng.unit() * total;
        for (id, w) in &pool {
            remaining -= w;
            if remaining < 0.0 {
                return Some(*id);
            }
        }
        pool.last().map(|(id, _)| *id)
    }

    /// Compact states keep the weight they had when compacted.
    fn refresh(&mut self, exe: &dyn Executor, id: StateId) {
        if exe.is_compact(id) {
            return;
        }
        let w = self.kind.weigh(exe.attributes(id));
        if let Some(slot) = self.weights.get_mut(&id) {
            *slot = w;
        }
    }
}

impl Searcher for WeightedRandomSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let first = self.sample(&*exe, allow_compact)?;
        self.refresh(&*exe, first);
        let id = self.sample(&*exe, allow_compact)?;
        self.refresh(&*exe, id);
        Some(id)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.weights.shift_remove(&id);
        }
        for id in update.arrivals() {
            let w = self.kind.weigh(exe.attributes(id));
            self.weights.insert(id, w);
        }

        let Some(cur) = current.filter(|c| self.weights.contains_key(c)) else {
            return;
        };
        self.refresh(exe, cur);

        self.notifies += 1;
        if self.notifies >= REWEIGH_INTERVAL {
            self.notifies = 0;
            let ids: Vec<_> = self.weights.keys().copied().collect();
            for id in ids {
                self.refresh(exe, id);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.kind, self.rng.clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.weights.keys().copied());
    }

    fn describe(&self) -> String {
        format!("WeightedRandomSearcher({:?})", self.kind)
    }
}

use indexmap::IndexSet;

use klee_core::{Executor, StateId, Update};

use crate::priority::weigher::Weigher;
use crate::rng::SharedRng;
use crate::searcher::Searcher;

/// Evaluates every state on each `select`; ties at the top break randomly.
///
/// O(n) per selection, never stale. Suited to small pools and weighers
/// whose values move on every step.
pub struct RescanSearcher {
    states: IndexSet<StateId>,
    weigher: Box<dyn Weigher>,
    rng: SharedRng,
}

impl RescanSearcher {
    pub fn new(weigher: Box<dyn Weigher>, rng: SharedRng) -> Self {
        Self {
            states: IndexSet::new(),
            weigher,
            rng,
        }
    }
}

impl Searcher for RescanSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let mut candidates: Vec<StateId> = self
            .states
            .iter()
            .copied()
            .filter(|id| allow_compact || !exe.is_compact(*id))
            .collect();
        if candidates.is_empty() {
            candidates = self.states.iter().copied().collect();
        }

        let mut best = i64::MIN;
        let mut ties = Vec::new();
        for id in candidates {
            let pr = self.weigher.priority(&*exe, id);
            if pr > best {
                best = pr;
                ties.clear();
            }
            if pr == best {
                ties.push(id);
            }
        }
        if ties.is_empty() {
            return None;
        }

        let id = ties[self.rng.index(ties.len())];
        self.weigher.on_selected(&*exe, id);
        Some(id)
    }

    fn notify(&mut self, _exe: &dyn Executor, _current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.states.shift_remove(&id);
        }
        self.states.extend(update.arrivals());
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.weigher.spawn_fresh(), self.rng.clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.states.iter().copied());
    }

    fn describe(&self) -> String {
        format!("RescanSearcher(weigher={})", self.weigher.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::weighers::{MetricWeigher, TraceWeigher};
    use klee_core::FunctionId;
    use crate::test_support::{add_all, spawn_states};
    use crate::weight::WeightKind;

    #[test]
    fn test_picks_maximum() {
        let (mut exe, ids) = spawn_states(3);
        exe.attrs_mut(ids[2]).depth_weight = 7.0;
        let mut s = RescanSearcher::new(
            Box::new(MetricWeigher::new(WeightKind::Depth, 1.0)),
            SharedRng::seeded(1),
        );
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[2]));

        // no staleness: a change is seen immediately
        exe.attrs_mut(ids[0]).depth_weight = 8.0;
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
    }

    #[test]
    fn test_ties_cover_all_candidates() {
        let (mut exe, ids) = spawn_states(3);
        let mut s = RescanSearcher::new(
            Box::new(MetricWeigher::new(WeightKind::Depth, 1.0)),
            SharedRng::seeded(4),
        );
        add_all(&mut s, &exe, &ids);
        let mut seen: Vec<_> = (0..64).filter_map(|_| s.select(&mut exe, true)).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, ids);
    }

    #[test]
    fn test_selection_feeds_weigher() {
        let (mut exe, ids) = spawn_states(2);
        exe.attrs_mut(ids[0]).call_stack = vec![FunctionId(1)];
        exe.attrs_mut(ids[1]).call_stack = vec![FunctionId(2)];
        let mut s = RescanSearcher::new(Box::new(TraceWeigher::new(1)), SharedRng::seeded(0));
        add_all(&mut s, &exe, &ids);
        let a = s.select(&mut exe, true);
        let b = s.select(&mut exe, true);
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_compact_only_pool() {
        let (mut exe, ids) = spawn_states(1);
        exe.attrs_mut(ids[0]).is_compact_form = true;
        let mut s = RescanSearcher::new(
            Box::new(MetricWeigher::new(WeightKind::Depth, 1.0)),
            SharedRng::seeded(4),
        );
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, false), Some(ids[0]));
    }
}

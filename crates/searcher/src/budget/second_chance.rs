use tracing::debug;

use klee_core::{Executor, StateId, Update};

use crate::searcher::Searcher;

/// Grants the last selected state extra quanta while it keeps making progress.
///
/// Each `select` credits `boost` quanta if the total instruction count grew
/// and `boost_cov` if covered instructions grew since the previous call. A
/// positive balance re-runs the same state without asking the base.
pub struct SecondChanceSearcher {
    base: Box<dyn Searcher>,
    boost: u32,
    boost_cov: u32,
    last: Option<StateId>,
    quanta: u32,
    last_total: u64,
    last_covered: u64,
}

impl SecondChanceSearcher {
    pub fn new(base: Box<dyn Searcher>, boost: u32, boost_cov: u32) -> Self {
        Self {
            base,
            boost,
            boost_cov,
            last: None,
            quanta: 0,
            last_total: 0,
            last_covered: 0,
        }
    }

    pub fn quanta(&self) -> u32 {
        self.quanta
    }

    fn record(&mut self, exe: &dyn Executor) {
        let stats = exe.stats();
        self.last_total = stats.total_instructions();
        self.last_covered = stats.covered_instructions;
    }
}

impl Searcher for SecondChanceSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if let Some(last) = self.last {
            let stats = exe.stats();
            if stats.total_instructions() > self.last_total {
                self.quanta = self.quanta.saturating_add(self.boost);
            }
            if stats.covered_instructions > self.last_covered {
                self.quanta = self.quanta.saturating_add(self.boost_cov);
            }
            if self.quanta > 0 {
                self.quanta -= 1;
                debug!(state = %last, quanta = self.quanta, "second chance");
                self.record(&*exe);
                return Some(last);
            }
        }

        self.quanta = 0;
        self.last = self.base.select(&mut *exe, allow_compact);
        self.record(&*exe);
        self.last
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        if self.last.is_some_and(|l| update.is_departing(l)) {
            self.last = None;
            self.quanta = 0;
            self.record(exe);
        }
        self.base.notify(exe, current, update);
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone(), self.boost, self.boost_cov))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
    }

    fn describe(&self) -> String {
        format!(
            "SecondChanceSearcher(boost={}, boost_cov={}) -> {}",
            self.boost,
            self.boost_cov,
            self.base.describe()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::FifoSearcher;
    use crate::test_support::{add_all, spawn_states};

    #[test]
    fn test_progress_earns_repeat_runs() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = SecondChanceSearcher::new(Box::new(FifoSearcher::new()), 1, 1);
        add_all(&mut s, &exe, &ids);

        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        exe.cover(3);
        // both counters moved: two quanta earned, one spent
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.quanta(), 1);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.quanta(), 0);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
    }

    #[test]
    fn test_no_progress_defers_to_base() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = SecondChanceSearcher::new(Box::new(FifoSearcher::new()), 1, 1);
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
    }

    #[test]
    fn test_removed_state_loses_its_quanta() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = SecondChanceSearcher::new(Box::new(FifoSearcher::new()), 4, 4);
        add_all(&mut s, &exe, &ids);
        let first = s.select(&mut exe, true);
        exe.cover(1);
        assert_eq!(s.select(&mut exe, true), first);
        s.notify(&exe, first, &Update::removing([ids[0]]));
        assert_eq!(s.quanta(), 0);
        exe.cover(1);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
    }

    #[test]
    fn test_huge_boosts_saturate() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = SecondChanceSearcher::new(Box::new(FifoSearcher::new()), u32::MAX, u32::MAX);
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        exe.cover(1);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.quanta(), u32::MAX - 1);
        exe.cover(1);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.quanta(), u32::MAX - 1);
    }
}

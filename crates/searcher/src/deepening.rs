use std::time::Duration;

use indexmap::IndexSet;
use tracing::{debug, info};

use klee_core::{Executor, StateId, Update};

use crate::searcher::Searcher;

pub const INITIAL_BUDGET: Duration = Duration::from_secs(1);

/// Iterative deepening on wall time.
///
/// A state that runs longer than the budget since its selection is paused.
/// When the base has nothing left to offer, the budget doubles and every
/// paused state is released.
pub struct IterativeDeepeningSearcher {
    base: Box<dyn Searcher>,
    budget: Duration,
    selected: Option<(StateId, Duration)>,
    paused: IndexSet<StateId>,
}

impl IterativeDeepeningSearcher {
    pub fn new(base: Box<dyn Searcher>) -> Self {
        Self {
            base,
            budget: INITIAL_BUDGET,
            selected: None,
            paused: IndexSet::new(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn paused(&self) -> impl Iterator<Item = StateId> + '_ {
        self.paused.iter().copied()
    }

    fn select_base(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let id = self.base.select(&mut *exe, allow_compact)?;
        self.selected = Some((id, exe.now()));
        Some(id)
    }
}

impl Searcher for IterativeDeepeningSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if let Some(id) = self.select_base(exe, allow_compact) {
            return Some(id);
        }
        if self.paused.is_empty() {
            return None;
        }

        self.budget *= 2;
        info!(budget = ?self.budget, released = self.paused.len(), "increasing time budget");
        let released: Vec<_> = self.paused.drain(..).collect();
        self.base.notify(&*exe, None, &Update::adding(released));
        self.select_base(exe, allow_compact)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        if self
            .selected
            .is_some_and(|(id, _)| update.is_departing(id))
        {
            self.selected = None;
        }
        let departures: Vec<_> = update
            .departures()
            .filter(|id| !self.paused.shift_remove(id))
            .collect();
        self.base.notify(
            exe,
            current,
            &Update::from_parts(update.arrivals(), departures),
        );

        let Some(cur) = current.filter(|c| !update.is_departing(*c)) else {
            return;
        };
        let Some((selected, since)) = self.selected else {
            return;
        };
        if selected != cur || exe.now().saturating_sub(since) <= self.budget {
            return;
        }
        debug!(state = %cur, budget = ?self.budget, "pausing state over budget");
        self.base.remove_state(exe, cur);
        self.paused.insert(cur);
        self.selected = None;
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.paused.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.paused.iter().copied());
    }

    fn describe(&self) -> String {
        format!("IterativeDeepeningSearcher -> {}", self.base.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::FifoSearcher;
    use crate::test_support::{add_all, sorted_tracked, spawn_states};

    fn deepening() -> IterativeDeepeningSearcher {
        IterativeDeepeningSearcher::new(Box::new(FifoSearcher::new()))
    }

    #[test]
    fn test_slow_state_is_paused() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = deepening();
        add_all(&mut s, &exe, &ids);

        let cur = s.select(&mut exe, true);
        exe.advance_clock(Duration::from_millis(400));
        s.notify(&exe, cur, &Update::new());
        assert_eq!(s.paused().count(), 0);

        exe.advance_clock(Duration::from_millis(700));
        s.notify(&exe, cur, &Update::new());
        assert_eq!(s.paused().collect::<Vec<_>>(), vec![ids[0]]);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
        assert_eq!(sorted_tracked(&s), ids);
    }

    #[test]
    fn test_budget_doubles_when_everything_is_paused() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = deepening();
        add_all(&mut s, &exe, &ids);

        for _ in 0..2 {
            let cur = s.select(&mut exe, true);
            exe.advance_clock(Duration::from_secs(2));
            s.notify(&exe, cur, &Update::new());
        }
        assert_eq!(s.paused().count(), 2);
        assert_eq!(s.budget(), INITIAL_BUDGET);

        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.budget(), Duration::from_secs(2));
        assert_eq!(s.paused().count(), 0);
    }

    #[test]
    fn test_paused_removal_is_absorbed() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = deepening();
        add_all(&mut s, &exe, &ids);
        let cur = s.select(&mut exe, true);
        exe.advance_clock(Duration::from_secs(5));
        s.notify(&exe, cur, &Update::new());
        s.remove_state(&exe, ids[0]);
        assert_eq!(sorted_tracked(&s), vec![ids[1]]);
    }

    #[test]
    fn test_nothing_paused_returns_none() {
        let (mut exe, _) = spawn_states(0);
        let mut s = deepening();
        assert_eq!(s.select(&mut exe, true), None);
        assert_eq!(s.budget(), INITIAL_BUDGET);
    }
}

use indexmap::IndexSet;
use tracing::info;

use klee_core::{Executor, StateId, Update};

use crate::searcher::Searcher;

/// Evicts a state the base keeps choosing while no new code turns up.
///
/// After `max_repeats` consecutive re-selections with an unchanged uncovered
/// instruction count, the state moves to a demoted set. Demoted states come
/// back one at a time, oldest first, once the base has nothing left.
pub struct DemotionSearcher {
    base: Box<dyn Searcher>,
    max_repeats: u32,
    last: Option<StateId>,
    repeats: u32,
    uncovered_at_last: u64,
    demoted: IndexSet<StateId>,
}

impl DemotionSearcher {
    pub fn new(base: Box<dyn Searcher>, max_repeats: u32) -> Self {
        Self {
            base,
            max_repeats,
            last: None,
            repeats: 0,
            uncovered_at_last: 0,
            demoted: IndexSet::new(),
        }
    }

    pub fn demoted(&self) -> impl Iterator<Item = StateId> + '_ {
        self.demoted.iter().copied()
    }

    fn recover_one(&mut self, exe: &dyn Executor) {
        if let Some(id) = self.demoted.shift_remove_index(0) {
            info!(state = %id, remaining = self.demoted.len(), "recovering demoted state");
            self.base.add_state(exe, id);
        }
    }
}

impl Searcher for DemotionSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        loop {
            if self.base.is_empty() {
                self.recover_one(&*exe);
            }
            let id = self.base.select(&mut *exe, allow_compact)?;
            let uncovered = exe.stats().uncovered_instructions;

            if self.last != Some(id) || uncovered > self.uncovered_at_last {
                self.last = Some(id);
                self.repeats = 0;
                self.uncovered_at_last = uncovered;
                return Some(id);
            }

            self.repeats += 1;
            if self.repeats <= self.max_repeats {
                return Some(id);
            }

            info!(state = %id, repeats = self.repeats, "demoting state");
            self.last = None;
            self.repeats = 0;
            self.base.remove_state(&*exe, id);
            self.demoted.insert(id);
        }
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        if self.last.is_some_and(|l| update.is_departing(l)) {
            self.last = None;
            self.repeats = 0;
        }
        let departures: Vec<_> = update
            .departures()
            .filter(|id| !self.demoted.shift_remove(id))
            .collect();
        self.base.notify(
            exe,
            current,
            &Update::from_parts(update.arrivals(), departures),
        );
        if self.base.is_empty() {
            self.recover_one(exe);
        }
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.demoted.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone(), self.max_repeats))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.demoted.iter().copied());
    }

    fn describe(&self) -> String {
        format!(
            "DemotionSearcher(max_repeats={}) -> {}",
            self.max_repeats,
            self.base.describe()
        )
    }
}

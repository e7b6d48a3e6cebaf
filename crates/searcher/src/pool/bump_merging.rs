use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use klee_core::{Executor, ProgramPoint, StateId, Update};

use crate::pool::merging::at_merge_point;
use crate::searcher::Searcher;

/// Eager merging with at most one waiting state per merge point.
///
/// A state reaching an occupied merge point is merged into the waiting one
/// and retired. If the merge fails, the waiting state is bumped past the
/// point and the newcomer takes its place.
pub struct BumpMergingSearcher {
    base: Box<dyn Searcher>,
    merge_points: BTreeSet<ProgramPoint>,
    waiting: IndexMap<ProgramPoint, StateId>,
    retiring: HashSet<StateId>,
}

impl BumpMergingSearcher {
    pub fn new(base: Box<dyn Searcher>, merge_points: impl IntoIterator<Item = ProgramPoint>) -> Self {
        Self {
            base,
            merge_points: merge_points.into_iter().collect(),
            waiting: IndexMap::new(),
            retiring: HashSet::new(),
        }
    }

    pub fn waiting_at(&self, point: ProgramPoint) -> Option<StateId> {
        self.waiting.get(&point).copied()
    }

    fn release_oldest(&mut self, exe: &mut dyn Executor) -> bool {
        let Some((_, id)) = self.waiting.shift_remove_index(0) else {
            return false;
        };
        exe.step_past_merge(id);
        self.base.add_state(&*exe, id);
        true
    }
}

impl Searcher for BumpMergingSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        loop {
            if self.base.is_empty() && !self.release_oldest(exe) {
                return None;
            }
            let id = self.base.select(&mut *exe, allow_compact)?;
            let Some(point) = at_merge_point(&*exe, &self.merge_points, id) else {
                return Some(id);
            };
            self.base.remove_state(&*exe, id);

            let Some(&resident) = self.waiting.get(&point) else {
                debug!(state = %id, point = point.0, "waiting at merge point");
                self.waiting.insert(point, id);
                continue;
            };
            if exe.merge_states(resident, id) {
                debug!(state = %id, into = %resident, "merged on arrival");
                exe.terminate_state(id);
                self.retiring.insert(id);
            } else {
                debug!(state = %resident, by = %id, "bumped from merge point");
                self.waiting.insert(point, id);
                exe.step_past_merge(resident);
                self.base.add_state(&*exe, resident);
            }
        }
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        let mut departures = Vec::new();
        for id in update.departures() {
            if self.retiring.remove(&id) {
                continue;
            }
            let before = self.waiting.len();
            self.waiting.retain(|_, w| *w != id);
            if self.waiting.len() == before {
                departures.push(id);
            }
        }
        self.base.notify(
            exe,
            current,
            &Update::from_parts(update.arrivals(), departures),
        );
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.waiting.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.base.spawn_empty_clone(),
            self.merge_points.iter().copied(),
        ))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.waiting.values().copied());
        let mut retiring: Vec<_> = self.retiring.iter().copied().collect();
        retiring.sort();
        out.extend(retiring);
    }

    fn describe(&self) -> String {
        format!(
            "BumpMergingSearcher({} merge points) -> {}",
            self.merge_points.len(),
            self.base.describe()
        )
    }
}

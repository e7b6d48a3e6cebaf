//! Convergence merging: states reaching a merge point wait there until the
//! base runs dry, then every group waiting at the same point is merged.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use indexmap::IndexSet;
use tracing::{debug, info};

use klee_core::{Executor, ProgramPoint, StateId, Update};

use crate::searcher::Searcher;

pub struct MergingSearcher {
    base: Box<dyn Searcher>,
    merge_points: BTreeSet<ProgramPoint>,
    held: IndexSet<StateId>,
    retiring: HashSet<StateId>,
}

pub(crate) fn at_merge_point(
    exe: &dyn Executor,
    points: &BTreeSet<ProgramPoint>,
    id: StateId,
) -> Option<ProgramPoint> {
    let pc = exe.attributes(id).program_counter;
    points.contains(&pc).then_some(pc)
}

impl MergingSearcher {
    pub fn new(base: Box<dyn Searcher>, merge_points: impl IntoIterator<Item = ProgramPoint>) -> Self {
        Self {
            base,
            merge_points: merge_points.into_iter().collect(),
            held: IndexSet::new(),
            retiring: HashSet::new(),
        }
    }

    /// States waiting at a merge point.
    pub fn held(&self) -> impl Iterator<Item = StateId> + '_ {
        self.held.iter().copied()
    }

    /// Merge each group of held states and send the survivors back to the base.
    fn converge(&mut self, exe: &mut dyn Executor) {
        let mut groups: BTreeMap<ProgramPoint, Vec<StateId>> = BTreeMap::new();
        for id in self.held.drain(..) {
            let pc = exe.attributes(id).program_counter;
            groups.entry(pc).or_default().push(id);
        }

        for (point, mut group) in groups {
            let arrived = group.len();
            let mut survivors = 0;
            while !group.is_empty() {
                let rep = group.remove(0);
                let mut unmerged = Vec::with_capacity(group.len());
                for other in group.drain(..) {
                    if exe.merge_states(rep, other) {
                        exe.terminate_state(other);
                        self.retiring.insert(other);
                    } else {
                        unmerged.push(other);
                    }
                }
                group = unmerged;
                exe.step_past_merge(rep);
                self.base.add_state(&*exe, rep);
                survivors += 1;
            }
            info!(point = point.0, arrived, survivors, "merged states at merge point");
        }
    }
}

impl Searcher for MergingSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        while !self.base.is_empty() {
            let Some(id) = self.base.select(&mut *exe, allow_compact) else {
                break;
            };
            if at_merge_point(&*exe, &self.merge_points, id).is_none() {
                return Some(id);
            }
            debug!(state = %id, "holding state at merge point");
            self.base.remove_state(&*exe, id);
            self.held.insert(id);
        }

        if self.held.is_empty() {
            return None;
        }
        self.converge(exe);
        self.base.select(exe, allow_compact)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        let departures: Vec<_> = update
            .departures()
            .filter(|id| !self.held.shift_remove(id) && !self.retiring.remove(id))
            .collect();
        self.base.notify(
            exe,
            current,
            &Update::from_parts(update.arrivals(), departures),
        );
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.held.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.base.spawn_empty_clone(),
            self.merge_points.iter().copied(),
        ))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.held.iter().copied());
        let mut retiring: Vec<_> = self.retiring.iter().copied().collect();
        retiring.sort();
        out.extend(retiring);
    }

    fn describe(&self) -> String {
        format!(
            "MergingSearcher({} merge points) -> {}",
            self.merge_points.len(),
            self.base.describe()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::FifoSearcher;
    use crate::test_support::{add_all, sorted_tracked, spawn_states};

    fn merging(points: &[u64]) -> MergingSearcher {
        MergingSearcher::new(
            Box::new(FifoSearcher::new()),
            points.iter().map(|p| ProgramPoint(*p)),
        )
    }

    #[test]
    fn test_states_off_merge_points_pass_through() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = merging(&[9]);
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
        assert_eq!(s.held().count(), 0);
    }

    #[test]
    fn test_waiting_states_merge_once_base_drains() {
        let (mut exe, ids) = spawn_states(4);
        for id in &ids[..3] {
            exe.attrs_mut(*id).program_counter = ProgramPoint(9);
        }
        exe.attrs_mut(ids[3]).program_counter = ProgramPoint(2);
        let mut s = merging(&[9]);
        add_all(&mut s, &exe, &ids);

        assert_eq!(s.select(&mut exe, true), Some(ids[3]));
        assert_eq!(s.held().collect::<Vec<_>>(), ids[..3].to_vec());

        s.remove_state(&exe, ids[3]);
        let picked = s.select(&mut exe, true);
        assert_eq!(picked, Some(ids[0]));
        assert_eq!(exe.merges(), &[(ids[0], ids[1]), (ids[0], ids[2])]);
        assert_eq!(exe.terminated(), &[ids[1], ids[2]]);
        assert_eq!(exe.attributes(ids[0]).program_counter, ProgramPoint(10));

        // the executor reports the merged-away states gone
        s.notify(&exe, picked, &Update::removing([ids[1], ids[2]]));
        assert_eq!(sorted_tracked(&s), vec![ids[0]]);
    }

    #[test]
    fn test_unmergeable_states_each_step_past() {
        let (mut exe, ids) = spawn_states(2);
        for id in &ids {
            exe.attrs_mut(*id).program_counter = ProgramPoint(9);
        }
        exe.write_memory(ids[1], 0x40, 1);
        let mut s = merging(&[9]);
        add_all(&mut s, &exe, &ids);

        assert!(s.select(&mut exe, true).is_some());
        assert!(exe.merges().is_empty());
        for id in &ids {
            assert_eq!(exe.attributes(*id).program_counter, ProgramPoint(10));
        }
        assert_eq!(sorted_tracked(&s), ids);
    }

    #[test]
    fn test_groups_by_merge_point() {
        let (mut exe, ids) = spawn_states(4);
        exe.attrs_mut(ids[0]).program_counter = ProgramPoint(5);
        exe.attrs_mut(ids[1]).program_counter = ProgramPoint(9);
        exe.attrs_mut(ids[2]).program_counter = ProgramPoint(5);
        exe.attrs_mut(ids[3]).program_counter = ProgramPoint(9);
        let mut s = merging(&[5, 9]);
        add_all(&mut s, &exe, &ids);

        assert!(s.select(&mut exe, true).is_some());
        assert_eq!(exe.merges(), &[(ids[0], ids[2]), (ids[1], ids[3])]);
    }

    #[test]
    fn test_removal_of_held_state_is_absorbed() {
        let (mut exe, ids) = spawn_states(2);
        exe.attrs_mut(ids[0]).program_counter = ProgramPoint(9);
        let mut s = merging(&[9]);
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
        s.remove_state(&exe, ids[0]);
        assert_eq!(s.held().count(), 0);
        assert_eq!(sorted_tracked(&s), vec![ids[1]]);
    }
}

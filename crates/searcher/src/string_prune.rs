//! Prunes states that scan a symbolic string more slowly than the current one.
//!
//! A state's run length on an array is the number of distinct constant
//! indices it compared, provided they cover `0..n` with no gap. When the
//! current state has a run of at least two, every other state with a shorter
//! run on the same array is an ascending duplicate and gets parked.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexSet;
use tracing::{debug, info};

use klee_core::{Executor, StateAttributes, StateId, Update};

use crate::searcher::Searcher;

pub struct StringPruneSearcher {
    base: Box<dyn Searcher>,
    by_array: BTreeMap<String, IndexSet<StateId>>,
    arrays_of: HashMap<StateId, Vec<String>>,
    parked: IndexSet<StateId>,
}

/// `0` when the compared indices on `array` leave a gap.
pub fn run_length(attrs: &StateAttributes, array: &str) -> usize {
    let indices: BTreeSet<u64> = attrs
        .string_compares
        .iter()
        .filter(|c| c.array == array)
        .map(|c| c.index)
        .collect();
    let contiguous = indices.iter().enumerate().all(|(i, idx)| *idx == i as u64);
    if contiguous {
        indices.len()
    } else {
        0
    }
}

fn arrays_compared(attrs: &StateAttributes) -> Vec<String> {
    if attrs.is_compact_form {
        return Vec::new();
    }
    let names: BTreeSet<&str> = attrs.string_compares.iter().map(|c| c.array.as_str()).collect();
    names.into_iter().map(str::to_string).collect()
}

impl StringPruneSearcher {
    pub fn new(base: Box<dyn Searcher>) -> Self {
        Self {
            base,
            by_array: BTreeMap::new(),
            arrays_of: HashMap::new(),
            parked: IndexSet::new(),
        }
    }

    pub fn parked(&self) -> impl Iterator<Item = StateId> + '_ {
        self.parked.iter().copied()
    }

    fn track(&mut self, exe: &dyn Executor, id: StateId) {
        let arrays = arrays_compared(exe.attributes(id));
        for array in &arrays {
            self.by_array.entry(array.clone()).or_default().insert(id);
        }
        self.arrays_of.insert(id, arrays);
    }

    fn untrack(&mut self, id: StateId) -> bool {
        let Some(arrays) = self.arrays_of.remove(&id) else {
            return false;
        };
        for array in arrays {
            if let Some(states) = self.by_array.get_mut(&array) {
                states.shift_remove(&id);
                if states.is_empty() {
                    self.by_array.remove(&array);
                }
            }
        }
        true
    }

    fn prune_around(&mut self, exe: &dyn Executor, cur: StateId) {
        let attrs = exe.attributes(cur);
        let Some(arrays) = self.arrays_of.get(&cur) else {
            return;
        };
        let mut victims = Vec::new();
        for array in arrays {
            let run = run_length(attrs, array);
            if run < 2 {
                continue;
            }
            let Some(states) = self.by_array.get(array) else {
                continue;
            };
            for &other in states {
                if other == cur || self.parked.contains(&other) {
                    continue;
                }
                if run_length(exe.attributes(other), array) < run {
                    debug!(state = %other, by = %cur, array = %array, "pruning ascending state");
                    victims.push(other);
                }
            }
        }
        for victim in victims {
            if self.parked.insert(victim) {
                self.base.remove_state(exe, victim);
            }
        }
    }

    fn revive_one(&mut self, exe: &dyn Executor) {
        if let Some(id) = self.parked.shift_remove_index(0) {
            info!(state = %id, remaining = self.parked.len(), "reviving pruned state");
            self.base.add_state(exe, id);
        }
    }
}

impl Searcher for StringPruneSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if self.base.is_empty() {
            self.revive_one(&*exe);
        }
        self.base.select(exe, allow_compact)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        let mut departures = Vec::new();
        for id in update.departures() {
            self.untrack(id);
            if !self.parked.shift_remove(&id) {
                departures.push(id);
            }
        }
        let arrivals: Vec<_> = update.arrivals().collect();
        for id in &arrivals {
            self.track(exe, *id);
        }
        self.base
            .notify(exe, current, &Update::from_parts(arrivals, departures));

        if let Some(cur) = current.filter(|c| !update.is_departing(*c)) {
            if self.untrack(cur) {
                self.track(exe, cur);
                self.prune_around(exe, cur);
            }
        }

        if self.base.is_empty() {
            self.revive_one(exe);
        }
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.parked.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.parked.iter().copied());
    }

    fn describe(&self) -> String {
        format!("StringPruneSearcher -> {}", self.base.describe())
    }
}

#[cfg(test)]
mod tests {
    use klee_core::StringCompare;

    use super::*;
    use crate::primitive::FifoSearcher;
    use crate::test_support::{add_all, sorted_tracked, spawn_states};

    fn compares(pairs: &[(&str, u64)]) -> Vec<StringCompare> {
        pairs.iter().map(|(a, i)| StringCompare::new(*a, *i)).collect()
    }

    #[test]
    fn test_run_length() {
        let mut attrs = StateAttributes::default();
        attrs.string_compares = compares(&[("argv", 0), ("argv", 1), ("argv", 2), ("env", 1)]);
        assert_eq!(run_length(&attrs, "argv"), 3);
        assert_eq!(run_length(&attrs, "env"), 0);
        assert_eq!(run_length(&attrs, "stdin"), 0);

        attrs.string_compares = compares(&[("argv", 0), ("argv", 0), ("argv", 1)]);
        assert_eq!(run_length(&attrs, "argv"), 2);
    }

    #[test]
    fn test_shorter_runs_are_parked() {
        let (mut exe, ids) = spawn_states(4);
        exe.attrs_mut(ids[1]).string_compares = compares(&[("argv", 0)]);
        exe.attrs_mut(ids[2]).string_compares = compares(&[("argv", 0), ("argv", 1), ("argv", 2)]);
        exe.attrs_mut(ids[3]).string_compares = compares(&[("env", 0)]);
        let mut s = StringPruneSearcher::new(Box::new(FifoSearcher::new()));
        add_all(&mut s, &exe, &ids);

        let cur = s.select(&mut exe, true);
        assert_eq!(cur, Some(ids[0]));
        exe.attrs_mut(ids[0]).string_compares = compares(&[("argv", 0), ("argv", 1)]);
        s.notify(&exe, cur, &Update::new());

        assert_eq!(s.parked().collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(sorted_tracked(&s), ids);
    }

    #[test]
    fn test_single_compare_prunes_nothing() {
        let (mut exe, ids) = spawn_states(2);
        exe.attrs_mut(ids[1]).string_compares = compares(&[("argv", 1)]);
        let mut s = StringPruneSearcher::new(Box::new(FifoSearcher::new()));
        add_all(&mut s, &exe, &ids);
        let cur = s.select(&mut exe, true);
        exe.attrs_mut(ids[0]).string_compares = compares(&[("argv", 0)]);
        s.notify(&exe, cur, &Update::new());
        assert_eq!(s.parked().count(), 0);
    }

    #[test]
    fn test_parked_state_revived_when_base_drains() {
        let (mut exe, ids) = spawn_states(2);
        exe.attrs_mut(ids[1]).string_compares = compares(&[("argv", 0)]);
        let mut s = StringPruneSearcher::new(Box::new(FifoSearcher::new()));
        add_all(&mut s, &exe, &ids);
        let cur = s.select(&mut exe, true);
        exe.attrs_mut(ids[0]).string_compares = compares(&[("argv", 0), ("argv", 1)]);
        s.notify(&exe, cur, &Update::new());
        assert_eq!(s.parked().count(), 1);

        s.notify(&exe, cur, &Update::removing([ids[0]]));
        assert_eq!(s.parked().count(), 0);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
    }
}

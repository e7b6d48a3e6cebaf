use klee_core::{Executor, StateId, Update};

use crate::rng::SharedRng;
use crate::searcher::Searcher;

/// Uniform choice over tracked states.
///
/// Compact and non-compact states are kept apart so an eligible pick is a
/// single draw. Classification is refreshed for the running state on every
/// `notify`.
#[derive(Debug)]
pub struct RandomSearcher {
    all: Vec<StateId>,
    non_compact: Vec<StateId>,
    rng: SharedRng,
}

impl RandomSearcher {
    pub fn new(rng: SharedRng) -> Self {
        Self {
            all: Vec::new(),
            non_compact: Vec::new(),
            rng,
        }
    }
}

fn erase(v: &mut Vec<StateId>, id: StateId) -> bool {
    match v.iter().position(|s| *s == id) {
        Some(pos) => {
            v.swap_remove(pos);
            true
        }
        None => false,
    }
}

impl Searcher for RandomSearcher {
    fn select(&mut self, _exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let pool = if allow_compact || self.non_compact.is_empty() {
            &self.all
        } else {
            &self.non_compact
        };
        if pool.is_empty() {
            return None;
        }
        Some(pool[self.rng.index(pool.len())])
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            if erase(&mut self.all, id) {
                erase(&mut self.non_compact, id);
            }
        }
        for id in update.arrivals() {
            self.all.push(id);
            if !exe.is_compact(id) {
                self.non_compact.push(id);
            }
        }

        if let Some(cur) = current.filter(|c| !update.is_departing(*c)) {
            if !self.all.contains(&cur) {
                return;
            }
            let listed = self.non_compact.contains(&cur);
            match (exe.is_compact(cur), listed) {
                (true, true) => {
                    erase(&mut self.non_compact, cur);
                }
                (false, false) => self.non_compact.push(cur),
                _ => {}
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.rng.clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.all.iter().copied());
    }

    fn describe(&self) -> String {
        "RandomSearcher".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_all, spawn_states};

    #[test]
    fn test_never_picks_compact_when_alternative_exists() {
        let (mut exe, ids) = spawn_states(4);
        for id in &ids[..3] {
            exe.attrs_mut(*id).is_compact_form = true;
        }
        let mut s = RandomSearcher::new(SharedRng::seeded(7));
        add_all(&mut s, &exe, &ids);
        for _ in 0..32 {
            assert_eq!(s.select(&mut exe, false), Some(ids[3]));
        }
    }

    #[test]
    fn test_all_compact_still_selects() {
        let (mut exe, ids) = spawn_states(2);
        for id in &ids {
            exe.attrs_mut(*id).is_compact_form = true;
        }
        let mut s = RandomSearcher::new(SharedRng::seeded(7));
        add_all(&mut s, &exe, &ids);
        let picked = s.select(&mut exe, false);
        assert!(picked.is_some_and(|p| ids.contains(&p)));
    }

    #[test]
    fn test_current_reclassified_after_compaction() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = RandomSearcher::new(SharedRng::seeded(3));
        add_all(&mut s, &exe, &ids);
        exe.attrs_mut(ids[0]).is_compact_form = true;
        s.notify(&exe, Some(ids[0]), &Update::new());
        for _ in 0..16 {
            assert_eq!(s.select(&mut exe, false), Some(ids[1]));
        }
    }

    #[test]
    fn test_removal_purges_both_vectors() {
        let (mut exe, ids) = spawn_states(2);
        let mut s = RandomSearcher::new(SharedRng::seeded(3));
        add_all(&mut s, &exe, &ids);
        s.remove_state(&exe, ids[0]);
        for _ in 0..16 {
            assert_eq!(s.select(&mut exe, false), Some(ids[1]));
        }
        s.remove_state(&exe, ids[1]);
        assert!(s.is_empty());
        assert_eq!(s.select(&mut exe, true), None);
    }
}

use klee_core::{Executor, StateId, Update};

use crate::searcher::Searcher;

/// Visits tracked states in turn from a persistent cursor.
///
/// New states are inserted just behind the cursor, so they run last in the
/// current round.
#[derive(Debug, Default)]
pub struct RoundRobinSearcher {
    states: Vec<StateId>,
    cursor: usize,
}

impl RoundRobinSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove(&mut self, id: StateId) {
        let Some(pos) = self.states.iter().position(|s| *s == id) else {
            return;
        };
        self.states.remove(pos);
        if pos < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.states.len() {
            self.cursor = 0;
        }
    }
}

impl Searcher for RoundRobinSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let n = self.states.len();
        if n == 0 {
            return None;
        }
        let start = self.cursor % n;
        let chosen = (0..n)
            .map(|k| (start + k) % n)
            .find(|i| allow_compact || !exe.is_compact(self.states[*i]))
            .unwrap_or(start);
        self.cursor = (chosen + 1) % n;
        Some(self.states[chosen])
    }

    fn notify(&mut self, _exe: &dyn Executor, _current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.remove(id);
        }
        for id in update.arrivals() {
            let at = self.cursor.min(self.states.len());
            self.states.insert(at, id);
            self.cursor = at + 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new())
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.states.iter().copied());
    }

    fn describe(&self) -> String {
        "RoundRobinSearcher".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_all, spawn_states};

    #[test]
    fn test_visits_every_state_once_per_round() {
        let (mut exe, ids) = spawn_states(3);
        let mut s = RoundRobinSearcher::new();
        add_all(&mut s, &exe, &ids);
        let mut round: Vec<_> = (0..3).filter_map(|_| s.select(&mut exe, true)).collect();
        round.sort();
        assert_eq!(round, ids);
    }

    #[test]
    fn test_new_state_runs_last_in_round() {
        let (mut exe, ids) = spawn_states(4);
        let mut s = RoundRobinSearcher::new();
        add_all(&mut s, &exe, &ids[..3]);
        let first = s.select(&mut exe, true);
        s.add_state(&exe, ids[3]);
        let rest: Vec<_> = (0..4).filter_map(|_| s.select(&mut exe, true)).collect();
        assert_eq!(first, Some(ids[0]));
        assert_eq!(rest, vec![ids[1], ids[2], ids[0], ids[3]]);
    }

    #[test]
    fn test_removing_cursor_target_moves_to_successor() {
        let (mut exe, ids) = spawn_states(3);
        let mut s = RoundRobinSearcher { states: ids.clone(), cursor: 1 };
        s.remove_state(&exe, ids[1]);
        assert_eq!(s.select(&mut exe, true), Some(ids[2]));
        assert_eq!(s.select(&mut exe, true), Some(ids[0]));
    }

    #[test]
    fn test_skips_compact_once_around() {
        let (mut exe, ids) = spawn_states(3);
        exe.attrs_mut(ids[0]).is_compact_form = true;
        exe.attrs_mut(ids[1]).is_compact_form = true;
        let mut s = RoundRobinSearcher { states: ids.clone(), cursor: 0 };
        assert_eq!(s.select(&mut exe, false), Some(ids[2]));
        assert_eq!(s.select(&mut exe, false), Some(ids[2]));
        s.remove_state(&exe, ids[2]);
        assert!(s.select(&mut exe, false).is_some());
    }
}

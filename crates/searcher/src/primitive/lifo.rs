use klee_core::{Executor, StateId, Update};

use crate::searcher::{first_eligible, Searcher};

/// Depth-first: the newest eligible state runs next.
#[derive(Debug, Default)]
pub struct LifoSearcher {
    stack: Vec<StateId>,
}

impl LifoSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove(&mut self, id: StateId) -> bool {
        if self.stack.last() == Some(&id) {
            self.stack.pop();
            return true;
        }
        remove_by_scan(&mut self.stack, id)
    }
}

/// Slow path for removing a state that is not on top.
pub(crate) fn remove_by_scan(stack: &mut Vec<StateId>, id: StateId) -> bool {
    match stack.iter().rposition(|s| *s == id) {
        Some(pos) => {
            stack.remove(pos);
            true
        }
        None => false,
    }
}

impl Searcher for LifoSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let pos = first_eligible(&*exe, self.stack.iter().rev(), allow_compact)?;
        Some(self.stack[self.stack.len() - 1 - pos])
    }

    fn notify(&mut self, _exe: &dyn Executor, _current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.remove(id);
        }
        self.stack.extend(update.arrivals());
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new())
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.stack.iter().copied());
    }

    fn describe(&self) -> String {
        "LifoSearcher".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_all, spawn_states};

    #[test]
    fn test_newest_first() {
        let (mut exe, ids) = spawn_states(3);
        let mut s = LifoSearcher::new();
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, true), Some(ids[2]));
        assert_eq!(s.select(&mut exe, true), Some(ids[2]));
        s.remove_state(&exe, ids[2]);
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
    }

    #[test]
    fn test_compact_fallback() {
        let (mut exe, ids) = spawn_states(2);
        exe.attrs_mut(ids[1]).is_compact_form = true;
        let mut s = LifoSearcher::new();
        add_all(&mut s, &exe, &ids);
        assert_eq!(s.select(&mut exe, false), Some(ids[0]));
        assert_eq!(s.select(&mut exe, true), Some(ids[1]));
        s.remove_state(&exe, ids[0]);
        assert_eq!(s.select(&mut exe, false), Some(ids[1]));
    }

    #[test]
    fn test_remove_by_scan() {
        let mut v = vec![StateId(1), StateId(2), StateId(3)];
        assert!(remove_by_scan(&mut v, StateId(1)));
        assert!(!remove_by_scan(&mut v, StateId(1)));
        assert_eq!(v, vec![StateId(2), StateId(3)]);
    }
}

use std::collections::VecDeque;

use klee_core::{Executor, StateId, Update};

use crate::searcher::{first_eligible, Searcher};

/// Breadth-first: oldest eligible state runs next and goes to the back.
#[derive(Debug, Default)]
pub struct FifoSearcher {
    queue: VecDeque<StateId>,
}

impl FifoSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove(&mut self, id: StateId) -> bool {
        if self.queue.front() == Some(&id) {
            self.queue.pop_front();
            return true;
        }
        remove_by_scan(&mut self.queue, id)
    }
}

/// Slow path for removing a state that is not at the front.
pub(crate) fn remove_by_scan(queue: &mut VecDeque<StateId>, id: StateId) -> bool {
    match queue.iter().position(|s| *s == id) {
        Some(pos) => {
            queue.remove(pos);
            true
        }
        None => false,
    }
}

impl Searcher for FifoSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let pos = first_eligible(&*exe, self.queue.iter(), allow_compact)?;
        let id = self.queue.remove(pos)?;
        self.queue.push_back(id);
        Some(id)
    }

    fn notify(&mut self, _exe: &dyn Executor, _current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.remove(id);
        }
        self.queue.extend(update.arrivals());
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new())
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        out.extend(self.queue.iter().copied());
    }

    fn describe(&self) -> String {
        "FifoSearcher".into()
    }
}

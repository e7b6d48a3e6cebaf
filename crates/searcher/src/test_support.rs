use klee_core::{SimExecutor, StateAttributes, StateId, Update};

use crate::searcher::Searcher;

/// An executor holding `n` default states.
pub(crate) fn spawn_states(n: usize) -> (SimExecutor, Vec<StateId>) {
    let mut exe = SimExecutor::new();
    let ids = (0..n)
        .map(|_| {
            exe.spawn(StateAttributes {
                depth_weight: 1.0,
                ..Default::default()
            })
        })
        .collect();
    (exe, ids)
}

pub(crate) fn add_all(s: &mut dyn Searcher, exe: &SimExecutor, ids: &[StateId]) {
    s.notify(exe, None, &Update::adding(ids.iter().copied()));
}

/// Tracked states, sorted, with duplicates preserved.
pub(crate) fn sorted_tracked(s: &dyn Searcher) -> Vec<StateId> {
    let mut v = s.tracked();
    v.sort();
    v
}

use klee_core::{Executor, StateId, Update};

/// A state-selection strategy or a decorator around one.
///
/// The executor reports every step through [`notify`](Searcher::notify) and
/// then asks for the next state with [`select`](Searcher::select). Decorators
/// own their inner searcher exclusively and forward both calls.
pub trait Searcher {
    /// Pick the next state to run, or `None` if nothing is eligible.
    ///
    /// With `allow_compact == false`, compact states are skipped while a
    /// non-compact one is available, but are still returned as a last resort.
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId>;

    /// Absorb the membership changes of one executor step.
    ///
    /// `current` is the state that just ran; it may be departing in this same
    /// update. Departures of untracked states are no-ops.
    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update);

    fn is_empty(&self) -> bool;

    /// Same strategy and configuration, no states, fresh counters.
    fn spawn_empty_clone(&self) -> Box<dyn Searcher>;

    /// Append every state held at this layer and below.
    fn collect_tracked(&self, out: &mut Vec<StateId>);

    /// Human-readable description of the chain rooted here.
    fn describe(&self) -> String;

    fn add_state(&mut self, exe: &dyn Executor, id: StateId) {
        self.notify(exe, None, &Update::adding([id]));
    }

    fn remove_state(&mut self, exe: &dyn Executor, id: StateId) {
        self.notify(exe, None, &Update::removing([id]));
    }

    fn tracked(&self) -> Vec<StateId> {
        let mut out = Vec::new();
        self.collect_tracked(&mut out);
        out
    }
}

/// First position in `states` eligible under `allow_compact`, falling back
/// to `fallback` when every candidate is compact.
pub(crate) fn first_eligible<'a, I>(
    exe: &dyn Executor,
    states: I,
    allow_compact: bool,
) -> Option<usize>
where
    I: IntoIterator<Item = &'a StateId>,
{
    let mut first = None;
    for (pos, id) in states.into_iter().enumerate() {
        if allow_compact || !exe.is_compact(*id) {
            return Some(pos);
        }
        first.get_or_insert(pos);
    }
    first
}

use klee_core::{Executor, StateId};

/// Integer priority policy. Greater priority is scheduled sooner.
///
/// A state's priority may change between calls; callers must not assume
/// monotonicity. Counters a weigher keeps belong to that instance.
pub trait Weigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64;

    /// Called once each time a state is handed to the executor.
    fn on_selected(&mut self, _exe: &dyn Executor, _id: StateId) {}

    /// Same policy with empty counters.
    fn spawn_fresh(&self) -> Box<dyn Weigher>;

    fn describe(&self) -> String;
}

/// Sum of several weighers.
pub struct SumWeigher {
    parts: Vec<Box<dyn Weigher>>,
}

impl SumWeigher {
    pub fn new(parts: Vec<Box<dyn Weigher>>) -> Self {
        Self { parts }
    }
}

impl Weigher for SumWeigher {
    fn priority(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        self.parts
            .iter_mut()
            .fold(0i64, |acc, w| acc.saturating_add(w.priority(exe, id)))
    }

    fn on_selected(&mut self, exe: &dyn Executor, id: StateId) {
        for w in &mut self.parts {
            w.on_selected(exe, id);
        }
    }

    fn spawn_fresh(&self) -> Box<dyn Weigher> {
        Box::new(Self::new(self.parts.iter().map(|w| w.spawn_fresh()).collect()))
    }

    fn describe(&self) -> String {
        let names: Vec<_> = self.parts.iter().map(|w| w.describe()).collect();
        format!("Sum({})", names.join(" + "))
    }
}

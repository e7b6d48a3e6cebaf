use indexmap::IndexSet;

use crate::error::invariant_violation;
use crate::state::StateId;

/// Membership changes reported to the scheduler after one executor step.
///
/// `ignored` states are taken out of scheduling without being retired and
/// come back through `unignored`. Components treat `added ∪ unignored` as
/// arrivals and `removed ∪ ignored` as departures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub added: IndexSet<StateId>,
    pub removed: IndexSet<StateId>,
    pub ignored: IndexSet<StateId>,
    pub unignored: IndexSet<StateId>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalized update from arrivals and departures.
    pub fn from_parts(
        arrivals: impl IntoIterator<Item = StateId>,
        departures: impl IntoIterator<Item = StateId>,
    ) -> Self {
        Self {
            added: arrivals.into_iter().collect(),
            removed: departures.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn adding(ids: impl IntoIterator<Item = StateId>) -> Self {
        Self::from_parts(ids, [])
    }

    pub fn removing(ids: impl IntoIterator<Item = StateId>) -> Self {
        Self::from_parts([], ids)
    }

    pub fn with_added(mut self, id: StateId) -> Self {
        self.added.insert(id);
        self
    }

    pub fn with_removed(mut self, id: StateId) -> Self {
        self.removed.insert(id);
        self
    }

    pub fn with_ignored(mut self, id: StateId) -> Self {
        self.ignored.insert(id);
        self
    }

    pub fn with_unignored(mut self, id: StateId) -> Self {
        self.unignored.insert(id);
        self
    }

    /// States entering scheduling, in report order.
    pub fn arrivals(&self) -> impl Iterator<Item = StateId> + '_ {
        self.added.iter().chain(self.unignored.iter()).copied()
    }

    /// States leaving scheduling, in report order.
    pub fn departures(&self) -> impl Iterator<Item = StateId> + '_ {
        self.removed.iter().chain(self.ignored.iter()).copied()
    }

    pub fn is_departing(&self, id: StateId) -> bool {
        self.removed.contains(&id) || self.ignored.contains(&id)
    }

    pub fn is_arriving(&self, id: StateId) -> bool {
        self.added.contains(&id) || self.unignored.contains(&id)
    }

    pub fn has_departures(&self) -> bool {
        !self.removed.is_empty() || !self.ignored.is_empty()
    }

    pub fn has_arrivals(&self) -> bool {
        !self.added.is_empty() || !self.unignored.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_arrivals() && !self.has_departures()
    }

    /// Abort if a state both arrives and departs in the same update.
    pub fn check_disjoint(&self) {
        if let Some(id) = self.arrivals().find(|id| self.is_departing(*id)) {
            invariant_violation("update", Some(id), "state both added and removed in one update");
        }
    }
}

use std::collections::{BTreeMap, HashMap, VecDeque};

use klee_core::{BranchId, Executor, StateId, Update};

use crate::searcher::Searcher;

/// Clusters states by the branch they last took and rotates over clusters.
///
/// Within a phase the front state runs and is requeued at the back, so the
/// running state is always the tail of its phase.
#[derive(Debug, Default)]
pub struct PhasedSearcher {
    phases: BTreeMap<BranchId, VecDeque<StateId>>,
    backmap: HashMap<StateId, BranchId>,
    cursor: Option<BranchId>,
}

impl PhasedSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phases in visiting order, starting after the cursor.
    fn rotation(&self) -> Vec<BranchId> {
        let keys: Vec<_> = self.phases.keys().copied().collect();
        let split = match self.cursor {
            Some(c) => keys.partition_point(|k| *k <= c),
            None => 0,
        };
        keys[split..].iter().chain(keys[..split].iter()).copied().collect()
    }

    fn detach(&mut self, id: StateId, branch: BranchId) {
        let Some(phase) = self.phases.get_mut(&branch) else {
            return;
        };
        if phase.back() == Some(&id) {
            phase.pop_back();
        } else if let Some(pos) = phase.iter().position(|s| *s == id) {
            phase.remove(pos);
        }
        if phase.is_empty() {
            self.phases.remove(&branch);
        }
    }
}

impl Searcher for PhasedSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let order = self.rotation();
        let mut pick = None;
        for branch in &order {
            let phase = &self.phases[branch];
            if let Some(pos) = phase.iter().position(|s| allow_compact || !exe.is_compact(*s)) {
                pick = Some((*branch, pos));
                break;
            }
        }
        let (branch, pos) = pick.or_else(|| order.first().map(|b| (*b, 0)))?;

        let phase = self.phases.get_mut(&branch)?;
        let id = phase.remove(pos)?;
        phase.push_back(id);
        self.cursor = Some(branch);
        Some(id)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for id in update.arrivals() {
            let branch = exe.attributes(id).last_branch_id;
            self.phases.entry(branch).or_default().push_front(id);
            self.backmap.insert(id, branch);
        }

        for id in update.departures() {
            if let Some(branch) = self.backmap.remove(&id) {
                self.detach(id, branch);
            }
        }

        let Some(cur) = current else { return };
        let Some(&listed) = self.backmap.get(&cur) else {
            return;
        };
        let branch = exe.attributes(cur).last_branch_id;
        if branch == listed {
            return;
        }
        self.detach(cur, listed);
        self.phases.entry(branch).or_default().push_back(cur);
        self.backmap.insert(cur, branch);
    }

    fn is_empty(&self) -> bool {
        self.backmap.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new())
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        for phase in self.phases.values() {
            out.extend(phase.iter().copied());
        }
    }

    fn describe(&self) -> String {
        "PhasedSearcher".into()
    }
}

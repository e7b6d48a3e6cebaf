//! Cross-checks that a state's address space is untouched while it is
//! descheduled.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::{debug, error};

use klee_core::{invariant_violation, Executor, StateId, Update};

use crate::searcher::Searcher;

const COMPONENT: &str = "xchk";

struct Snapshot {
    digest: [u8; 32],
    dump: String,
}

fn snapshot(exe: &dyn Executor, id: StateId) -> Snapshot {
    let dump = exe.address_space_dump(id);
    Snapshot {
        digest: Sha256::digest(dump.as_bytes()).into(),
        dump,
    }
}

/// Hashes every state when it is descheduled and verifies the hash when it
/// is scheduled again. Any difference aborts with both dumps.
pub struct XChkSearcher {
    base: Box<dyn Searcher>,
    snapshots: HashMap<StateId, Snapshot>,
    last: Option<StateId>,
}

impl XChkSearcher {
    pub fn new(base: Box<dyn Searcher>) -> Self {
        Self {
            base,
            snapshots: HashMap::new(),
            last: None,
        }
    }

    fn verify(&self, exe: &dyn Executor, id: StateId) {
        let Some(then) = self.snapshots.get(&id) else {
            invariant_violation(COMPONENT, Some(id), "never seen this state before");
        };
        let now = snapshot(exe, id);
        if now.digest != then.digest {
            error!(
                state = %id,
                last = ?self.last,
                "address space changed while descheduled"
            );
            invariant_violation(
                COMPONENT,
                Some(id),
                format!(
                    "address space changed while descheduled\n--- then ---\n{}\n--- now ---\n{}",
                    then.dump, now.dump
                ),
            );
        }
        debug!(state = %id, "xchk ok");
    }
}

impl Searcher for XChkSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let id = self.base.select(&mut *exe, allow_compact)?;
        if self.last == Some(id) {
            return Some(id);
        }
        self.verify(&*exe, id);
        self.last = Some(id);
        Some(id)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            self.snapshots.remove(&id);
            if self.last == Some(id) {
                self.last = None;
            }
        }
        for id in update.arrivals() {
            self.snapshots.insert(id, snapshot(exe, id));
        }
        if let Some(cur) = current.filter(|c| !update.is_departing(*c)) {
            if exe.state(cur).is_some() {
                self.snapshots.insert(cur, snapshot(exe, cur));
            }
        }
        self.base.notify(exe, current, update);
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone()))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
    }

    fn describe(&self) -> String {
        format!("XChkSearcher -> {}", self.base.describe())
    }
}

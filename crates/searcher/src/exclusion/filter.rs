//! Keeps states whose call stack matches a list of function names out of the
//! base searcher.
//!
//! A frame matches when its pretty name, with any `+offset` suffix dropped,
//! contains one of the patterns. Verdicts are cached per function. Excluded
//! states wait in a side set; whenever the base runs dry the oldest one is
//! let back in.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use klee_core::{Executor, FunctionId, StateId, Update};

use crate::error::SearchError;
use crate::searcher::Searcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Exclude states running a listed function.
    #[default]
    Blacklist,
    /// Exclude states running no listed function.
    Whitelist,
}

pub struct FilterSearcher {
    base: Box<dyn Searcher>,
    patterns: Vec<String>,
    mode: FilterMode,
    matching: HashSet<FunctionId>,
    clean: HashSet<FunctionId>,
    known: HashSet<StateId>,
    held: IndexSet<StateId>,
}

/// `foo+0x10` → `foo`.
pub(crate) fn strip_offset(name: &str) -> &str {
    name.find('+').map_or(name, |i| &name[..i])
}

/// Whitespace-separated function names.
pub fn read_filter_file(path: impl AsRef<Path>) -> Result<Vec<String>, SearchError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SearchError::FilterFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok(content.split_whitespace().map(str::to_string).collect())
}

impl FilterSearcher {
    pub fn new(base: Box<dyn Searcher>, patterns: Vec<String>, mode: FilterMode) -> Self {
        Self {
            base,
            patterns,
            mode,
            matching: HashSet::new(),
            clean: HashSet::new(),
            known: HashSet::new(),
            held: IndexSet::new(),
        }
    }

    /// States currently kept out of the base.
    pub fn held(&self) -> impl Iterator<Item = StateId> + '_ {
        self.held.iter().copied()
    }

    fn function_matches(&mut self, exe: &dyn Executor, function: FunctionId) -> bool {
        if self.matching.contains(&function) {
            return true;
        }
        if self.clean.contains(&function) {
            return false;
        }
        let name = exe.pretty_name(function);
        let stripped = strip_offset(&name);
        let hit = self.patterns.iter().any(|p| stripped.contains(p.as_str()));
        if hit {
            self.matching.insert(function);
        } else {
            self.clean.insert(function);
        }
        hit
    }

    fn is_excluded(&mut self, exe: &dyn Executor, id: StateId) -> bool {
        let stack = &exe.attributes(id).call_stack;
        let mut any = false;
        for f in stack {
            if self.function_matches(exe, *f) {
                any = true;
                break;
            }
        }
        match self.mode {
            FilterMode::Blacklist => any,
            FilterMode::Whitelist => !any,
        }
    }

    fn hold(&mut self, exe: &dyn Executor, id: StateId) {
        self.base.remove_state(exe, id);
        self.held.insert(id);
        debug!(state = %id, "filtered out");
    }

    fn recover_one(&mut self, exe: &dyn Executor) -> bool {
        let Some(id) = self.held.shift_remove_index(0) else {
            return false;
        };
        info!(state = %id, remaining = self.held.len(), "recovering filtered state");
        self.base.add_state(exe, id);
        true
    }
}

impl Searcher for FilterSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let mut recovered = false;
        if self.base.is_empty() {
            recovered = self.recover_one(&*exe);
        }
        loop {
            let id = self.base.select(&mut *exe, allow_compact)?;
            if recovered || !self.is_excluded(&*exe, id) {
                return Some(id);
            }
            self.hold(&*exe, id);
            if self.base.is_empty() {
                recovered = self.recover_one(&*exe);
            }
        }
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        let mut departures = Vec::new();
        for id in update.departures() {
            self.known.remove(&id);
            if !self.held.shift_remove(&id) {
                departures.push(id);
            }
        }

        let mut arrivals = Vec::new();
        for id in update.arrivals() {
            self.known.insert(id);
            if self.is_excluded(exe, id) {
                self.held.insert(id);
            } else {
                arrivals.push(id);
            }
        }

        self.base
            .notify(exe, current, &Update::from_parts(arrivals, departures));

        if let Some(cur) = current.filter(|c| self.known.contains(c) && !update.is_departing(*c)) {
            let excluded = self.is_excluded(exe, cur);
            if self.held.contains(&cur) {
                if !excluded {
                    self.held.shift_remove(&cur);
                    self.base.add_state(exe, cur);
                }
            } else if excluded {
                self.hold(exe, cur);
            }
        }

        if self.base.is_empty() {
            self.recover_one(exe);
        }
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.held.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.base.spawn_empty_clone(),
            self.patterns.clone(),
            self.mode,
        ))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.held.iter().copied());
    }

    fn describe(&self) -> String {
        format!(
            "FilterSearcher({:?}, {} patterns) -> {}",
            self.mode,
            self.patterns.len(),
            self.base.describe()
        )
    }
}

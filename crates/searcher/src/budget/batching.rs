//! Keeps running one state until a time, instruction, or query budget
//! measured since its selection runs out.
//!
//! States forked while pinned are buffered and only handed to the base on
//! reselection, or right away when a departure forces the base to catch up.

use std::time::Duration;

use indexmap::IndexSet;
use tracing::{debug, info};

use klee_core::{Executor, StateId, Update};

use crate::searcher::Searcher;

/// Batching limits. A zero disables that budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budgets {
    pub time: Duration,
    pub instructions: u64,
    pub queries: u64,
    /// Grow the time budget while new code keeps turning up, shrink it when not.
    pub adaptive: bool,
}

pub struct BatchingSearcher {
    base: Box<dyn Searcher>,
    budgets: Budgets,
    time_budget: Duration,
    pinned: Option<StateId>,
    reselect: bool,
    timed_out: bool,
    started_at: Duration,
    started_instructions: u64,
    started_queries: u64,
    total_at_adjust: u64,
    pending: IndexSet<StateId>,
}

impl BatchingSearcher {
    pub fn new(base: Box<dyn Searcher>, budgets: Budgets) -> Self {
        Self {
            base,
            budgets,
            time_budget: budgets.time,
            pinned: None,
            reselect: false,
            timed_out: false,
            started_at: Duration::ZERO,
            started_instructions: 0,
            started_queries: 0,
            total_at_adjust: 0,
            pending: IndexSet::new(),
        }
    }

    /// Current, possibly adapted, time budget.
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    pub fn pinned(&self) -> Option<StateId> {
        self.pinned
    }

    fn flush(&mut self, exe: &dyn Executor) {
        if self.pending.is_empty() {
            return;
        }
        let arrivals: Vec<_> = self.pending.drain(..).collect();
        self.base.notify(exe, None, &Update::adding(arrivals));
    }

    fn adjust_time_budget(&mut self, exe: &dyn Executor) {
        let total = exe.stats().total_instructions();
        let before = self.time_budget;
        let scaled = if total > self.total_at_adjust {
            before.mul_f64(1.5)
        } else {
            before.mul_f64(0.7)
        };
        let floor = self.budgets.time;
        self.time_budget = scaled.clamp(floor, floor * 5);
        self.total_at_adjust = total;
        info!(from = ?before, to = ?self.time_budget, "batching time budget adjusted");
    }

    fn budget_exhausted(&mut self, exe: &dyn Executor) -> bool {
        let stats = exe.stats();
        self.timed_out =
            !self.time_budget.is_zero() && exe.now().saturating_sub(self.started_at) > self.time_budget;
        let out_of_instructions = self.budgets.instructions > 0
            && stats.instructions.saturating_sub(self.started_instructions) > self.budgets.instructions;
        let out_of_queries = self.budgets.queries > 0
            && stats.queries_top_level.saturating_sub(self.started_queries) > self.budgets.queries;

        if self.timed_out {
            debug!("batching time budget exceeded");
        }
        self.timed_out || out_of_instructions || out_of_queries
    }
}

impl Searcher for BatchingSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if let Some(pinned) = self.pinned {
            if !self.reselect {
                return Some(pinned);
            }
        }

        // adapt once per expired pin, however many notifies saw it expire
        if std::mem::take(&mut self.timed_out) && self.budgets.adaptive {
            self.adjust_time_budget(&*exe);
        }

        self.flush(&*exe);
        self.pinned = self.base.select(&mut *exe, allow_compact);
        let pinned = self.pinned?;

        let stats = exe.stats();
        self.started_at = exe.now();
        self.started_instructions = stats.instructions;
        self.started_queries = stats.queries_top_level;
        self.reselect = false;
        Some(pinned)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        if self.pinned.is_some() && !self.reselect {
            self.reselect = self.budget_exhausted(exe);
        }

        if !self.reselect && !update.has_departures() {
            self.pending.extend(update.arrivals());
            return;
        }

        let arrivals: Vec<_> = self
            .pending
            .drain(..)
            .chain(update.arrivals())
            .filter(|id| !update.is_departing(*id))
            .collect();
        let forwarded = Update::from_parts(arrivals, update.departures());
        self.base.notify(exe, current, &forwarded);

        if self.reselect || self.pinned.is_some_and(|p| update.is_departing(p)) {
            self.pinned = None;
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.base.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(self.base.spawn_empty_clone(), self.budgets))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.base.collect_tracked(out);
        out.extend(self.pending.iter().copied());
    }

    fn describe(&self) -> String {
        format!(
            "BatchingSearcher(time={:?}, instructions={}, queries={}, adaptive={}) -> {}",
            self.budgets.time,
            self.budgets.instructions,
            self.budgets.queries,
            self.budgets.adaptive,
            self.base.describe()
        )
    }
}

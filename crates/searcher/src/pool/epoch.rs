//! Epochs: rotating sub-clusters drawn from a global pool.
//!
//! The pool sees every update. States enter an epoch only when the pool
//! hands them out, and each epoch schedules its members with its own copy of
//! the base strategy. Most selections come from a random epoch; every
//! `period` stalled selections go back to the pool instead.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::{debug, info, warn};

use klee_core::{Executor, StateId, Update};

use crate::rng::SharedRng;
use crate::searcher::Searcher;

pub const DEFAULT_WATERMARK: usize = 10;

struct Epoch {
    searcher: Box<dyn Searcher>,
    members: IndexSet<StateId>,
}

impl Epoch {
    fn new(searcher: Box<dyn Searcher>) -> Self {
        Self {
            searcher,
            members: IndexSet::new(),
        }
    }
}

pub struct EpochSearcher {
    template: Box<dyn Searcher>,
    pool: Box<dyn Searcher>,
    epochs: Vec<Epoch>,
    assignment: HashMap<StateId, usize>,
    rng: SharedRng,
    watermark: usize,
    countdown: u32,
    period: u32,
    /// Instruction total at the last growth; read from the executor on first use.
    last_total: Option<u64>,
    backoff: u32,
}

impl EpochSearcher {
    /// `base` is only used as a template for epochs; `pool` receives every state.
    pub fn new(
        base: Box<dyn Searcher>,
        pool: Box<dyn Searcher>,
        rng: SharedRng,
        watermark: usize,
    ) -> Self {
        let first = Epoch::new(base.spawn_empty_clone());
        Self {
            template: base,
            pool,
            epochs: vec![first],
            assignment: HashMap::new(),
            rng,
            watermark,
            countdown: 3,
            period: 3,
            last_total: None,
            backoff: 0,
        }
    }

    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    /// Index of the epoch `id` was assigned to, if any.
    pub fn epoch_of(&self, id: StateId) -> Option<usize> {
        self.assignment.get(&id).copied()
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    fn assigned(&self) -> usize {
        self.epochs.iter().map(|e| e.members.len()).sum()
    }

    fn select_pool(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let id = self.pool.select(&mut *exe, allow_compact)?;
        if self.assignment.contains_key(&id) {
            return Some(id);
        }
        let newest = self.epochs.len() - 1;
        let epoch = &mut self.epochs[newest];
        epoch.members.insert(id);
        epoch.searcher.add_state(&*exe, id);
        self.assignment.insert(id, newest);
        debug!(state = %id, epoch = newest, "state joined epoch");
        Some(id)
    }

    fn select_epoch(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let k = self.rng.index(self.epochs.len());
        if self.epochs[k].searcher.is_empty() {
            warn!(epoch = k, "empty epoch, pulling from pool");
            return self.select_pool(exe, allow_compact);
        }
        match self.epochs[k].searcher.select(&mut *exe, allow_compact) {
            Some(id) => Some(id),
            None => self.select_pool(exe, allow_compact),
        }
    }

    fn maybe_concretize(&mut self, exe: &mut dyn Executor, id: StateId) {
        let Some(&e) = self.assignment.get(&id) else {
            return;
        };
        if self.epochs[e].members.len() <= self.watermark {
            return;
        }
        if self.backoff == 0 {
            info!(state = %id, epoch = e, "concretizing crowded epoch member");
            exe.concretize_state(id);
            self.countdown += 1;
        }
        self.backoff = (self.backoff + 1) % self.period.max(1);
    }
}

impl Searcher for EpochSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let total = exe.stats().total_instructions();
        let baseline = *self.last_total.get_or_insert(total);
        if total > baseline {
            self.countdown = self.period;
            self.last_total = Some(total);
            let newest_has_members = self
                .epochs
                .last()
                .is_some_and(|e| !e.members.is_empty());
            if newest_has_members {
                self.epochs.push(Epoch::new(self.template.spawn_empty_clone()));
                info!(epochs = self.epochs.len(), "opened new epoch");
            }
        } else {
            self.countdown = self.countdown.saturating_sub(1);
        }

        if self.countdown == 0 {
            self.countdown = self.period;
            debug!("selecting from global pool");
            return self.select_pool(exe, allow_compact);
        }

        let next = self.select_epoch(exe, allow_compact)?;
        self.maybe_concretize(exe, next);
        Some(next)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        self.pool.notify(exe, current, update);

        let mut leaving: Vec<Vec<StateId>> = vec![Vec::new(); self.epochs.len()];
        for id in update.departures() {
            if let Some(e) = self.assignment.remove(&id) {
                self.epochs[e].members.shift_remove(&id);
                leaving[e].push(id);
            }
        }

        for (epoch, gone) in self.epochs.iter_mut().zip(leaving) {
            let cur = current.filter(|c| epoch.members.contains(c));
            if gone.is_empty() && cur.is_none() {
                continue;
            }
            epoch.searcher.notify(exe, cur, &Update::removing(gone));
        }

        self.period = (self.assigned() / 2) as u32 + 1;
    }

    fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.template.spawn_empty_clone(),
            self.pool.spawn_empty_clone(),
            self.rng.clone(),
            self.watermark,
        ))
    }

    /// Epoch members are also in the pool; the pool speaks for both.
    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        self.pool.collect_tracked(out);
    }

    fn describe(&self) -> String {
        format!(
            "EpochSearcher(watermark={}) pool: {} epochs: {}",
            self.watermark,
            self.pool.describe(),
            self.template.describe()
        )
    }
}

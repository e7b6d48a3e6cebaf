//! Bucketed priority searcher with lazy re-bucketing and aging.
//!
//! Every state has one record holding the bucket it sits in, the raw weigher
//! value last observed, and a demotion count. The effective priority is
//! `raw - demotion`; each selection bumps the demotion by one so that equal
//! priorities take turns, and any change in the raw value clears it.
//!
//! Buckets are child searchers spawned from a template and keyed by
//! effective priority. Priorities can drift while a state sits in a bucket;
//! `select` corrects at most `kick_rate` such mismatches per call and then
//! accepts the stale one.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use klee_core::{invariant_violation, Executor, StateId, Update};

use crate::priority::weigher::Weigher;
use crate::searcher::Searcher;

const COMPONENT: &str = "priority";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StateEntry {
    bucket: i64,
    raw: i64,
    demotion: i64,
}

impl StateEntry {
    fn effective(&self) -> i64 {
        self.raw.saturating_sub(self.demotion)
    }
}

pub struct PrioritySearcher {
    weigher: Box<dyn Weigher>,
    template: Box<dyn Searcher>,
    buckets: BTreeMap<i64, Box<dyn Searcher>>,
    entries: HashMap<StateId, StateEntry>,
    kick_rate: u32,
}

impl PrioritySearcher {
    /// `template` must be empty; each bucket is a fresh clone of it.
    pub fn new(weigher: Box<dyn Weigher>, template: Box<dyn Searcher>, kick_rate: u32) -> Self {
        Self {
            weigher,
            template,
            buckets: BTreeMap::new(),
            entries: HashMap::new(),
            kick_rate,
        }
    }

    /// Re-evaluate a tracked state and return its effective priority.
    pub fn effective_priority(&mut self, exe: &dyn Executor, id: StateId) -> Option<i64> {
        if !self.entries.contains_key(&id) {
            return None;
        }
        Some(self.evaluate(exe, id))
    }

    /// Priority of the bucket currently holding `id`.
    pub fn bucket_of(&self, id: StateId) -> Option<i64> {
        self.entries.get(&id).map(|e| e.bucket)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn entry_mut(&mut self, id: StateId) -> &mut StateEntry {
        match self.entries.get_mut(&id) {
            Some(e) => e,
            None => invariant_violation(COMPONENT, Some(id), "state has no priority record"),
        }
    }

    fn evaluate(&mut self, exe: &dyn Executor, id: StateId) -> i64 {
        let raw = self.weigher.priority(exe, id);
        let entry = self.entry_mut(id);
        if raw != entry.raw {
            entry.raw = raw;
            entry.demotion = 0;
        }
        entry.effective()
    }

    fn place(&mut self, exe: &dyn Executor, id: StateId, bucket: i64) {
        let template = &self.template;
        self.buckets
            .entry(bucket)
            .or_insert_with(|| template.spawn_empty_clone())
            .add_state(exe, id);
    }

    fn unplace(&mut self, exe: &dyn Executor, id: StateId, bucket: i64) {
        let Some(child) = self.buckets.get_mut(&bucket) else {
            invariant_violation(COMPONENT, Some(id), format!("recorded bucket {bucket} does not exist"));
        };
        child.remove_state(exe, id);
        if child.is_empty() {
            self.buckets.remove(&bucket);
        }
    }

    fn rebucket(&mut self, exe: &dyn Executor, id: StateId, to: i64) {
        let from = self.entry_mut(id).bucket;
        if from == to {
            return;
        }
        self.unplace(exe, id, from);
        self.place(exe, id, to);
        self.entry_mut(id).bucket = to;
    }

    /// Drop empty buckets from the top.
    fn collect_empty_top(&mut self) {
        while let Some(entry) = self.buckets.last_entry() {
            if !entry.get().is_empty() {
                break;
            }
            entry.remove();
        }
    }

    /// Highest bucket offering an eligible state, else the highest non-empty
    /// one. Only the chosen bucket is asked to select.
    fn pick(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<(i64, StateId)> {
        let mut fallback = None;
        let mut chosen = None;
        let mut members = Vec::new();
        for (pr, child) in self.buckets.iter().rev() {
            if child.is_empty() {
                continue;
            }
            fallback.get_or_insert(*pr);
            if allow_compact {
                chosen = Some(*pr);
                break;
            }
            members.clear();
            child.collect_tracked(&mut members);
            if members.iter().any(|id| !exe.is_compact(*id)) {
                chosen = Some(*pr);
                break;
            }
        }
        let bucket = chosen.or(fallback)?;
        let id = self.buckets.get_mut(&bucket)?.select(&mut *exe, allow_compact)?;
        Some((bucket, id))
    }
}

impl Searcher for PrioritySearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        let mut kicks = 0;
        loop {
            self.collect_empty_top();
            let (bucket, id) = self.pick(&mut *exe, allow_compact)?;

            let recorded = self.entry_mut(id).bucket;
            if recorded != bucket {
                invariant_violation(
                    COMPONENT,
                    Some(id),
                    format!("bucket {bucket} returned a state recorded in bucket {recorded}"),
                );
            }

            let pr = self.evaluate(&*exe, id);
            if pr != bucket && kicks < self.kick_rate {
                kicks += 1;
                debug!(state = %id, from = bucket, to = pr, "priority changed; re-bucketing");
                self.rebucket(&*exe, id, pr);
                continue;
            }

            self.weigher.on_selected(&*exe, id);
            let entry = self.entry_mut(id);
            entry.demotion = entry.demotion.saturating_add(1);
            let aged = entry.effective();
            self.rebucket(&*exe, id, aged);
            return Some(id);
        }
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for id in update.departures() {
            if let Some(entry) = self.entries.remove(&id) {
                self.unplace(exe, id, entry.bucket);
            }
        }

        for id in update.arrivals() {
            if self.entries.contains_key(&id) {
                invariant_violation(COMPONENT, Some(id), "state added twice");
            }
            let raw = self.weigher.priority(exe, id);
            self.entries.insert(
                id,
                StateEntry {
                    bucket: raw,
                    raw,
                    demotion: 0,
                },
            );
            self.place(exe, id, raw);
        }

        if let Some(cur) = current.filter(|c| !update.is_departing(*c) && !update.is_arriving(*c)) {
            if self.entries.contains_key(&cur) {
                let pr = self.evaluate(exe, cur);
                self.rebucket(exe, cur, pr);
            }
        }

        self.collect_empty_top();
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.weigher.spawn_fresh(),
            self.template.spawn_empty_clone(),
            self.kick_rate,
        ))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        for child in self.buckets.values() {
            child.collect_tracked(out);
        }
    }

    fn describe(&self) -> String {
        format!(
            "PrioritySearcher(weigher={}, kick_rate={}, bucket={})",
            self.weigher.describe(),
            self.kick_rate,
            self.template.describe()
        )
    }
}

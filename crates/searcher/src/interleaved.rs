//! Several strategies over the same states, taking turns.
//!
//! Every inner searcher sees every update, so each one tracks the full set.

use tracing::debug;

use klee_core::{Executor, StateId, Update};

use crate::rng::SharedRng;
use crate::searcher::Searcher;

/// Rotates through its searchers, one selection each.
pub struct InterleavedSearcher {
    searchers: Vec<Box<dyn Searcher>>,
    index: usize,
}

impl InterleavedSearcher {
    /// `searchers` must be non-empty.
    pub fn new(searchers: Vec<Box<dyn Searcher>>) -> Self {
        Self { searchers, index: 0 }
    }
}

/// Ask `searchers` in order starting at `start`; first answer wins.
fn select_from(
    searchers: &mut [Box<dyn Searcher>],
    start: usize,
    exe: &mut dyn Executor,
    allow_compact: bool,
) -> Option<(usize, StateId)> {
    let n = searchers.len();
    (0..n).map(|k| (start + k) % n).find_map(|i| {
        searchers[i]
            .select(&mut *exe, allow_compact)
            .map(|id| (i, id))
    })
}

impl Searcher for InterleavedSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if self.searchers.is_empty() {
            return None;
        }
        let start = self.index;
        self.index = (self.index + 1) % self.searchers.len();
        select_from(&mut self.searchers, start, exe, allow_compact).map(|(_, id)| id)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for s in &mut self.searchers {
            s.notify(exe, current, update);
        }
    }

    fn is_empty(&self) -> bool {
        self.searchers.first().map_or(true, |s| s.is_empty())
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.searchers.iter().map(|s| s.spawn_empty_clone()).collect(),
        ))
    }

    /// Inner searchers mirror each other; the first one speaks for all.
    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        if let Some(s) = self.searchers.first() {
            s.collect_tracked(out);
        }
    }

    fn describe(&self) -> String {
        let inner: Vec<_> = self.searchers.iter().map(|s| s.describe()).collect();
        format!("InterleavedSearcher[{}]", inner.join(", "))
    }
}

#[derive(Debug, Clone, Copy)]
struct Tickets {
    held: i64,
    base: i64,
}

/// Lottery over searchers: the one whose picks find new code earns tickets,
/// the others lose them while coverage stalls.
pub struct TicketInterleavedSearcher {
    searchers: Vec<Box<dyn Searcher>>,
    tickets: Vec<Tickets>,
    ticket_total: i64,
    current: usize,
    last_found: u64,
    last_instructions: u64,
    selects_since_new: i64,
    rng: SharedRng,
}

impl TicketInterleavedSearcher {
    /// `searchers` must be non-empty. Every searcher starts with one ticket.
    pub fn new(searchers: Vec<Box<dyn Searcher>>, rng: SharedRng) -> Self {
        let n = searchers.len();
        Self {
            searchers,
            tickets: vec![Tickets { held: 1, base: 1 }; n],
            ticket_total: n as i64,
            current: 0,
            last_found: 0,
            last_instructions: 0,
            selects_since_new: 0,
            rng,
        }
    }

    pub fn tickets(&self) -> Vec<i64> {
        self.tickets.iter().map(|t| t.held).collect()
    }

    /// Reward or penalize whoever made the previous pick.
    fn settle(&mut self, exe: &dyn Executor) {
        let stats = exe.stats();
        let found = stats.total_instructions();
        let n = self.searchers.len() as f64;
        let slot = &mut self.tickets[self.current];

        if found > self.last_found {
            let budget = slot.held;
            let payout = ((1.0 - budget as f64 / self.ticket_total as f64) * n).ceil() as i64;
            slot.held += payout;
            self.ticket_total += payout;
            self.last_found = found;
            self.selects_since_new = 0;
            debug!(searcher = self.current, payout, "ticket payout");
        } else if stats.instructions != self.last_instructions {
            self.selects_since_new += 1;
            let budget = slot.held;
            let mut penalty = (self.selects_since_new as f64 * (budget as f64 / self.ticket_total as f64))
                .ceil() as i64
                + 1;
            if budget - penalty < slot.base {
                penalty = budget - slot.base;
            }
            slot.held -= penalty;
            self.ticket_total -= penalty;
        }
        self.last_instructions = stats.instructions;
    }

    fn draw(&self) -> usize {
        let mut remaining = (self.ticket_total as f64 * self.rng.unit()) as i64;
        for (k, t) in self.tickets.iter().enumerate() {
            remaining -= t.held;
            if remaining < 0 {
                return k;
            }
        }
        self.tickets.len() - 1
    }
}

impl Searcher for TicketInterleavedSearcher {
    fn select(&mut self, exe: &mut dyn Executor, allow_compact: bool) -> Option<StateId> {
        if self.searchers.is_empty() {
            return None;
        }
        self.settle(&*exe);
        let start = self.draw();
        let (chosen, id) = select_from(&mut self.searchers, start, exe, allow_compact)?;
        self.current = chosen;
        Some(id)
    }

    fn notify(&mut self, exe: &dyn Executor, current: Option<StateId>, update: &Update) {
        for s in &mut self.searchers {
            s.notify(exe, current, update);
        }
    }

    fn is_empty(&self) -> bool {
        self.searchers.first().map_or(true, |s| s.is_empty())
    }

    fn spawn_empty_clone(&self) -> Box<dyn Searcher> {
        Box::new(Self::new(
            self.searchers.iter().map(|s| s.spawn_empty_clone()).collect(),
            self.rng.clone(),
        ))
    }

    fn collect_tracked(&self, out: &mut Vec<StateId>) {
        if let Some(s) = self.searchers.first() {
            s.collect_tracked(out);
        }
    }

    fn describe(&self) -> String {
        let inner: Vec<_> = self.searchers.iter().map(|s| s.describe()).collect();
        format!("TicketInterleavedSearcher[{}]", inner.join(", "))
    }
}

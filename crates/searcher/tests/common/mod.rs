#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use klee_core::{
    FunctionId, ProgramPoint, SimExecutor, StateAttributes, StateId, StringCompare,
    Update,
};
use klee_searcher::{build_searcher, SearcherConfig, Searcher, SharedRng};

/// Drives a searcher with a seeded fork/terminate/ignore workload and checks
/// the tracked set against the live set after every step.
///
/// Ignored states stay in the executor but leave `live` until unignored.
pub struct Driver {
    pub exe: SimExecutor,
    pub live: BTreeSet<StateId>,
    pub ignored: BTreeSet<StateId>,
    pub trace: Vec<StateId>,
    /// Ignore and unignore events reported so far.
    pub ignores: usize,
    pub unignores: usize,
    rng: StdRng,
}

impl Driver {
    pub fn new(seed: u64) -> Self {
        let mut exe = SimExecutor::new();
        exe.set_function_name(FunctionId(0), "main");
        exe.set_function_name(FunctionId(1), "parse_input");
        exe.set_function_name(FunctionId(2), "memcpy+0x10");
        exe.set_function_name(FunctionId(3), "helper");
        Self {
            exe,
            live: BTreeSet::new(),
            ignored: BTreeSet::new(),
            trace: Vec::new(),
            ignores: 0,
            unignores: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn start(&mut self, s: &mut dyn Searcher, n: usize) {
        let mut arrivals = Vec::new();
        for _ in 0..n {
            let id = self.exe.spawn(StateAttributes {
                depth_weight: 1.0,
                call_stack: vec![FunctionId(0)],
                ..Default::default()
            });
            self.live.insert(id);
            arrivals.push(id);
        }
        s.notify(&self.exe, None, &Update::adding(arrivals));
        self.check(s);
    }

    /// One select / run / notify round. `None` once nothing is live.
    pub fn step(&mut self, s: &mut dyn Searcher) -> Option<StateId> {
        if self.live.is_empty() && !self.ignored.is_empty() {
            let back = std::mem::take(&mut self.ignored);
            self.unignores += back.len();
            self.live.extend(back.iter().copied());
            let mut update = Update::new();
            update.unignored.extend(back);
            s.notify(&self.exe, None, &update);
            self.check(s);
        }

        let allow_compact = self.rng.gen_bool(0.8);
        let Some(cur) = s.select(&mut self.exe, allow_compact) else {
            assert!(self.live.is_empty(), "no selection with {} live states", self.live.len());
            return None;
        };
        assert!(self.live.contains(&cur), "selected dead state {cur}");
        self.trace.push(cur);

        let mut departures: Vec<StateId> = self
            .exe
            .take_terminated()
            .into_iter()
            .filter(|id| *id != cur && self.live.contains(id))
            .collect();
        let mut arrivals = Vec::new();

        self.run(cur);
        let roll = self.rng.gen_range(0..100);
        if roll < 25 && self.live.len() < 40 {
            let child = self.exe.fork(cur);
            arrivals.push(child);
        } else if roll < 40 && self.live.len() > 1 {
            departures.push(cur);
        } else if roll < 45 {
            let others: Vec<_> = self.live.iter().copied().filter(|id| *id != cur).collect();
            if !others.is_empty() {
                let pick = others[self.rng.gen_range(0..others.len())];
                let attrs = self.exe.attrs_mut(pick);
                attrs.is_compact_form = !attrs.is_compact_form;
            }
        }
        let (ignored, unignored) = self.roll_ignores(&departures);
        self.exe.advance_clock(Duration::from_millis(300));

        for id in &departures {
            self.live.remove(id);
        }
        for id in &ignored {
            self.live.remove(id);
            self.ignored.insert(*id);
        }
        for id in &unignored {
            self.ignored.remove(id);
            self.live.insert(*id);
        }
        self.live.extend(arrivals.iter().copied());
        let mut update = Update::from_parts(arrivals, departures.iter().copied());
        update.ignored.extend(ignored);
        update.unignored.extend(unignored);
        update.check_disjoint();
        s.notify(&self.exe, Some(cur), &update);
        for id in departures {
            self.exe.discard(id);
        }
        self.check(s);
        Some(cur)
    }

    /// Maybe take one live state out of scheduling and maybe bring one back.
    /// The running state may be ignored too; at least one state stays live.
    fn roll_ignores(&mut self, departures: &[StateId]) -> (Vec<StateId>, Vec<StateId>) {
        let mut ignored = Vec::new();
        let mut unignored = Vec::new();
        if self.rng.gen_range(0..100) < 8 && self.ignored.len() < 4 {
            let candidates: Vec<_> = self
                .live
                .iter()
                .copied()
                .filter(|id| !departures.contains(id))
                .collect();
            if candidates.len() > 1 {
                ignored.push(candidates[self.rng.gen_range(0..candidates.len())]);
            }
        }
        if !self.ignored.is_empty() && self.rng.gen_range(0..100) < 10 {
            let waiting: Vec<_> = self.ignored.iter().copied().collect();
            unignored.push(waiting[self.rng.gen_range(0..waiting.len())]);
        }
        self.ignores += ignored.len();
        self.unignores += unignored.len();
        (ignored, unignored)
    }

    /// Take `id` out of scheduling outside the random workload.
    pub fn ignore(&mut self, s: &mut dyn Searcher, id: StateId) {
        assert!(self.live.remove(&id), "ignoring {id}, which is not live");
        s.notify(&self.exe, None, &Update::new().with_ignored(id));
        self.check(s);
    }

    /// Bring back a state taken out with [`Driver::ignore`].
    pub fn unignore(&mut self, s: &mut dyn Searcher, id: StateId) {
        assert!(self.exe.contains(id), "{id} was discarded while ignored");
        self.live.insert(id);
        s.notify(&self.exe, None, &Update::new().with_unignored(id));
        self.check(s);
    }

    pub fn run_steps(&mut self, s: &mut dyn Searcher, steps: usize) {
        for _ in 0..steps {
            if self.step(s).is_none() {
                break;
            }
        }
    }

    /// Every live state tracked exactly once, nothing else.
    pub fn check(&self, s: &dyn Searcher) {
        let mut tracked = s.tracked();
        tracked.sort();
        let total = tracked.len();
        tracked.dedup();
        assert_eq!(total, tracked.len(), "a state is tracked twice by {}", s.describe());
        let live: Vec<_> = self.live.iter().copied().collect();
        assert_eq!(tracked, live, "tracked set diverged in {}", s.describe());
    }

    fn run(&mut self, cur: StateId) {
        let n = self.rng.gen_range(1..20);
        self.exe.step(n);
        if self.rng.gen_bool(0.3) {
            self.exe.discover(1);
        }
        let covered_new = self.rng.gen_bool(0.2);
        if covered_new {
            self.exe.cover(1);
        }
        if self.rng.gen_bool(0.1) {
            self.exe.solve(1);
        }

        let byte: u8 = self.rng.gen();
        let addr = self.rng.gen_range(0..4u64) * 8;
        let scan = self.rng.gen_range(0..4u64);
        let call = self.rng.gen_range(0..10);
        let branch = self.rng.gen_range(0..3);
        self.exe.write_memory(cur, addr, byte);

        let attrs = self.exe.attrs_mut(cur);
        attrs.covered_new = covered_new;
        attrs.program_counter = ProgramPoint((attrs.program_counter.0 + 1) % 16);
        attrs.pc_hit_count += 1;
        attrs.call_path_instructions += n;
        attrs.last_branch_id = klee_core::BranchId(branch);
        match call {
            0 | 1 => attrs.call_stack.push(FunctionId(1 + (call as u32 % 3))),
            2 if attrs.call_stack.len() > 1 => {
                attrs.call_stack.pop();
            }
            _ => {}
        }
        if scan == 0 {
            let next = attrs.string_compares.len() as u64;
            attrs.string_compares.push(StringCompare::new("argv", next));
        }
    }
}

pub fn build(toml: &str) -> Box<dyn Searcher> {
    let cfg = SearcherConfig::from_toml(toml).expect("config parses");
    build_searcher(&cfg, &SharedRng::seeded(cfg.seed)).expect("chain builds")
}

/// Selection trace of `steps` rounds of a fresh run.
pub fn trace_of(toml: &str, seed: u64, steps: usize) -> Vec<StateId> {
    let mut s = build(toml);
    let mut driver = Driver::new(seed);
    driver.start(s.as_mut(), 3);
    driver.run_steps(s.as_mut(), steps);
    driver.trace
}

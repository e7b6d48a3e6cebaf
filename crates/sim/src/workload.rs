use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use klee_core::{
    invariant_violation, BranchId, Executor, FunctionId, ProgramPoint, SimExecutor,
    StateAttributes, StateId, StringCompare, Update,
};
use klee_searcher::{build_searcher, SearchError, Searcher, SearcherConfig, SharedRng};

const COMPONENT: &str = "sim";

/// Function names the synthetic program is made of.
const FUNCTIONS: [&str; 5] = ["main", "parse_input", "memcpy+0x10", "checksum", "klee_silent_exit"];

// ── Workload ────────────────────────────────────────────────────────

/// Shape of the synthetic fork/terminate workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub seed: u64,
    pub steps: usize,
    pub initial_states: usize,
    /// No forks while this many states are live.
    pub max_live: usize,
    pub fork_percent: u32,
    pub terminate_percent: u32,
    /// Virtual time charged per step.
    pub step_ms: u64,
    /// Program counters wrap at this length.
    pub program_length: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            seed: 1,
            steps: 1000,
            initial_states: 4,
            max_live: 64,
            fork_percent: 25,
            terminate_percent: 15,
            step_ms: 250,
            program_length: 16,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub searcher: String,
    pub seed: u64,
    pub steps: usize,
    pub selections: usize,
    pub distinct_selected: usize,
    pub forks: usize,
    pub terminations: usize,
    pub merges: usize,
    pub concretized: usize,
    pub live_at_end: usize,
    pub instructions: u64,
    pub covered_instructions: u64,
}

#[derive(Debug, Clone)]
pub struct Run {
    pub summary: RunSummary,
    pub trace: Vec<StateId>,
}

/// Build the chain described by `config` and run `workload` against it.
pub fn simulate(config: &SearcherConfig, workload: &Workload) -> Result<Run, SearchError> {
    let rng = SharedRng::seeded(config.seed);
    let mut searcher = build_searcher(config, &rng)?;
    Ok(Simulation::new(workload.clone()).run(searcher.as_mut()))
}

// ── Simulation ──────────────────────────────────────────────────────

struct Simulation {
    workload: Workload,
    exe: SimExecutor,
    rng: StdRng,
    live: BTreeSet<StateId>,
    trace: Vec<StateId>,
    forks: usize,
    terminations: usize,
}

impl Simulation {
    fn new(workload: Workload) -> Self {
        let mut exe = SimExecutor::new();
        for (i, name) in FUNCTIONS.iter().enumerate() {
            exe.set_function_name(FunctionId(i as u32), *name);
        }
        Self {
            rng: StdRng::seed_from_u64(workload.seed),
            workload,
            exe,
            live: BTreeSet::new(),
            trace: Vec::new(),
            forks: 0,
            terminations: 0,
        }
    }

    fn run(mut self, searcher: &mut dyn Searcher) -> Run {
        let initial: Vec<_> = (0..self.workload.initial_states)
            .map(|_| {
                self.exe.spawn(StateAttributes {
                    depth_weight: 1.0,
                    call_stack: vec![FunctionId(0)],
                    ..Default::default()
                })
            })
            .collect();
        self.live.extend(initial.iter().copied());
        searcher.notify(&self.exe, None, &Update::adding(initial));

        let mut steps = 0;
        while steps < self.workload.steps {
            if !self.step(searcher) {
                break;
            }
            steps += 1;
        }

        let distinct: HashSet<_> = self.trace.iter().collect();
        let stats = self.exe.stats();
        let summary = RunSummary {
            searcher: searcher.describe(),
            seed: self.workload.seed,
            steps,
            selections: self.trace.len(),
            distinct_selected: distinct.len(),
            forks: self.forks,
            terminations: self.terminations,
            merges: self.exe.merges().len(),
            concretized: self.exe.concretized().len(),
            live_at_end: self.live.len(),
            instructions: stats.instructions,
            covered_instructions: stats.covered_instructions,
        };
        info!(steps, selections = summary.selections, live = summary.live_at_end, "simulation finished");
        Run {
            summary,
            trace: self.trace,
        }
    }

    /// One select / execute / notify round; false once nothing is runnable.
    fn step(&mut self, searcher: &mut dyn Searcher) -> bool {
        let allow_compact = self.rng.gen_bool(0.8);
        let Some(cur) = searcher.select(&mut self.exe, allow_compact) else {
            if !self.live.is_empty() {
                invariant_violation(
                    COMPONENT,
                    None,
                    format!("nothing selected with {} live states", self.live.len()),
                );
            }
            return false;
        };
        if !self.live.contains(&cur) {
            invariant_violation(COMPONENT, Some(cur), "selected a state that is not live");
        }
        self.trace.push(cur);

        // merges retire states during select
        let mut departures: Vec<_> = self
            .exe
            .take_terminated()
            .into_iter()
            .filter(|id| *id != cur && self.live.contains(id))
            .collect();
        let mut arrivals = Vec::new();

        self.execute(cur);

        let roll = self.rng.gen_range(0..100);
        let fork_below = self.workload.fork_percent;
        let terminate_below = fork_below + self.workload.terminate_percent;
        if roll < fork_below && self.live.len() < self.workload.max_live {
            let child = self.exe.fork(cur);
            self.exe.attrs_mut(child).constraint_count += 1;
            self.exe.attrs_mut(cur).constraint_count += 1;
            self.forks += 1;
            debug!(parent = %cur, child = %child, "fork");
            arrivals.push(child);
        } else if roll >= fork_below && roll < terminate_below {
            debug!(state = %cur, "terminate");
            departures.push(cur);
        } else if roll >= 95 {
            self.toggle_compact(cur);
        }
        self.exe.advance_clock(Duration::from_millis(self.workload.step_ms));

        self.terminations += departures.len();
        for id in &departures {
            self.live.remove(id);
        }
        self.live.extend(arrivals.iter().copied());
        searcher.notify(&self.exe, Some(cur), &Update::from_parts(arrivals, departures.iter().copied()));
        for id in departures {
            self.exe.discard(id);
        }

        self.check(searcher);
        true
    }

    /// Run a few instructions of `cur` and update its attributes.
    fn execute(&mut self, cur: StateId) {
        let n = self.rng.gen_range(1..20);
        self.exe.step(n);
        if self.rng.gen_bool(0.3) {
            self.exe.discover(1);
        }
        let covered_new = self.rng.gen_bool(0.2);
        if covered_new {
            self.exe.cover(1);
        }
        let solved = self.rng.gen_bool(0.1);
        if solved {
            self.exe.solve(1);
        }

        let addr = self.rng.gen_range(0..4u64) * 8;
        let byte: u8 = self.rng.gen();
        let call = self.rng.gen_range(0..10u32);
        let branch = self.rng.gen_range(0..3);
        let compare = self.rng.gen_range(0..4);
        let dist = self.rng.gen_range(0..50);
        let len = self.workload.program_length.max(1);
        self.exe.write_memory(cur, addr, byte);

        let attrs = self.exe.attrs_mut(cur);
        attrs.covered_new = covered_new;
        attrs.program_counter = ProgramPoint((attrs.program_counter.0 + 1) % len);
        attrs.pc_hit_count += 1;
        attrs.call_path_instructions += n;
        attrs.total_insts += n;
        attrs.insts_since_cov_new = if covered_new { 0 } else { attrs.insts_since_cov_new + n };
        attrs.min_dist_to_uncovered = dist;
        attrs.last_branch_id = BranchId(branch);
        if solved {
            attrs.query_cost += 0.05;
        }
        match call {
            0 | 1 => attrs.call_stack.push(FunctionId(1 + call % 4)),
            2 if attrs.call_stack.len() > 1 => {
                attrs.call_stack.pop();
                attrs.call_path_instructions = 0;
            }
            _ => {}
        }
        if compare == 0 {
            let next = attrs.string_compares.len() as u64;
            attrs.string_compares.push(StringCompare::new("argv", next));
        }
    }

    fn toggle_compact(&mut self, cur: StateId) {
        let others: Vec<_> = self.live.iter().copied().filter(|id| *id != cur).collect();
        if others.is_empty() {
            return;
        }
        let pick = others[self.rng.gen_range(0..others.len())];
        let attrs = self.exe.attrs_mut(pick);
        attrs.is_compact_form = !attrs.is_compact_form;
    }

    /// Every live state tracked exactly once.
    fn check(&self, searcher: &dyn Searcher) {
        let mut tracked = searcher.tracked();
        tracked.sort();
        let total = tracked.len();
        tracked.dedup();
        if total != tracked.len() {
            invariant_violation(COMPONENT, None, "a state is tracked twice");
        }
        if !tracked.iter().eq(self.live.iter()) {
            invariant_violation(
                COMPONENT,
                None,
                format!(
                    "tracked {} states but {} are live",
                    tracked.len(),
                    self.live.len()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> SearcherConfig {
        SearcherConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn test_same_seed_same_trace() {
        let cfg = config(
            r#"
[base]
strategy = "weighted"
weight = "covering_new"

[epoch]
enabled = true

[batching]
enabled = true
instructions = 50
"#,
        );
        let workload = Workload {
            seed: 11,
            steps: 500,
            ..Default::default()
        };
        let a = simulate(&cfg, &workload).unwrap();
        let b = simulate(&cfg, &workload).unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn test_different_workload_seed_diverges() {
        let cfg = config("[base]\nstrategy = \"random\"\n");
        let a = simulate(&cfg, &Workload { seed: 1, ..Default::default() }).unwrap();
        let b = simulate(&cfg, &Workload { seed: 2, ..Default::default() }).unwrap();
        assert_ne!(a.trace, b.trace);
    }

    #[test]
    fn test_run_stops_when_everything_terminated() {
        let cfg = config("");
        let workload = Workload {
            fork_percent: 0,
            terminate_percent: 100,
            initial_states: 3,
            ..Default::default()
        };
        let run = simulate(&cfg, &workload).unwrap();
        // the last state is terminated too; the next select finds nothing
        assert_eq!(run.summary.selections, 3);
        assert_eq!(run.summary.live_at_end, 0);
        assert_eq!(run.summary.terminations, 3);
    }

    #[test]
    fn test_merging_run_reports_merges() {
        let cfg = config(
            r#"
[base]
strategy = "round_robin"

[merge]
use_merge = true
merge_points = [5]
"#,
        );
        let workload = Workload {
            seed: 4,
            steps: 2000,
            terminate_percent: 5,
            ..Default::default()
        };
        let run = simulate(&cfg, &workload).unwrap();
        assert!(run.summary.selections > 0);
        assert!(run.summary.terminations >= run.summary.merges);
    }

    #[test]
    fn test_summary_serializes() {
        let workload = Workload {
            steps: 20,
            terminate_percent: 0,
            ..Default::default()
        };
        let run = simulate(&config(""), &workload).unwrap();
        let json = serde_json::to_value(&run.summary).unwrap();
        assert_eq!(json["searcher"], "FifoSearcher");
        assert_eq!(json["steps"], 20);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cfg = SearcherConfig::default();
        cfg.filter.enabled = true;
        assert!(simulate(&cfg, &Workload::default()).is_err());
    }
}

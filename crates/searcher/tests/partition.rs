mod common;

use klee_core::{StateId, Update};

use common::{build, Driver};

const CHAINS: &[(&str, &str)] = &[
    ("fifo", ""),
    ("lifo", "[base]\nstrategy = \"lifo\"\n"),
    ("random", "[base]\nstrategy = \"random\"\n"),
    ("round_robin", "[base]\nstrategy = \"round_robin\"\n"),
    ("phased", "[base]\nstrategy = \"phased\"\n"),
    (
        "weighted",
        "[base]\nstrategy = \"weighted\"\nweight = \"inst_count\"\n",
    ),
    (
        "priority",
        r#"
[base]
strategy = "priority"
weighers = ["coverage", "bucket_by_function", "trace"]
kick_rate = 2
"#,
    ),
    (
        "rescan",
        r#"
[base]
strategy = "rescan"
weighers = ["metric"]
weight = "covering_new"
"#,
    ),
    (
        "interleaved",
        r#"
[interleave]
enabled = true
strategies = ["lifo", "random"]
"#,
    ),
    (
        "tickets",
        r#"
[interleave]
enabled = true
strategies = ["weighted", "priority"]
tickets = true
"#,
    ),
    (
        "epoch",
        r#"
[base]
strategy = "phased"

[epoch]
enabled = true
watermark = 3
"#,
    ),
    (
        "filter_demotion",
        r#"
[filter]
enabled = true
functions = ["memcpy"]

[demotion]
enabled = true
max_repeats = 2
"#,
    ),
    (
        "budgets",
        r#"
[base]
strategy = "random"

[second_chance]
enabled = true

[batching]
enabled = true
time_ms = 1000
instructions = 40
queries = 2
adaptive = true
"#,
    ),
    (
        "merge",
        r#"
[merge]
use_merge = true
merge_points = [6, 12]
"#,
    ),
    (
        "bump_merge",
        r#"
[base]
strategy = "lifo"

[merge]
use_bump_merge = true
merge_points = [6, 12]
"#,
    ),
    (
        "everything",
        r#"
[base]
strategy = "priority"
weighers = ["coverage", "metric"]
bucket = "random"

[interleave]
enabled = true
strategies = ["round_robin"]

[epoch]
enabled = true

[xchk]
enabled = true

[filter]
enabled = true
mode = "blacklist"
functions = ["memcpy"]

[demotion]
enabled = true

[second_chance]
enabled = true

[batching]
enabled = true
instructions = 30

[merge]
use_merge = true
merge_points = [6]

[deepening]
enabled = true

[string_prune]
enabled = true
"#,
    ),
];

#[test]
fn test_partition_holds_for_every_chain() {
    for (name, toml) in CHAINS {
        let mut ignores = 0;
        let mut unignores = 0;
        for seed in [1, 7, 42] {
            let mut s = build(toml);
            let mut driver = Driver::new(seed);
            driver.start(s.as_mut(), 4);
            driver.run_steps(s.as_mut(), 400);
            assert!(
                !driver.trace.is_empty(),
                "chain {name} never selected anything"
            );
            ignores += driver.ignores;
            unignores += driver.unignores;
        }
        assert!(ignores > 0 && unignores > 0, "chain {name} saw no ignore cycle");
    }
}

#[test]
fn test_ignored_state_sits_out_until_unignored() {
    for (name, toml) in CHAINS {
        let mut s = build(toml);
        let mut driver = Driver::new(13);
        driver.start(s.as_mut(), 5);
        driver.run_steps(s.as_mut(), 20);
        let Some(&victim) = driver.live.iter().next() else {
            continue;
        };

        driver.ignore(s.as_mut(), victim);
        assert!(!s.tracked().contains(&victim), "chain {name}");
        let from = driver.trace.len();
        driver.run_steps(s.as_mut(), 60);
        assert!(
            !driver.trace[from..].contains(&victim),
            "chain {name} selected ignored state {victim}"
        );

        driver.unignore(s.as_mut(), victim);
        assert!(s.tracked().contains(&victim), "chain {name}");
        driver.run_steps(s.as_mut(), 60);
    }
}

#[test]
fn test_drains_to_empty() {
    for (name, toml) in CHAINS {
        let mut s = build(toml);
        let mut driver = Driver::new(3);
        driver.start(s.as_mut(), 4);
        driver.run_steps(s.as_mut(), 100);

        let live: Vec<StateId> = driver.live.iter().copied().collect();
        s.notify(&driver.exe, None, &Update::removing(live.iter().copied()));
        driver.live.clear();
        driver.check(s.as_ref());
        assert!(s.is_empty(), "chain {name} not empty after removing everything");
        assert_eq!(s.select(&mut driver.exe, true), None, "chain {name}");
    }
}

#[test]
fn test_removal_is_idempotent() {
    for (name, toml) in CHAINS {
        let mut s = build(toml);
        let mut driver = Driver::new(9);
        driver.start(s.as_mut(), 6);
        driver.run_steps(s.as_mut(), 50);
        let Some(&victim) = driver.live.iter().next() else {
            continue;
        };

        s.remove_state(&driver.exe, victim);
        driver.live.remove(&victim);
        driver.check(s.as_ref());

        s.remove_state(&driver.exe, victim);
        s.remove_state(&driver.exe, StateId(u64::MAX));
        driver.check(s.as_ref());
        assert!(!s.tracked().contains(&victim), "chain {name}");
    }
}

#[test]
fn test_spawned_clone_starts_empty() {
    for (name, toml) in CHAINS {
        let mut s = build(toml);
        let mut driver = Driver::new(5);
        driver.start(s.as_mut(), 5);
        let clone = s.spawn_empty_clone();
        assert!(clone.is_empty(), "chain {name}");
        assert!(clone.tracked().is_empty(), "chain {name}");
        assert_eq!(clone.describe(), s.describe(), "chain {name}");
    }
}

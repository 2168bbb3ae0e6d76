#![cfg(feature = "test-harness")]

use reconciler_test_support::{Scenario, check_scenario, load_scenario, run_scenario};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenarios")
}

/// `TRELLIS_SCENARIO_FILTER=rotation` runs only scenarios whose name
/// contains the filter.
fn scenario_filter() -> Option<String> {
    env::var("TRELLIS_SCENARIO_FILTER").ok().filter(|value| !value.is_empty())
}

fn load_fixtures() -> Vec<Scenario> {
    let dir = fixtures_dir();
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap_or_else(|err| panic!("failed to read {dir:?}: {err}"))
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths.iter().map(|path| load_scenario(path)).collect()
}

#[test]
fn scenario_fixtures() {
    let filter = scenario_filter();
    let mut ran = 0usize;
    let mut failures = Vec::new();
    for scenario in load_fixtures() {
        if filter.as_deref().is_some_and(|filter| !scenario.name.contains(filter)) {
            continue;
        }
        ran += 1;
        if let Err(failure) = check_scenario(&scenario) {
            failures.push(failure);
        }
    }
    assert!(ran > 0, "no scenarios matched filter");
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn scenario_runs_are_deterministic() {
    for scenario in load_fixtures() {
        let first = run_scenario(&scenario).expect("first run");
        let second = run_scenario(&scenario).expect("second run");
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.effects, b.effects, "{}", scenario.name);
            assert_eq!(a.tree, b.tree, "{}", scenario.name);
        }
    }
}

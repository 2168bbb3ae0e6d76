use mimalloc::MiMalloc;
use reconciler_test_support::{Scenario, check_scenario, run_scenario};
use std::env;
use std::fs;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "usage: trellis [--check] <scenario.toml>...";

struct Args {
    check: bool,
    paths: Vec<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut check = false;
    let mut paths = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--check" => check = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("unknown flag `{flag}`\n{USAGE}")),
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(Args { check, paths })
}

fn load(path: &str) -> Result<Scenario, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("{path}: {err}"))?;
    Scenario::from_toml(&text).map_err(|err| format!("{path}: {err}"))
}

fn print_scenario(scenario: &Scenario) -> Result<(), String> {
    let reports = run_scenario(scenario).map_err(|err| format!("{}: {err}", scenario.name))?;
    println!("# {}", scenario.name);
    for (index, report) in reports.iter().enumerate() {
        println!("## step {index}");
        for effect in &report.effects {
            println!("effect {effect}");
        }
        for diagnostic in &report.diagnostics {
            println!("warning {diagnostic}");
        }
        for mismatch in &report.recoverable {
            println!("recovered {mismatch}");
        }
        if report.skipped_lanes != reconciler::Lanes::NONE {
            println!("skipped {:?}", report.skipped_lanes);
        }
        for line in &report.tree {
            println!("{line}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let mut failed = 0usize;
    for path in &args.paths {
        log::info!("running scenario {path}");
        let result = load(path).and_then(|scenario| {
            if args.check {
                check_scenario(&scenario).map(|()| println!("ok {}", scenario.name))
            } else {
                print_scenario(&scenario)
            }
        });
        if let Err(message) = result {
            eprintln!("{message}");
            failed += 1;
        }
    }
    if failed > 0 {
        eprintln!("{failed} of {} scenarios failed", args.paths.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

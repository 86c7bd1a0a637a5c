//! Drives the real process adapter with `sh` standing in for Octave.
#![cfg(unix)]

use emsim_optimizer::core::{ParameterModel, SimulationId, SimulationStatus};
use emsim_optimizer::simulation::{OctaveProcess, ProcessAdapter, SimulationExecutor};
use std::time::{Duration, Instant};

fn sh() -> OctaveProcess {
    OctaveProcess::new("sh", vec!["{script}".into()]).with_poll_interval(Duration::from_millis(10))
}

fn run(script: &str, timeout: Duration) -> (tempfile::TempDir, emsim_optimizer::SimulationRecord) {
    let root = tempfile::tempdir().unwrap();
    let executor = SimulationExecutor::new(Box::new(sh()));
    let id = SimulationId::new("sh_run").unwrap();
    let dir = root.path().join("sh_run");
    let record = executor.execute(&id, &ParameterModel::default(), script, &dir, timeout);
    (root, record)
}

#[test]
fn zero_exit_completes_and_lists_artifacts() {
    let (_root, record) = run("echo hello\nprintf '1\\n2\\n' > frequency.txt\n", Duration::from_secs(10));
    assert_eq!(record.status, SimulationStatus::Completed);
    assert_eq!(record.diagnostics.exit_code, Some(0));
    assert!(record.diagnostics.stdout.contains("hello"));
    let names: Vec<String> = record
        .artifacts
        .iter()
        .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["frequency.txt", "sh_run.m"]);
}

#[test]
fn non_zero_exit_keeps_stderr() {
    let (_root, record) = run("echo 'openEMS: mesh too coarse' >&2\nexit 3\n", Duration::from_secs(10));
    assert_eq!(record.status, SimulationStatus::Failed);
    assert_eq!(record.diagnostics.exit_code, Some(3));
    assert!(record.diagnostics.stderr.contains("mesh too coarse"));
}

#[test]
fn slow_solver_is_killed_at_the_deadline() {
    let started = Instant::now();
    let (_root, record) = run("exec sleep 30\n", Duration::from_millis(500));
    assert_eq!(record.status, SimulationStatus::TimedOut);
    assert!(record.diagnostics.exit_code.is_none());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn probe_reports_the_first_line() {
    let process = OctaveProcess::new("echo", vec!["{script}".into()]);
    assert!(!process.probe().unwrap().is_empty());
}

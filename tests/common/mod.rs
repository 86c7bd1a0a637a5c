//! Scripted stand-in for Octave/openEMS.
//!
//! Reads the design variables out of the generated script and writes the
//! ASCII artifacts a real run would leave behind, for a lossless line whose
//! impedance follows a simple power law in width and gap.

#![allow(dead_code)]

use emsim_optimizer::config::EngineConfig;
use emsim_optimizer::simulation::{ProcessAdapter, ProcessOutcome};
use emsim_optimizer::Engine;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Behavior {
    /// Exit 0 and write a full set of artifacts.
    Line,
    /// Exit 0 without writing any artifacts.
    Silent,
    Exit { code: i32, stderr: String },
    TimeOut,
}

#[derive(Clone)]
pub struct MockSolver {
    pub behavior: Behavior,
    pub calls: Arc<AtomicUsize>,
}

impl MockSolver {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// |Z| of the mock line: 50 Ω at width 10, gap 6.
pub fn line_impedance(width: f64, gap: f64) -> f64 {
    50.0 * (gap / 6.0).powf(0.25) * (10.0 / width).powf(0.25)
}

fn variable(script: &str, name: &str) -> io::Result<f64> {
    let re = Regex::new(&format!(r"(?m)^{} = ([^;]+);", regex::escape(name)))
        .map_err(io::Error::other)?;
    re.captures(script)
        .and_then(|c| c[1].trim().parse().ok())
        .ok_or_else(|| io::Error::other(format!("{name} not found in script")))
}

fn column(values: impl IntoIterator<Item = f64>) -> String {
    values.into_iter().fold(String::new(), |mut out, v| {
        let _ = writeln!(out, "{:.12e}", v);
        out
    })
}

fn write_line(script: &str, dir: &Path) -> io::Result<()> {
    let width = variable(script, "line_width")?;
    let gap = variable(script, "line_gap")?;
    let start = variable(script, "f_start")?;
    let stop = variable(script, "f_stop")?;
    let points = variable(script, "f_points")? as usize;

    let z = line_impedance(width, gap);
    let gamma = (z - 50.0) / (z + 50.0);
    let transmission = (1.0 - gamma * gamma).sqrt();
    let freqs = (0..points).map(|i| start + (stop - start) * i as f64 / (points - 1) as f64);

    fs::write(dir.join("frequency.txt"), column(freqs))?;
    fs::write(dir.join("s11_real.txt"), column(vec![gamma; points]))?;
    fs::write(dir.join("s11_imag.txt"), column(vec![0.0; points]))?;
    fs::write(dir.join("s21_real.txt"), column(vec![transmission; points]))?;
    fs::write(dir.join("s21_imag.txt"), column(vec![0.0; points]))?;
    fs::write(dir.join("impedance_real.txt"), column(vec![z; points]))?;
    fs::write(dir.join("impedance_imag.txt"), column(vec![0.0; points]))?;
    fs::write(dir.join("sparameters.png"), b"\x89PNG")?;
    Ok(())
}

impl ProcessAdapter for MockSolver {
    fn run(&self, script_path: &Path, working_dir: &Path, timeout: Duration) -> io::Result<ProcessOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = fs::read_to_string(script_path)?;
        match &self.behavior {
            Behavior::Line => {
                write_line(&script, working_dir)?;
                Ok(ProcessOutcome {
                    exit_code: Some(0),
                    stdout: "openEMS done".into(),
                    elapsed: Duration::from_millis(5),
                    ..Default::default()
                })
            }
            Behavior::Silent => Ok(ProcessOutcome {
                exit_code: Some(0),
                ..Default::default()
            }),
            Behavior::Exit { code, stderr } => Ok(ProcessOutcome {
                exit_code: Some(*code),
                stderr: stderr.clone(),
                ..Default::default()
            }),
            Behavior::TimeOut => Ok(ProcessOutcome {
                exit_code: None,
                timed_out: true,
                elapsed: timeout,
                ..Default::default()
            }),
        }
    }

    fn probe(&self) -> io::Result<String> {
        Ok("GNU Octave, version 8.4.0 (mock)".to_string())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub solver: MockSolver,
    pub root: tempfile::TempDir,
}

pub fn harness(behavior: Behavior) -> Harness {
    harness_with(behavior, |_| {})
}

pub fn harness_with(behavior: Behavior, configure: impl FnOnce(&mut EngineConfig)) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::default();
    config.work_root = root.path().join("runs");
    config.run_timeout_secs = 5;
    configure(&mut config);
    let solver = MockSolver::new(behavior);
    let engine = Engine::with_process(config, Box::new(solver.clone())).expect("valid config");
    Harness { engine, solver, root }
}

use crossbeam::channel::{self, Receiver};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SolverConfig;

/// What a solver process did.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Seam between the executor and the numeric environment.
///
/// `Err` is reserved for failures to launch or supervise the process; a run
/// that starts and then fails is an `Ok` outcome with a non-zero exit code.
pub trait ProcessAdapter: Send {
    fn run(&self, script_path: &Path, working_dir: &Path, timeout: Duration)
        -> io::Result<ProcessOutcome>;

    /// Version banner of the underlying tool.
    fn probe(&self) -> io::Result<String>;
}

/// Runs scripts with GNU Octave (or anything with a compatible command line).
#[derive(Debug, Clone)]
pub struct OctaveProcess {
    executable: String,
    args: Vec<String>,
    poll_interval: Duration,
    drain_grace: Duration,
}

impl Default for OctaveProcess {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

impl OctaveProcess {
    pub const SCRIPT_PLACEHOLDER: &'static str = "{script}";

    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            poll_interval: Duration::from_millis(50),
            drain_grace: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.executable.clone(), config.args.clone())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long to wait for output pipes after the child is gone.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    fn command_args(&self, script: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(Self::SCRIPT_PLACEHOLDER, script))
            .collect()
    }

    fn wait_with_deadline(&self, child: &mut Child, timeout: Duration) -> io::Result<(Option<i32>, bool)> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status.code(), false));
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "failed to kill solver process");
                }
                let _ = child.wait();
                return Ok((None, true));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Read a pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = channel::bounded(1);
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                tracing::warn!(error = %e, bytes_read = buf.len(), "solver output truncated");
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    } else {
        let _ = tx.send(String::new());
    }
    rx
}

impl ProcessAdapter for OctaveProcess {
    fn run(&self, script_path: &Path, working_dir: &Path, timeout: Duration) -> io::Result<ProcessOutcome> {
        // The child runs inside the working directory, so hand it a relative script path.
        let script = script_path
            .strip_prefix(working_dir)
            .unwrap_or(script_path)
            .to_string_lossy()
            .into_owned();
        let args = self.command_args(&script);
        tracing::debug!(executable = %self.executable, ?args, dir = %working_dir.display(), "spawning solver");

        let start = Instant::now();
        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());
        let (exit_code, timed_out) = self.wait_with_deadline(&mut child, timeout)?;
        let elapsed = start.elapsed();

        // Grandchildren may still hold the pipes open after a kill; give up on them after the grace period.
        let stdout = stdout_rx.recv_timeout(self.drain_grace).unwrap_or_default();
        let stderr = stderr_rx.recv_timeout(self.drain_grace).unwrap_or_default();

        Ok(ProcessOutcome {
            exit_code,
            timed_out,
            stdout,
            stderr,
            elapsed,
        })
    }

    fn probe(&self) -> io::Result<String> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} --version exited with {}",
                self.executable, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

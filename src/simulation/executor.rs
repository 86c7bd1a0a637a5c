use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use super::process::{OctaveProcess, ProcessAdapter};
use crate::core::{
    Artifact, ArtifactKind, EngineError, Failure, ParameterModel, SimulationId, SimulationRecord,
    SimulationStatus, Stage,
};

/// Runs one generated script per call through a [`ProcessAdapter`].
pub struct SimulationExecutor {
    process: Box<dyn ProcessAdapter>,
}

impl Default for SimulationExecutor {
    fn default() -> Self {
        Self::new(Box::new(OctaveProcess::default()))
    }
}

impl SimulationExecutor {
    pub fn new(process: Box<dyn ProcessAdapter>) -> Self {
        Self { process }
    }

    pub fn process(&self) -> &dyn ProcessAdapter {
        self.process.as_ref()
    }

    /// Run `script_text` in `working_directory` and report what happened.
    ///
    /// Never fails: launch errors, non-zero exits and timeouts all come back
    /// as a terminal record with diagnostics filled in.
    pub fn execute(
        &self,
        id: &SimulationId,
        parameters: &ParameterModel,
        script_text: &str,
        working_directory: &Path,
        timeout: Duration,
    ) -> SimulationRecord {
        let span = tracing::info_span!("execute", simulation = %id);
        let _enter = span.enter();

        let mut record = SimulationRecord::pending(
            id.clone(),
            parameters.clone(),
            script_text.to_string(),
            working_directory.to_path_buf(),
        );
        record.status = SimulationStatus::Running;
        record.started_at = Some(SystemTime::now());

        let script_path = match prepare_directory(id, script_text, working_directory) {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(error = %err, "could not prepare working directory");
                finish(&mut record, SimulationStatus::Failed, Stage::Execution, err.to_string());
                return record;
            }
        };
        record.script_path = Some(script_path.clone());
        tracing::info!(
            script = %script_path.display(),
            timeout_secs = timeout.as_secs_f64(),
            "starting solver"
        );

        let outcome = match self.process.run(&script_path, working_directory, timeout) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "could not launch solver");
                finish(
                    &mut record,
                    SimulationStatus::Failed,
                    Stage::Execution,
                    format!("failed to launch solver: {}", err),
                );
                return record;
            }
        };

        record.diagnostics.exit_code = outcome.exit_code;
        record.diagnostics.stdout = outcome.stdout;
        record.diagnostics.stderr = outcome.stderr;
        record.diagnostics.elapsed_secs = Some(outcome.elapsed.as_secs_f64());
        record.artifacts = collect_artifacts(working_directory);

        if outcome.timed_out {
            tracing::warn!(elapsed_secs = outcome.elapsed.as_secs_f64(), "solver timed out and was killed");
            finish(
                &mut record,
                SimulationStatus::TimedOut,
                Stage::Execution,
                format!("exceeded the {}s timeout", timeout.as_secs_f64()),
            );
        } else if outcome.exit_code == Some(0) {
            record.status = SimulationStatus::Completed;
            record.finished_at = Some(SystemTime::now());
            tracing::info!(
                artifacts = record.artifacts.len(),
                elapsed_secs = outcome.elapsed.as_secs_f64(),
                "solver finished"
            );
        } else {
            let message = match outcome.exit_code {
                Some(code) => format!("solver exited with code {}", code),
                None => "solver terminated by a signal".to_string(),
            };
            tracing::warn!(exit_code = ?outcome.exit_code, "solver failed");
            finish(&mut record, SimulationStatus::Failed, Stage::Execution, message);
        }
        tracing::debug!(artifacts = ?record.artifacts.iter().map(|a| &a.path).collect::<Vec<_>>());

        record
    }
}

fn finish(record: &mut SimulationRecord, status: SimulationStatus, stage: Stage, message: String) {
    record.status = status;
    record.finished_at = Some(SystemTime::now());
    record.diagnostics.failure = Some(Failure { stage, message });
}

/// Create the directory, clear what a previous run left there and write `<id>.m`.
fn prepare_directory(
    id: &SimulationId,
    script_text: &str,
    working_directory: &Path,
) -> Result<PathBuf, EngineError> {
    let io_err = |path: &Path, e| EngineError::io(Stage::Execution, path, e);

    fs::create_dir_all(working_directory).map_err(|e| io_err(working_directory, e))?;
    let entries = fs::read_dir(working_directory).map_err(|e| io_err(working_directory, e))?;
    for entry in entries {
        let path = entry.map_err(|e| io_err(working_directory, e))?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| io_err(&path, e))?;
        tracing::debug!(path = %path.display(), "removed stale artifact");
    }

    let script_path = working_directory.join(format!("{}.m", id));
    fs::write(&script_path, script_text).map_err(|e| io_err(&script_path, e))?;
    tracing::debug!(bytes = script_text.len(), path = %script_path.display(), "script written");
    Ok(script_path)
}

/// Every file under `dir`, sorted by path.
pub fn collect_artifacts(dir: &Path) -> Vec<Artifact> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| Artifact {
            kind: ArtifactKind::from_path(entry.path()),
            bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            path: entry.into_path(),
        })
        .collect()
}

/// Typed error for a record that did not complete, `None` if it did.
pub fn run_error(record: &SimulationRecord, timeout: Duration) -> Option<EngineError> {
    match record.status {
        SimulationStatus::Completed | SimulationStatus::Pending | SimulationStatus::Running => None,
        SimulationStatus::TimedOut => Some(EngineError::Timeout {
            id: record.id.clone(),
            timeout,
        }),
        SimulationStatus::Failed => {
            let failure = record.diagnostics.failure.as_ref();
            if let Some(Failure {
                stage: Stage::Parsing,
                message,
            }) = failure
            {
                return Some(EngineError::malformed(&record.id, None, message.clone()));
            }
            let stderr = if record.diagnostics.stderr.trim().is_empty() {
                failure.map(|f| f.message.clone()).unwrap_or_default()
            } else {
                record.diagnostics.stderr.clone()
            };
            Some(EngineError::ExecutionFailed {
                id: record.id.clone(),
                stage: failure.map(|f| f.stage).unwrap_or(Stage::Execution),
                exit_code: record.diagnostics.exit_code,
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::process::ProcessOutcome;
    use std::io;

    struct Scripted {
        exit_code: Option<i32>,
        timed_out: bool,
    }

    impl ProcessAdapter for Scripted {
        fn run(&self, _script: &Path, dir: &Path, _timeout: Duration) -> io::Result<ProcessOutcome> {
            fs::write(dir.join("frequency.txt"), "1e9\n2e9\n")?;
            Ok(ProcessOutcome {
                exit_code: self.exit_code,
                timed_out: self.timed_out,
                stdout: "ok".into(),
                stderr: if self.exit_code == Some(0) { String::new() } else { "boom".into() },
                elapsed: Duration::from_millis(5),
            })
        }

        fn probe(&self) -> io::Result<String> {
            Ok("scripted".into())
        }
    }

    fn run(process: Scripted, dir: &Path) -> SimulationRecord {
        let executor = SimulationExecutor::new(Box::new(process));
        let id = SimulationId::new("exec_test").unwrap();
        executor.execute(&id, &ParameterModel::default(), "disp(1);\n", dir, Duration::from_secs(1))
    }

    #[test]
    fn zero_exit_completes_and_lists_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let record = run(Scripted { exit_code: Some(0), timed_out: false }, dir.path());
        assert_eq!(record.status, SimulationStatus::Completed);
        assert!(record.finished_at.is_some());
        let names: Vec<_> = record
            .artifacts
            .iter()
            .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["exec_test.m", "frequency.txt"]);
        assert_eq!(record.artifacts[0].kind, ArtifactKind::Script);
        assert_eq!(record.artifacts[1].kind, ArtifactKind::Data);
        assert!(run_error(&record, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn non_zero_exit_fails_and_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let record = run(Scripted { exit_code: Some(1), timed_out: false }, dir.path());
        assert_eq!(record.status, SimulationStatus::Failed);
        assert_eq!(record.diagnostics.stderr, "boom");
        match run_error(&record, Duration::from_secs(1)) {
            Some(EngineError::ExecutionFailed { exit_code, stderr, .. }) => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn timeout_is_reported_as_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let record = run(Scripted { exit_code: None, timed_out: true }, dir.path());
        assert_eq!(record.status, SimulationStatus::TimedOut);
        assert!(matches!(
            run_error(&record, Duration::from_secs(5)),
            Some(EngineError::Timeout { .. })
        ));
    }

    #[test]
    fn stale_artifacts_are_removed_before_the_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s11_real.txt"), "old").unwrap();
        fs::create_dir(dir.path().join("openems_data_1")).unwrap();
        let record = run(Scripted { exit_code: Some(0), timed_out: false }, dir.path());
        assert!(!dir.path().join("s11_real.txt").exists());
        assert!(!dir.path().join("openems_data_1").exists());
        assert_eq!(record.artifacts.len(), 2);
    }

    #[test]
    fn launch_failure_becomes_a_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SimulationExecutor::new(Box::new(OctaveProcess::new(
            "emsim-no-such-binary",
            vec!["{script}".into()],
        )));
        let id = SimulationId::new("nolaunch").unwrap();
        let record = executor.execute(&id, &ParameterModel::default(), "", dir.path(), Duration::from_secs(1));
        assert_eq!(record.status, SimulationStatus::Failed);
        let failure = record.diagnostics.failure.unwrap();
        assert_eq!(failure.stage, Stage::Execution);
        assert!(failure.message.contains("failed to launch"));
    }
}

//! Error kinds surfaced by every stage of a simulation run.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::types::SimulationId;

/// Pipeline stage a failure originated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ScriptGeneration,
    Execution,
    Parsing,
    Caching,
    Export,
    Optimization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScriptGeneration => "script generation",
            Self::Execution => "execution",
            Self::Parsing => "parsing",
            Self::Caching => "caching",
            Self::Export => "export",
            Self::Optimization => "optimization",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A ParameterModel field broke one of its invariants. Never retried.
    #[error("invalid parameter `{field}`{}: {constraint}", for_simulation(.simulation))]
    InvalidParameter {
        simulation: Option<SimulationId>,
        field: String,
        constraint: String,
    },

    /// The solver exited with a non-zero status (or could not be started).
    #[error(
        "simulation `{id}` failed during {stage} (exit code {}): {}",
        exit_code_text(.exit_code),
        stderr_excerpt(.stderr)
    )]
    ExecutionFailed {
        id: SimulationId,
        stage: Stage,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The solver ran past its deadline and was killed.
    #[error("simulation `{id}` exceeded the {}s timeout and was terminated", secs(.timeout))]
    Timeout { id: SimulationId, timeout: Duration },

    /// Solver artifacts were missing or did not match the requested sweep.
    #[error("malformed result for simulation `{id}`{}: {reason}", in_file(.file))]
    MalformedResult {
        id: SimulationId,
        file: Option<PathBuf>,
        reason: String,
    },

    #[error("{what} for simulation `{id}` not found")]
    NotFound { id: String, what: &'static str },

    #[error("unsupported export format `{0}` (expected one of: touchstone, csv, json, octave)")]
    UnsupportedFormat(String),

    /// A network-parameter file could not be read back.
    #[error("touchstone import failed: {0}")]
    Import(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{stage} I/O error on {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::InvalidParameter {
            simulation: None,
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            what: "record",
        }
    }

    pub fn malformed(id: &SimulationId, file: Option<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedResult {
            id: id.clone(),
            file,
            reason: reason.into(),
        }
    }

    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Attach the simulation the error belongs to, where the variant has room for it.
    pub fn for_simulation(mut self, id: &SimulationId) -> Self {
        if let Self::InvalidParameter { simulation, .. } = &mut self {
            simulation.get_or_insert_with(|| id.clone());
        }
        self
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidParameter { .. } => Some(Stage::ScriptGeneration),
            Self::ExecutionFailed { stage, .. } => Some(*stage),
            Self::Timeout { .. } => Some(Stage::Execution),
            Self::MalformedResult { .. } => Some(Stage::Parsing),
            Self::NotFound { .. } => Some(Stage::Caching),
            Self::UnsupportedFormat(_) | Self::Import(_) => Some(Stage::Export),
            Self::Config(_) => None,
            Self::Io { stage, .. } => Some(*stage),
        }
    }
}

fn for_simulation(simulation: &Option<SimulationId>) -> String {
    simulation
        .as_ref()
        .map(|id| format!(" for simulation `{}`", id))
        .unwrap_or_default()
}

fn exit_code_text(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn secs(timeout: &Duration) -> f64 {
    timeout.as_secs_f64()
}

fn in_file(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// Keep the tail of stderr; solver failures usually explain themselves last.
fn stderr_excerpt(stderr: &str) -> String {
    const MAX_CHARS: usize = 2000;
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no stderr output".to_string();
    }
    let count = trimmed.chars().count();
    if count <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let tail: String = trimmed.chars().skip(count - MAX_CHARS).collect();
        format!("...{}", tail)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

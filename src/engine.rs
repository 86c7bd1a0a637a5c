//! The operation surface: one [`Engine`] owns the configuration, the pipeline
//! components and the result cache.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::EngineConfig;
use crate::core::{
    EngineError, Failure, OptimizationTarget, ParameterModel, Result, SimulationId,
    SimulationRecord, SimulationStatus, StructureType,
};
use crate::optimization::{ConvergenceState, OptimizationController};
use crate::results::{
    ClearScope, ImpedanceReport, ResultCache, SParameterReport, export, parser, reports,
};
use crate::simulation::{OctaveProcess, ProcessAdapter, ScriptGenerator, SimulationExecutor, run_error};

/// Row of [`Engine::list_simulations`].
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub id: SimulationId,
    pub structure: StructureType,
    pub status: SimulationStatus,
    pub width: f64,
    pub gap: f64,
    pub working_directory: PathBuf,
    pub artifacts: usize,
    pub artifact_bytes: u64,
    pub characteristic_impedance: Option<f64>,
    pub created_at_unix: f64,
    pub elapsed_secs: Option<f64>,
    pub failure: Option<Failure>,
}

impl SimulationSummary {
    fn of(record: &SimulationRecord) -> Self {
        Self {
            id: record.id.clone(),
            structure: record.parameters.structure,
            status: record.status,
            width: record.parameters.geometry.width,
            gap: record.parameters.geometry.gap,
            working_directory: record.working_directory.clone(),
            artifacts: record.artifacts.len(),
            artifact_bytes: record.artifact_bytes(),
            characteristic_impedance: record
                .result
                .as_ref()
                .map(|r| r.metrics.characteristic_impedance),
            created_at_unix: unix_secs(record.created_at),
            elapsed_secs: record.diagnostics.elapsed_secs,
            failure: record.diagnostics.failure.clone(),
        }
    }
}

/// Run timeout from fractional seconds, as the bindings receive it.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(EngineError::invalid("timeout", format!("must be > 0 (got {})", secs)));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| EngineError::invalid("timeout", format!("{} ({} s)", e, secs)))
}

fn unix_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub solver_executable: String,
    pub solver_available: bool,
    pub solver_version: Option<String>,
    pub solver_error: Option<String>,
    pub work_root: PathBuf,
    pub cached_simulations: usize,
    pub cache_capacity: usize,
    pub artifact_bytes: u64,
}

pub struct Engine {
    config: EngineConfig,
    generator: ScriptGenerator,
    executor: SimulationExecutor,
    cache: ResultCache,
}

impl Engine {
    /// Engine driving Octave as configured.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let process = OctaveProcess::from_config(&config.solver);
        Self::with_process(config, Box::new(process))
    }

    /// Engine with configuration from `$EMSIM_CONFIG` or `./emsim.yaml`.
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::load()?)
    }

    /// Engine running scripts through a caller-supplied adapter.
    pub fn with_process(config: EngineConfig, process: Box<dyn ProcessAdapter>) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            work_root = %config.work_root.display(),
            max_simulations = config.cache.max_simulations,
            "engine configured"
        );
        Ok(Self {
            generator: ScriptGenerator::from_config(&config),
            executor: SimulationExecutor::new(process),
            cache: ResultCache::from_config(&config.cache),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn record(&self, id: &str) -> Result<&SimulationRecord> {
        self.cache.get(id)
    }

    /// Parameters of `structure` as configured, over the default sweep.
    pub fn default_parameters(&self, structure: StructureType) -> ParameterModel {
        ParameterModel::from_defaults(
            structure,
            self.config.structures.get(structure),
            self.config.default_sweep.clone(),
        )
    }

    /// Validate `parameters`, generate the script and cache a pending record.
    pub fn create_simulation(&mut self, parameters: ParameterModel, name: Option<&str>) -> Result<SimulationId> {
        let id = match name {
            Some(name) => SimulationId::new(name)?,
            None => SimulationId::generate(),
        };
        if self
            .cache
            .get(id.as_str())
            .is_ok_and(|r| r.status == SimulationStatus::Running)
        {
            return Err(EngineError::invalid("name", format!("simulation `{}` is running", id)));
        }

        let script = self.generator.generate(&parameters, id.as_str())?;
        tracing::info!(
            simulation = %id,
            structure = %parameters.structure,
            script_bytes = script.len(),
            "simulation created"
        );
        let dir = self.config.work_root.join(id.as_str());
        let record = SimulationRecord::pending(id.clone(), parameters, script, dir);
        self.cache.put(record);
        Ok(id)
    }

    /// Run a created simulation and parse its output.
    ///
    /// The final record is cached before any run error is returned.
    pub fn run_simulation(&mut self, id: &str, timeout: Option<Duration>) -> Result<&SimulationRecord> {
        let timeout = timeout.unwrap_or_else(|| self.config.run_timeout());
        if timeout.is_zero() {
            return Err(EngineError::invalid("timeout", "must be > 0"));
        }
        let (sim_id, parameters, script, dir) = {
            let record = self.cache.get(id)?;
            (
                record.id.clone(),
                record.parameters.clone(),
                record.script.clone(),
                record.working_directory.clone(),
            )
        };

        let mut record = self.executor.execute(&sim_id, &parameters, &script, &dir, timeout);
        parser::attach(&mut record);
        let error = run_error(&record, timeout);
        self.cache.put(record);

        if let Some(err) = error {
            tracing::warn!(simulation = %sim_id, error = %err, "simulation did not complete");
            return Err(err);
        }
        self.cache.get(sim_id.as_str())
    }

    pub fn extract_s_parameters(&self, id: &str) -> Result<SParameterReport> {
        let record = self.cache.get(id)?;
        let set = parsed(record)?;
        reports::s_parameter_report(&record.id, set)
    }

    pub fn analyze_impedance(&self, id: &str, target_impedance: f64) -> Result<ImpedanceReport> {
        let record = self.cache.get(id)?;
        let set = parsed(record)?;
        reports::impedance_report(&record.id, set, target_impedance)
    }

    pub fn export_results(&self, id: &str, format: &str) -> Result<Vec<u8>> {
        export::export(&self.cache, id, format)
    }

    pub fn export_to_file(&self, id: &str, format: &str, path: Option<&Path>) -> Result<PathBuf> {
        export::export_to_file(&self.cache, id, format, path)
    }

    pub fn list_simulations(&self) -> Vec<SimulationSummary> {
        self.cache.list().map(SimulationSummary::of).collect()
    }

    pub fn clear_cache(&mut self, scope: ClearScope) -> Result<usize> {
        self.cache.clear(scope)
    }

    /// Optimize with the configured controls and strategy.
    ///
    /// `max_iterations` and `tolerance` fall back to the configuration.
    pub fn optimize(
        &mut self,
        initial: &ParameterModel,
        target: &OptimizationTarget,
        max_iterations: Option<usize>,
        tolerance: Option<f64>,
    ) -> Result<ConvergenceState> {
        let max_iterations = max_iterations.unwrap_or(self.config.optimization.max_iterations);
        let tolerance = tolerance.or(self.config.optimization.tolerance);
        self.optimizer().optimize(initial, target, max_iterations, tolerance)
    }

    /// Controller over this engine's pipeline, for custom controls or callbacks.
    pub fn optimizer(&mut self) -> OptimizationController<'_> {
        OptimizationController::new(&self.generator, &self.executor, &mut self.cache, &self.config)
    }

    pub fn status(&self) -> EngineStatus {
        let probe = self.executor.process().probe();
        if let Err(e) = &probe {
            tracing::warn!(executable = %self.config.solver.executable, error = %e, "solver probe failed");
        }
        EngineStatus {
            solver_executable: self.config.solver.executable.clone(),
            solver_available: probe.is_ok(),
            solver_error: probe.as_ref().err().map(|e| e.to_string()),
            solver_version: probe.ok(),
            work_root: self.config.work_root.clone(),
            cached_simulations: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            artifact_bytes: self.cache.total_artifact_bytes(),
        }
    }
}

fn parsed(record: &SimulationRecord) -> Result<&crate::core::SParameterSet> {
    record.result.as_ref().ok_or_else(|| EngineError::NotFound {
        id: record.id.to_string(),
        what: "parsed result",
    })
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::callback::{LoggingCallback, OptimizationCallback};
use super::state::{ConvergenceState, IterationRecord, TerminationReason};
use super::strategy::{StrategyKind, Stepper};
use crate::config::EngineConfig;
use crate::core::{
    ControlledParameter, EngineError, Failure, OptimizationTarget, ParameterModel, Result,
    SParameterSet, SimulationId, Stage, validate_controls,
};
use crate::results::{ResultCache, parser};
use crate::simulation::{ScriptGenerator, SimulationExecutor};

/// Closed loop of generate, execute, parse and adjust until a metric hits its target.
///
/// Borrows the pipeline components; every run is stored in the cache like a
/// manually started simulation.
pub struct OptimizationController<'a> {
    generator: &'a ScriptGenerator,
    executor: &'a SimulationExecutor,
    cache: &'a mut ResultCache,
    controls: Vec<ControlledParameter>,
    strategy: StrategyKind,
    run_timeout: Duration,
    work_root: PathBuf,
    callback: Box<dyn OptimizationCallback + 'a>,
}

impl<'a> OptimizationController<'a> {
    pub fn new(
        generator: &'a ScriptGenerator,
        executor: &'a SimulationExecutor,
        cache: &'a mut ResultCache,
        config: &EngineConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            cache,
            controls: config.optimization.parameters.clone(),
            strategy: config.optimization.strategy,
            run_timeout: config.run_timeout(),
            work_root: config.work_root.clone(),
            callback: Box::new(LoggingCallback::new()),
        }
    }

    pub fn with_controls(mut self, controls: Vec<ControlledParameter>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn OptimizationCallback + 'a>) -> Self {
        self.callback = callback;
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Drive `initial` toward `target`.
    ///
    /// Invalid inputs are returned as errors before any simulation runs. Once
    /// the loop starts, run-level failures end it in `simulation_failure` and
    /// the state is returned normally. At least one simulation always runs.
    pub fn optimize(
        &mut self,
        initial: &ParameterModel,
        target: &OptimizationTarget,
        max_iterations: usize,
        tolerance: Option<f64>,
    ) -> Result<ConvergenceState> {
        target.validate()?;
        if let Some(tol) = tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(EngineError::invalid("tolerance", "must be > 0"));
            }
        }
        initial.validate()?;
        validate_controls(&self.controls, initial)?;

        let tolerance = tolerance.unwrap_or_else(|| target.tolerance.resolve(target.target_value));
        let budget = max_iterations.max(1);
        let run_tag = SimulationId::generate_with_prefix("opt");
        let span = tracing::info_span!("optimize", run = %run_tag, metric = %target.metric);
        let _enter = span.enter();

        let mut stepper = Stepper::new(self.controls.clone(), self.strategy);
        tracing::info!(
            target_value = target.target_value,
            tolerance,
            budget,
            strategy = stepper.strategy_name(),
            "optimization started"
        );
        let mut state = ConvergenceState::new(initial.clone(), target.clone(), tolerance);

        for iteration in 0..budget {
            let id = SimulationId::new(&format!("{}_{:03}", run_tag, iteration))?;
            let parameters = state.current().clone();
            let outcome = self.evaluate(&id, &parameters);

            let mut record = IterationRecord {
                iteration,
                simulation_id: id,
                parameters,
                metric_value: None,
                error: None,
                constraints_satisfied: false,
                result: None,
            };

            let set = match outcome {
                Ok(set) => set,
                Err(failure) => {
                    state.record(record.clone());
                    self.notify(&record, &state);
                    state.terminate(TerminationReason::SimulationFailure, Some(failure));
                    break;
                }
            };

            let Some(value) = target.metric.evaluate(&set) else {
                record.result = Some(set);
                state.record(record.clone());
                self.notify(&record, &state);
                state.terminate(
                    TerminationReason::SimulationFailure,
                    Some(Failure {
                        stage: Stage::Optimization,
                        message: format!("{} is unavailable for this result", target.metric),
                    }),
                );
                break;
            };

            let error = value - target.target_value;
            record.metric_value = Some(value);
            record.error = Some(error);
            record.constraints_satisfied = target.constraints.iter().all(|c| c.is_satisfied(&set));
            record.result = Some(set);
            let satisfied = record.constraints_satisfied;
            state.record(record.clone());
            self.notify(&record, &state);

            if error.abs() <= tolerance && satisfied {
                state.terminate(TerminationReason::Converged, None);
                break;
            }
            if iteration + 1 >= budget || self.callback.should_stop() {
                state.terminate(TerminationReason::Exhausted, None);
                break;
            }
            state.advance(stepper.propose(state.current(), error));
        }

        self.callback.on_finish(&state);
        Ok(state)
    }

    fn notify(&mut self, record: &IterationRecord, state: &ConvergenceState) {
        self.callback.on_iteration(record, state);
    }

    /// One generate/execute/parse round. The record is cached either way.
    fn evaluate(&mut self, id: &SimulationId, parameters: &ParameterModel) -> std::result::Result<SParameterSet, Failure> {
        let script = self.generator.generate(parameters, id.as_str()).map_err(|e| Failure {
            stage: Stage::ScriptGeneration,
            message: e.to_string(),
        })?;

        let dir = self.work_root.join(id.as_str());
        let mut record = self
            .executor
            .execute(id, parameters, &script, &dir, self.run_timeout);
        parser::attach(&mut record);

        let outcome = match (&record.result, &record.diagnostics.failure) {
            (Some(set), _) => Ok(set.clone()),
            (None, Some(failure)) => Err(failure.clone()),
            (None, None) => Err(Failure {
                stage: Stage::Execution,
                message: format!("run ended as {} without a result", record.status),
            }),
        };
        self.cache.put(record);
        outcome
    }
}

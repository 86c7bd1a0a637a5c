use super::state::{ConvergenceState, IterationRecord};

/// Progress hooks for an optimization run.
pub trait OptimizationCallback {
    /// Called after every simulation, with the record already in `state`'s history.
    fn on_iteration(&mut self, record: &IterationRecord, state: &ConvergenceState);

    /// Checked after each non-converged iteration; `true` ends the run as exhausted.
    fn should_stop(&self) -> bool {
        false
    }

    fn on_finish(&mut self, _state: &ConvergenceState) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingCallback {
    iterations: usize,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl OptimizationCallback for LoggingCallback {
    fn on_iteration(&mut self, record: &IterationRecord, state: &ConvergenceState) {
        self.iterations += 1;
        let target = state.target();
        match (record.metric_value, record.error) {
            (Some(value), Some(error)) => tracing::info!(
                iteration = record.iteration,
                simulation = %record.simulation_id,
                metric = %target.metric,
                value,
                target_value = target.target_value,
                error,
                tolerance = state.tolerance(),
                width = record.parameters.geometry.width,
                gap = record.parameters.geometry.gap,
                "optimization iteration"
            ),
            _ => tracing::warn!(
                iteration = record.iteration,
                simulation = %record.simulation_id,
                metric = %target.metric,
                "iteration produced no metric"
            ),
        }
    }

    fn on_finish(&mut self, state: &ConvergenceState) {
        let reason = state.termination().map(|r| r.as_str()).unwrap_or("running");
        match state.best() {
            Some(best) => tracing::info!(
                reason,
                iterations = state.history().len(),
                best_iteration = best.iteration,
                best_error = state.best_error(),
                best_simulation = %best.simulation_id,
                "optimization finished"
            ),
            None => tracing::info!(reason, iterations = state.history().len(), "optimization finished"),
        }
        if let Some(failure) = state.failure() {
            tracing::warn!(stage = %failure.stage, message = %failure.message, "optimization stopped on failure");
        }
    }
}

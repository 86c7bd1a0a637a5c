use serde::Serialize;

use crate::core::{Failure, OptimizationTarget, ParameterModel, SParameterSet, SimulationId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    Exhausted,
    SimulationFailure,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::SimulationFailure => "simulation_failure",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulation run inside an optimization.
#[derive(Clone, Debug, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub simulation_id: SimulationId,
    pub parameters: ParameterModel,
    pub metric_value: Option<f64>,
    /// `metric - target`, when the metric could be computed.
    pub error: Option<f64>,
    pub constraints_satisfied: bool,
    #[serde(skip)]
    pub result: Option<SParameterSet>,
}

/// Progress of one `optimize` call.
///
/// Only the controller mutates it; once terminated it is frozen and further
/// updates are ignored.
#[derive(Clone, Debug, Serialize)]
pub struct ConvergenceState {
    target: OptimizationTarget,
    tolerance: f64,
    iteration: usize,
    current: ParameterModel,
    best_error: Option<f64>,
    best_iteration: Option<usize>,
    history: Vec<IterationRecord>,
    termination: Option<TerminationReason>,
    failure: Option<Failure>,
}

impl ConvergenceState {
    pub(crate) fn new(initial: ParameterModel, target: OptimizationTarget, tolerance: f64) -> Self {
        Self {
            target,
            tolerance,
            iteration: 0,
            current: initial,
            best_error: None,
            best_iteration: None,
            history: Vec::new(),
            termination: None,
            failure: None,
        }
    }

    pub fn target(&self) -> &OptimizationTarget {
        &self.target
    }

    /// Tolerance in metric units, after resolving overrides and relative tolerances.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Parameters of the run in progress, or of the last run once terminated.
    pub fn current(&self) -> &ParameterModel {
        &self.current
    }

    /// Smallest |error| seen so far.
    pub fn best_error(&self) -> Option<f64> {
        self.best_error
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn best(&self) -> Option<&IterationRecord> {
        self.best_iteration.and_then(|i| self.history.get(i))
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn is_converged(&self) -> bool {
        self.termination == Some(TerminationReason::Converged)
    }

    pub(crate) fn record(&mut self, record: IterationRecord) {
        if self.is_terminated() {
            tracing::warn!(iteration = record.iteration, "ignoring iteration after termination");
            return;
        }
        if let Some(error) = record.error.map(f64::abs) {
            if self.best_error.is_none_or(|best| error < best) {
                self.best_error = Some(error);
                self.best_iteration = Some(self.history.len());
            }
        }
        self.history.push(record);
    }

    pub(crate) fn advance(&mut self, next: ParameterModel) {
        if self.is_terminated() {
            return;
        }
        self.iteration += 1;
        self.current = next;
    }

    pub(crate) fn terminate(&mut self, reason: TerminationReason, failure: Option<Failure>) {
        if self.is_terminated() {
            return;
        }
        self.termination = Some(reason);
        self.failure = failure;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stage;

    fn iteration(i: usize, error: Option<f64>) -> IterationRecord {
        IterationRecord {
            iteration: i,
            simulation_id: SimulationId::new(&format!("it_{i}")).unwrap(),
            parameters: ParameterModel::default(),
            metric_value: error.map(|e| 50.0 + e),
            error,
            constraints_satisfied: true,
            result: None,
        }
    }

    fn state() -> ConvergenceState {
        ConvergenceState::new(ParameterModel::default(), OptimizationTarget::impedance(50.0, 1.0), 1.0)
    }

    #[test]
    fn tracks_best_absolute_error() {
        let mut s = state();
        s.record(iteration(0, Some(8.0)));
        s.advance(ParameterModel::default());
        s.record(iteration(1, Some(-3.0)));
        s.advance(ParameterModel::default());
        s.record(iteration(2, Some(4.0)));
        assert_eq!(s.best_error(), Some(3.0));
        assert_eq!(s.best_iteration(), Some(1));
        assert_eq!(s.best().unwrap().simulation_id.as_str(), "it_1");
        assert_eq!(s.iteration(), 2);
    }

    #[test]
    fn frozen_after_termination() {
        let mut s = state();
        s.record(iteration(0, None));
        s.terminate(
            TerminationReason::SimulationFailure,
            Some(Failure {
                stage: Stage::Execution,
                message: "timed out".into(),
            }),
        );
        s.record(iteration(1, Some(0.0)));
        s.advance(ParameterModel::cpw(1.0, 1.0));
        s.terminate(TerminationReason::Converged, None);

        assert_eq!(s.history().len(), 1);
        assert_eq!(s.iteration(), 0);
        assert_eq!(s.termination(), Some(TerminationReason::SimulationFailure));
        assert_eq!(s.failure().unwrap().stage, Stage::Execution);
    }

    #[test]
    fn serializes_reason_in_snake_case() {
        let mut s = state();
        s.terminate(TerminationReason::SimulationFailure, None);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["termination"], "simulation_failure");
    }
}

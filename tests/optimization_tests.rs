mod common;

use common::{Behavior, harness, line_impedance};
use emsim_optimizer::core::{
    ControlledParameter, OptimizationTarget, ParameterKey, ParameterModel, SimulationStatus, Stage,
    TargetMetric, Tolerance,
};
use emsim_optimizer::optimization::{
    ConvergenceState, IterationRecord, OptimizationCallback, StrategyKind, TerminationReason,
};
use emsim_optimizer::EngineError;

fn initial(width: f64) -> ParameterModel {
    ParameterModel::cpw(width, 6.0).with_sweep(1e9, 20e9, 201)
}

#[test]
fn matched_design_converges_immediately() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimize(&initial(10.0), &OptimizationTarget::impedance(50.0, 2.5), Some(10), None)
        .unwrap();

    assert_eq!(state.termination(), Some(TerminationReason::Converged));
    assert_eq!(state.history().len(), 1);
    let best = state.best().unwrap();
    let z = best.metric_value.unwrap();
    assert!((z - 50.0).abs() <= 2.5);
    let set = best.result.as_ref().unwrap();
    assert!((set.impedance[set.midpoint_index()].norm() - 50.0).abs() <= 2.5);
    assert_eq!(h.solver.calls(), 1);
}

#[test]
fn narrow_line_is_widened_until_on_target() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimize(&initial(4.0), &OptimizationTarget::impedance(50.0, 2.5), Some(10), None)
        .unwrap();

    assert!(state.is_converged());
    let widths: Vec<f64> = state.history().iter().map(|r| r.parameters.geometry.width).collect();
    assert_eq!(widths, vec![4.0, 6.0, 8.0, 10.0]);
    assert!(state.history()[0].error.unwrap() > 2.5);
    assert_eq!(state.best_iteration(), Some(3));
    // Every iteration is cached like a regular simulation.
    assert_eq!(h.engine.list_simulations().len(), 4);
}

#[test]
fn unreachable_target_exhausts_within_budget() {
    for max_iterations in [0usize, 1, 3, 5] {
        let mut h = harness(Behavior::Line);
        let state = h
            .engine
            .optimize(&initial(10.0), &OptimizationTarget::impedance(20.0, 0.5), Some(max_iterations), None)
            .unwrap();
        assert_eq!(state.termination(), Some(TerminationReason::Exhausted));
        assert!(h.solver.calls() <= max_iterations + 1);
        assert_eq!(h.solver.calls(), max_iterations.max(1));
        assert_eq!(state.history().len(), h.solver.calls());
    }
}

#[test]
fn width_stops_at_its_bound() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimizer()
        .with_controls(vec![ControlledParameter::new(ParameterKey::Width, 1.0, 12.0, 4.0)])
        .optimize(&initial(10.0), &OptimizationTarget::impedance(30.0, 1.0), 4, None)
        .unwrap();
    let widths: Vec<f64> = state.history().iter().map(|r| r.parameters.geometry.width).collect();
    assert_eq!(widths, vec![10.0, 12.0, 12.0, 12.0]);
    assert_eq!(state.termination(), Some(TerminationReason::Exhausted));
}

#[test]
fn timeout_ends_in_simulation_failure() {
    let mut h = harness(Behavior::TimeOut);
    let state = h
        .engine
        .optimize(&initial(10.0), &OptimizationTarget::impedance(50.0, 2.5), Some(10), None)
        .unwrap();

    assert_eq!(state.termination(), Some(TerminationReason::SimulationFailure));
    assert_eq!(state.failure().unwrap().stage, Stage::Execution);
    assert_eq!(state.history().len(), 1);
    assert!(state.history()[0].error.is_none());
    let id = state.history()[0].simulation_id.as_str();
    assert_eq!(h.engine.record(id).unwrap().status, SimulationStatus::TimedOut);
}

#[test]
fn solver_error_ends_in_simulation_failure() {
    let mut h = harness(Behavior::Exit {
        code: 2,
        stderr: "license".into(),
    });
    let state = h
        .engine
        .optimize(&initial(10.0), &OptimizationTarget::impedance(50.0, 2.5), Some(3), None)
        .unwrap();
    assert_eq!(state.termination(), Some(TerminationReason::SimulationFailure));
    assert_eq!(h.solver.calls(), 1);
}

#[test]
fn missing_resonance_ends_in_simulation_failure() {
    let mut h = harness(Behavior::Line);
    let target = OptimizationTarget::new(TargetMetric::ResonantFrequency, 5e9, Tolerance::Relative(0.01));
    let state = h.engine.optimize(&initial(10.0), &target, Some(3), None).unwrap();
    assert_eq!(state.termination(), Some(TerminationReason::SimulationFailure));
    let failure = state.failure().unwrap();
    assert_eq!(failure.stage, Stage::Optimization);
    assert!(failure.message.contains("resonant_frequency"));
}

#[test]
fn ideal_match_reads_as_a_finite_return_loss() {
    let mut h = harness(Behavior::Line);
    let target = OptimizationTarget::new(TargetMetric::ReturnLossDb, 40.0, Tolerance::Absolute(1.0));
    let state = h.engine.optimize(&initial(10.0), &target, Some(1), None).unwrap();

    assert_eq!(state.termination(), Some(TerminationReason::Exhausted));
    assert!(state.failure().is_none());
    let return_loss = state.history()[0].metric_value.unwrap();
    assert!(return_loss.is_finite());
    assert!(return_loss >= 299.0);
}

#[test]
fn relative_tolerance_needs_a_non_zero_target() {
    let mut h = harness(Behavior::Line);
    let target = OptimizationTarget::new(TargetMetric::ReturnLossDb, 0.0, Tolerance::Relative(0.1));
    let err = h.engine.optimize(&initial(10.0), &target, Some(3), None).unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter { .. }));
    assert_eq!(h.solver.calls(), 0);
}

#[test]
fn tolerance_override_must_be_positive() {
    let mut h = harness(Behavior::Line);
    let err = h
        .engine
        .optimize(&initial(10.0), &OptimizationTarget::impedance(50.0, 2.5), Some(3), Some(0.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter { .. }));
    assert_eq!(h.solver.calls(), 0);
}

#[test]
fn tolerance_override_tightens_convergence() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimize(&initial(8.0), &OptimizationTarget::impedance(50.0, 5.0), Some(10), Some(1.0))
        .unwrap();
    assert_eq!(state.tolerance(), 1.0);
    // 8 µm gives ~52.9 Ω, inside ±5 but not ±1.
    assert!(state.history().len() > 1);
    assert!(state.is_converged());
}

#[test]
fn round_robin_alternates_width_and_gap() {
    let mut h = harness(Behavior::Line);
    let controls = vec![
        ControlledParameter::new(ParameterKey::Width, 1.0, 50.0, 2.0),
        ControlledParameter::new(ParameterKey::Gap, 1.0, 50.0, 1.0),
    ];
    let state = h
        .engine
        .optimizer()
        .with_controls(controls)
        .with_strategy(StrategyKind::RoundRobin)
        .optimize(&initial(10.0), &OptimizationTarget::impedance(40.0, 0.1), 3, None)
        .unwrap();
    let steps: Vec<(f64, f64)> = state
        .history()
        .iter()
        .map(|r| (r.parameters.geometry.width, r.parameters.geometry.gap))
        .collect();
    assert_eq!(steps, vec![(10.0, 6.0), (12.0, 6.0), (12.0, 5.0)]);
}

struct StopAfter {
    limit: usize,
    seen: usize,
}

impl OptimizationCallback for StopAfter {
    fn on_iteration(&mut self, _record: &IterationRecord, _state: &ConvergenceState) {
        self.seen += 1;
    }

    fn should_stop(&self) -> bool {
        self.seen >= self.limit
    }
}

#[test]
fn callback_can_stop_early() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimizer()
        .with_callback(Box::new(StopAfter { limit: 2, seen: 0 }))
        .optimize(&initial(10.0), &OptimizationTarget::impedance(20.0, 0.5), 10, None)
        .unwrap();
    assert_eq!(state.termination(), Some(TerminationReason::Exhausted));
    assert_eq!(state.history().len(), 2);
}

#[test]
fn state_serializes_for_reporting() {
    let mut h = harness(Behavior::Line);
    let state = h
        .engine
        .optimize(&initial(6.0), &OptimizationTarget::impedance(50.0, 2.5), Some(10), None)
        .unwrap();
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["termination"], "converged");
    let history = json["history"].as_array().unwrap();
    assert_eq!(history.len(), state.history().len());
    assert!(history[0].get("result").is_none());
    let first_z = history[0]["metric_value"].as_f64().unwrap();
    assert!((first_z - line_impedance(6.0, 6.0)).abs() < 1e-6);
}

use serde::{Deserialize, Serialize};

use crate::core::{ControlledParameter, ParameterKey, ParameterModel};

/// Which controlled parameters move on each iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Every controlled parameter moves each iteration.
    #[default]
    Joint,
    /// One parameter per iteration, cycling through them in order.
    RoundRobin,
}

/// Picks the parameters to adjust on a given iteration.
pub trait Strategy {
    fn name(&self) -> &str;

    /// Indices into the controlled-parameter list to move this time.
    fn select(&mut self, count: usize) -> Vec<usize>;
}

pub struct Joint;

impl Strategy for Joint {
    fn name(&self) -> &str {
        "joint"
    }

    fn select(&mut self, count: usize) -> Vec<usize> {
        (0..count).collect()
    }
}

#[derive(Default)]
pub struct RoundRobin {
    next: usize,
}

impl Strategy for RoundRobin {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn select(&mut self, count: usize) -> Vec<usize> {
        if count == 0 {
            return Vec::new();
        }
        let picked = self.next % count;
        self.next = picked + 1;
        vec![picked]
    }
}

pub fn select_strategy(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Joint => Box::new(Joint),
        StrategyKind::RoundRobin => Box::new(RoundRobin::default()),
    }
}

/// Step bookkeeping for one controlled parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepState {
    pub key: ParameterKey,
    pub step: f64,
    /// Error sign seen the last time this parameter moved.
    pub last_error_sign: Option<f64>,
}

/// Sign-driven stepping with bisection refinement.
///
/// A parameter moves by `-sign(error) * sensitivity * step`, clamped to its
/// bounds; its step halves (down to `min_step`) each time the error sign
/// flips relative to its previous move.
pub struct Stepper {
    controls: Vec<ControlledParameter>,
    states: Vec<StepState>,
    strategy: Box<dyn Strategy>,
}

impl Stepper {
    pub fn new(controls: Vec<ControlledParameter>, kind: StrategyKind) -> Self {
        let states = controls
            .iter()
            .map(|c| StepState {
                key: c.key,
                step: c.initial_step,
                last_error_sign: None,
            })
            .collect();
        Self {
            controls,
            states,
            strategy: select_strategy(kind),
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn states(&self) -> &[StepState] {
        &self.states
    }

    /// Parameters for the next run, given the signed error of the current one.
    pub fn propose(&mut self, current: &ParameterModel, error: f64) -> ParameterModel {
        let mut next = current.clone();
        if error == 0.0 || !error.is_finite() {
            return next;
        }
        let sign = error.signum();

        for index in self.strategy.select(self.controls.len()) {
            let control = &self.controls[index];
            let state = &mut self.states[index];

            if state.last_error_sign.is_some_and(|previous| previous != sign) {
                state.step = (state.step / 2.0).max(control.min_step);
            }
            state.last_error_sign = Some(sign);

            let value = control.key.get(current);
            let moved = control.clamp(value - sign * control.sensitivity.sign() * state.step);
            tracing::trace!(
                parameter = control.key.field_path(),
                from = value,
                to = moved,
                step = state.step,
                "adjusting"
            );
            control.key.set(&mut next, moved);
        }
        next
    }
}

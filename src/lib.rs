//! Closed-loop openEMS characterization of superconducting transmission lines.
//!
//! Parameters go through [`simulation::ScriptGenerator`] into an Octave
//! script, [`simulation::SimulationExecutor`] runs it, [`results`] parses,
//! caches and exports what the solver wrote, and
//! [`optimization::OptimizationController`] repeats the loop until a metric
//! such as the characteristic impedance hits its target. [`Engine`] wraps it
//! all behind one operation surface.

pub mod config;
pub mod core;
pub mod engine;
pub mod observe;
pub mod optimization;
pub mod results;
pub mod simulation;

#[cfg(feature = "python")]
mod python;

pub use crate::config::EngineConfig;
pub use crate::core::*;
pub use crate::engine::{Engine, EngineStatus, SimulationSummary};
pub use crate::optimization::{ConvergenceState, OptimizationController, TerminationReason};
pub use crate::results::{ClearScope, ExportFormat, ResultCache};

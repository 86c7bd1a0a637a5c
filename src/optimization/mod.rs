pub mod callback;
pub mod controller;
pub mod state;
pub mod strategy;

pub use callback::{LoggingCallback, OptimizationCallback};
pub use controller::OptimizationController;
pub use state::{ConvergenceState, IterationRecord, TerminationReason};
pub use strategy::{StrategyKind, Stepper, Strategy, select_strategy};

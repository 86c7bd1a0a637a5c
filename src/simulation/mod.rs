pub mod executor;
pub mod process;
pub mod script;

pub use executor::{SimulationExecutor, collect_artifacts, run_error};
pub use process::{OctaveProcess, ProcessAdapter, ProcessOutcome};
pub use script::ScriptGenerator;

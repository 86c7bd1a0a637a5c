pub mod error;
pub mod types;
pub mod validation;

pub use error::{EngineError, Result, Stage};
pub use types::*;
pub use validation::{validate_control_bounds, validate_controls, validate_parameters, validate_target};

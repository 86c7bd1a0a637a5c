pub mod cache;
pub mod export;
pub mod metrics;
pub mod parser;
pub mod reports;
pub mod touchstone;

pub use cache::{ClearScope, ResultCache};
pub use export::{ExportFormat, export, export_record, export_to_file};
pub use parser::{attach, parse};
pub use reports::{ImpedanceReport, SParameterReport, impedance_report, s_parameter_report};
pub use touchstone::{TwoPort, read_touchstone, write_touchstone};

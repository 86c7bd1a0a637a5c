//! Python bindings. Payloads cross the boundary as JSON strings.

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::core::{EngineError, OptimizationTarget, ParameterModel, SimulationId, StructureType};
use crate::engine;
use crate::observe::{LogConfig, LogLevel, init_logging};
use crate::results::ClearScope;

fn to_py(err: EngineError) -> PyErr {
    let message = err.to_string();
    match err {
        EngineError::InvalidParameter { .. }
        | EngineError::UnsupportedFormat(_)
        | EngineError::Import(_)
        | EngineError::Config(_) => PyValueError::new_err(message),
        EngineError::NotFound { .. } => PyKeyError::new_err(message),
        EngineError::Timeout { .. } => PyTimeoutError::new_err(message),
        _ => PyRuntimeError::new_err(message),
    }
}

fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(what: &str, text: &str) -> PyResult<T> {
    serde_json::from_str(text).map_err(|e| PyValueError::new_err(format!("invalid {}: {}", what, e)))
}

#[pyclass(name = "Engine", unsendable)]
pub struct PyEngine {
    inner: engine::Engine,
}

#[pymethods]
impl PyEngine {
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<PathBuf>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load_from(&path),
            None => EngineConfig::load(),
        }
        .map_err(to_py)?;
        let inner = engine::Engine::new(config).map_err(to_py)?;
        Ok(Self { inner })
    }

    /// Parameters default to the configured ones for `structure`.
    #[pyo3(signature = (parameters=None, structure="cpw", name=None))]
    fn create_simulation(
        &mut self,
        parameters: Option<&str>,
        structure: &str,
        name: Option<&str>,
    ) -> PyResult<String> {
        let model: ParameterModel = match parameters {
            Some(json) => from_json("parameters", json)?,
            None => self.inner.default_parameters(parse_structure(structure)?),
        };
        let id = self.inner.create_simulation(model, name).map_err(to_py)?;
        Ok(id.to_string())
    }

    #[pyo3(signature = (simulation_id, timeout_secs=None))]
    fn run_simulation(&mut self, simulation_id: &str, timeout_secs: Option<f64>) -> PyResult<String> {
        let timeout = timeout_secs
            .map(engine::timeout_from_secs)
            .transpose()
            .map_err(to_py)?;
        self.inner.run_simulation(simulation_id, timeout).map_err(to_py)?;
        let summary = self
            .inner
            .list_simulations()
            .into_iter()
            .find(|s| s.id.as_str() == simulation_id);
        to_json(&summary)
    }

    fn extract_s_parameters(&self, simulation_id: &str) -> PyResult<String> {
        to_json(&self.inner.extract_s_parameters(simulation_id).map_err(to_py)?)
    }

    #[pyo3(signature = (simulation_id, target_impedance=50.0))]
    fn analyze_impedance(&self, simulation_id: &str, target_impedance: f64) -> PyResult<String> {
        to_json(&self.inner.analyze_impedance(simulation_id, target_impedance).map_err(to_py)?)
    }

    fn export_results(&self, simulation_id: &str, format: &str) -> PyResult<String> {
        let bytes = self.inner.export_results(simulation_id, format).map_err(to_py)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    #[pyo3(signature = (simulation_id, format="touchstone", path=None))]
    fn export_to_file(&self, simulation_id: &str, format: &str, path: Option<PathBuf>) -> PyResult<String> {
        let written = self
            .inner
            .export_to_file(simulation_id, format, path.as_deref())
            .map_err(to_py)?;
        Ok(written.display().to_string())
    }

    fn list_simulations(&self) -> PyResult<String> {
        to_json(&self.inner.list_simulations())
    }

    /// Clears one simulation, or everything when no id is given.
    #[pyo3(signature = (simulation_id=None))]
    fn clear_cache(&mut self, simulation_id: Option<&str>) -> PyResult<usize> {
        let scope = match simulation_id {
            Some(id) => ClearScope::Id(SimulationId::new(id).map_err(to_py)?),
            None => ClearScope::All,
        };
        self.inner.clear_cache(scope).map_err(to_py)
    }

    #[pyo3(signature = (initial, target, max_iterations=None, tolerance=None))]
    fn optimize(
        &mut self,
        initial: &str,
        target: &str,
        max_iterations: Option<usize>,
        tolerance: Option<f64>,
    ) -> PyResult<String> {
        let initial: ParameterModel = from_json("initial parameters", initial)?;
        let target: OptimizationTarget = from_json("target", target)?;
        let state = self
            .inner
            .optimize(&initial, &target, max_iterations, tolerance)
            .map_err(to_py)?;
        to_json(&state)
    }

    fn status(&self) -> PyResult<String> {
        to_json(&self.inner.status())
    }

    #[pyo3(signature = (structure="cpw"))]
    fn default_parameters(&self, structure: &str) -> PyResult<String> {
        to_json(&self.inner.default_parameters(parse_structure(structure)?))
    }
}

fn parse_structure(name: &str) -> PyResult<StructureType> {
    name.parse::<StructureType>().map_err(to_py)
}

#[pyfunction]
#[pyo3(signature = (level="info"))]
fn setup_logging(level: &str) -> PyResult<()> {
    let level: LogLevel = serde_json::from_value(serde_json::Value::String(level.to_ascii_lowercase()))
        .map_err(|_| PyValueError::new_err(format!("unknown log level {:?}", level)))?;
    init_logging(&LogConfig {
        level,
        ..LogConfig::default()
    });
    Ok(())
}

#[pymodule]
fn emsim_optimizer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyEngine>()?;
    m.add_function(wrap_pyfunction!(setup_logging, m)?)?;
    Ok(())
}

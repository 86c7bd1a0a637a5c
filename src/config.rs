//! # Engine configuration
//!
//! YAML configuration for the simulation engine. Every field has a default, so
//! an empty file (or none at all) gives a working setup.
//!
//! ## Search path
//!
//! 1. Path in the `EMSIM_CONFIG` environment variable
//! 2. `./emsim.yaml`
//!
//! ## Example
//!
//! ```yaml
//! solver:
//!   executable: octave-cli
//!   openems_matlab_path: /opt/openEMS/share/openEMS/matlab
//! run_timeout_secs: 600
//! cache:
//!   max_simulations: 16
//!   cleanup_threshold_bytes: 2000000000
//! optimization:
//!   max_iterations: 15
//!   strategy: round_robin
//!   parameters:
//!     - { key: width, min_val: 2, max_val: 40, initial_step: 2, min_step: 0.05, sensitivity: decreasing }
//!     - { key: gap, min_val: 2, max_val: 30, initial_step: 1, min_step: 0.05, sensitivity: increasing }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{
    BoundaryCondition, BoundaryVector, ControlledParameter, EngineError, FrequencySweep,
    ParameterKey, Result, StructureDefaults, StructureType, validate_control_bounds,
};
use crate::observe::LogConfig;
use crate::optimization::StrategyKind;

pub const CONFIG_ENV: &str = "EMSIM_CONFIG";

/// How the numeric environment is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub executable: String,
    /// Arguments; `{script}` is replaced with the script file name.
    pub args: Vec<String>,
    /// Added to the Octave path before the openEMS calls, when set.
    pub openems_matlab_path: Option<String>,
    pub csxcad_matlab_path: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            executable: "octave".to_string(),
            args: ["--no-gui", "--quiet", "--eval", "run('{script}')"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            openems_matlab_path: Some("/usr/share/openEMS/matlab".to_string()),
            csxcad_matlab_path: Some("/usr/share/CSXCAD/matlab".to_string()),
        }
    }
}

/// Defaults per structure. A partial entry is layered over that structure's
/// built-in defaults, field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureTable {
    #[serde(deserialize_with = "coplanar_waveguide_overrides")]
    pub coplanar_waveguide: StructureDefaults,
    #[serde(deserialize_with = "microstrip_overrides")]
    pub microstrip: StructureDefaults,
    #[serde(deserialize_with = "waveguide_overrides")]
    pub waveguide: StructureDefaults,
}

fn coplanar_waveguide_overrides<'de, D>(d: D) -> std::result::Result<StructureDefaults, D::Error>
where
    D: Deserializer<'de>,
{
    overlay_defaults(StructureType::CoplanarWaveguide, d)
}

fn microstrip_overrides<'de, D>(d: D) -> std::result::Result<StructureDefaults, D::Error>
where
    D: Deserializer<'de>,
{
    overlay_defaults(StructureType::Microstrip, d)
}

fn waveguide_overrides<'de, D>(d: D) -> std::result::Result<StructureDefaults, D::Error>
where
    D: Deserializer<'de>,
{
    overlay_defaults(StructureType::Waveguide, d)
}

fn overlay_defaults<'de, D>(
    structure: StructureType,
    d: D,
) -> std::result::Result<StructureDefaults, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Value::deserialize(d)?;
    let mut merged = serde_yaml::to_value(StructureDefaults::for_structure(structure))
        .map_err(D::Error::custom)?;
    merge_value(&mut merged, overrides);
    serde_yaml::from_value(merged).map_err(D::Error::custom)
}

/// Recursively replace the leaves of `base` that `overrides` names.
fn merge_value(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl Default for StructureTable {
    fn default() -> Self {
        Self {
            coplanar_waveguide: StructureDefaults::for_structure(StructureType::CoplanarWaveguide),
            microstrip: StructureDefaults::for_structure(StructureType::Microstrip),
            waveguide: StructureDefaults::for_structure(StructureType::Waveguide),
        }
    }
}

impl StructureTable {
    pub fn get(&self, structure: StructureType) -> &StructureDefaults {
        match structure {
            StructureType::CoplanarWaveguide => &self.coplanar_waveguide,
            StructureType::Microstrip => &self.microstrip,
            StructureType::Waveguide => &self.waveguide,
        }
    }
}

/// Six-face boundary vectors (xmin, xmax, ymin, ymax, zmin, zmax) per structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryPresets {
    pub coplanar_waveguide: BoundaryVector,
    pub microstrip: BoundaryVector,
    pub waveguide: BoundaryVector,
}

impl Default for BoundaryPresets {
    fn default() -> Self {
        use BoundaryCondition::{Mur, Pec, Pml};
        Self {
            coplanar_waveguide: [Mur; 6],
            microstrip: [Pml(8), Pml(8), Mur, Mur, Pec, Mur],
            waveguide: [Pml(8), Pml(8), Pec, Pec, Pec, Pec],
        }
    }
}

impl BoundaryPresets {
    pub fn get(&self, structure: StructureType) -> &BoundaryVector {
        match structure {
            StructureType::CoplanarWaveguide => &self.coplanar_waveguide,
            StructureType::Microstrip => &self.microstrip,
            StructureType::Waveguide => &self.waveguide,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_simulations: usize,
    /// Evict old records while their artifacts exceed this many bytes.
    pub cleanup_threshold_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_simulations: 32,
            cleanup_threshold_bytes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Overrides the target's own tolerance when set.
    pub tolerance: Option<f64>,
    pub max_iterations: usize,
    pub strategy: StrategyKind,
    pub parameters: Vec<ControlledParameter>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            tolerance: None,
            max_iterations: 20,
            strategy: StrategyKind::Joint,
            parameters: vec![
                ControlledParameter::new(ParameterKey::Width, 1.0, 100.0, 2.0).with_min_step(0.01),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub solver: SolverConfig,
    pub run_timeout_secs: u64,
    pub work_root: PathBuf,
    pub default_sweep: FrequencySweep,
    pub structures: StructureTable,
    pub boundary_presets: BoundaryPresets,
    pub cache: CacheConfig,
    pub optimization: OptimizationConfig,
    pub logging: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            run_timeout_secs: 300,
            work_root: PathBuf::from("./octave_simulations"),
            default_sweep: FrequencySweep::default(),
            structures: StructureTable::default(),
            boundary_presets: BoundaryPresets::default(),
            cache: CacheConfig::default(),
            optimization: OptimizationConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `$EMSIM_CONFIG`, then `./emsim.yaml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
            tracing::warn!(path = %path.display(), "{} points at a missing file, ignoring", CONFIG_ENV);
        }

        let local = Path::new("./emsim.yaml");
        if local.exists() {
            return Self::load_from(local);
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and validate a YAML document.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| EngineError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.solver.executable.trim().is_empty() {
            return Err(EngineError::Config("solver.executable must not be empty".into()));
        }
        if !self.solver.args.iter().any(|a| a.contains("{script}")) {
            return Err(EngineError::Config(
                "solver.args must contain a {script} placeholder".into(),
            ));
        }
        if self.run_timeout_secs == 0 {
            return Err(EngineError::Config("run_timeout_secs must be > 0".into()));
        }
        if self.cache.max_simulations == 0 {
            return Err(EngineError::Config("cache.max_simulations must be > 0".into()));
        }
        if let Some(tol) = self.optimization.tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(EngineError::Config(format!(
                    "optimization.tolerance must be > 0 (got {})",
                    tol
                )));
            }
        }
        if self.optimization.parameters.is_empty() {
            return Err(EngineError::Config(
                "optimization.parameters must name at least one parameter".into(),
            ));
        }
        validate_control_bounds(&self.optimization.parameters)
            .map_err(|e| EngineError::Config(e.to_string()))?;

        // Defaults must themselves describe runnable structures.
        for structure in StructureType::ALL {
            let model = crate::core::ParameterModel::from_defaults(
                structure,
                self.structures.get(structure),
                self.default_sweep.clone(),
            );
            model.validate().map_err(|e| {
                EngineError::Config(format!("structures.{}: {}", structure, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run_timeout(), Duration::from_secs(300));
        assert_eq!(config.cache.max_simulations, 32);
        assert_eq!(config.default_sweep.points, 201);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
run_timeout_secs: 60
cache:
  max_simulations: 4
boundary_presets:
  coplanar_waveguide: [PML_8, PML_8, MUR, MUR, PEC, MUR]
"#;
        let config = EngineConfig::parse(yaml).unwrap();
        assert_eq!(config.run_timeout_secs, 60);
        assert_eq!(config.cache.max_simulations, 4);
        assert_eq!(config.solver.executable, "octave");
        assert_eq!(
            config.boundary_presets.coplanar_waveguide[0],
            BoundaryCondition::Pml(8)
        );
    }

    #[test]
    fn empty_document_is_the_default() {
        assert_eq!(EngineConfig::parse("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn zero_cache_size_is_rejected() {
        let err = EngineConfig::parse("cache:\n  max_simulations: 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn args_without_placeholder_are_rejected() {
        let err = EngineConfig::parse("solver:\n  args: [\"--eval\", \"1\"]\n").unwrap_err();
        assert!(err.to_string().contains("{script}"));
    }

    #[test]
    fn invalid_structure_defaults_are_rejected() {
        let yaml = "structures:\n  microstrip:\n    geometry:\n      width: 0\n";
        let err = EngineConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("geometry.width"));
    }

    #[test]
    fn partial_structure_override_keeps_that_structures_defaults() {
        let builtin = StructureTable::default();

        let config = EngineConfig::parse("structures:\n  microstrip:\n    mesh:\n      resolution: 80\n").unwrap();
        let msl = &config.structures.microstrip;
        assert_eq!(msl.mesh.resolution, 80.0);
        assert_eq!(msl.mesh.edge_resolution, builtin.microstrip.mesh.edge_resolution);
        assert_eq!(msl.geometry, builtin.microstrip.geometry);
        assert_eq!(msl.excitation.port_length, 2000.0);

        let config = EngineConfig::parse("structures:\n  waveguide:\n    mesh:\n      resolution: 400\n").unwrap();
        let wg = &config.structures.waveguide;
        assert_eq!(wg.mesh.resolution, 400.0);
        assert_eq!(wg.geometry.width, 10_000.0);
        assert_eq!(wg.material.relative_permittivity, 1.0);
        assert_eq!(wg.mesh.pml_cells, builtin.waveguide.mesh.pml_cells);

        let config = EngineConfig::parse("structures:\n  coplanar_waveguide:\n    geometry:\n      gap: 4\n").unwrap();
        let cpw = &config.structures.coplanar_waveguide;
        assert_eq!(cpw.geometry.gap, 4.0);
        assert_eq!(cpw.geometry.width, builtin.coplanar_waveguide.geometry.width);
        assert_eq!(cpw.material, builtin.coplanar_waveguide.material);
        assert_eq!(config.structures.microstrip, builtin.microstrip);
    }

    #[test]
    fn control_bounds_are_checked_at_load() {
        let yaml = "optimization:\n  parameters:\n    - { key: gap, min_val: 0, max_val: 30, initial_step: 1, min_step: 0.05, sensitivity: increasing }\n";
        let err = EngineConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("min_val"));

        let yaml = "optimization:\n  parameters:\n    - { key: width, min_val: 2, max_val: 40, initial_step: 0.1, min_step: 0.5, sensitivity: decreasing }\n";
        assert!(EngineConfig::parse(yaml).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emsim.yaml");
        let mut config = EngineConfig::default();
        config.run_timeout_secs = 42;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), config);
    }
}

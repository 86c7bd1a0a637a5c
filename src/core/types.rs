use num_complex::Complex64;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::SystemTime;

use super::error::{EngineError, Result, Stage};

// ===== IDENTIFIERS =====

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static pattern"));

/// Simulation identifier. Doubles as the working-directory name and script stem,
/// so it is restricted to `[A-Za-z0-9_-]{1,64}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SimulationId(String);

impl SimulationId {
    pub fn new(raw: &str) -> Result<Self> {
        if ID_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(EngineError::invalid(
                "name",
                format!("must match [A-Za-z0-9_-]{{1,64}} (got {:?})", raw),
            ))
        }
    }

    /// Fresh `sim_xxxxxxxx` identifier.
    pub fn generate() -> Self {
        Self::generate_with_prefix("sim")
    }

    pub fn generate_with_prefix(prefix: &str) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..=u32::MAX);
        Self(format!("{}_{:08x}", prefix, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SimulationId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl Borrow<str> for SimulationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<SimulationId> for String {
    fn from(id: SimulationId) -> Self {
        id.0
    }
}

// ===== ENUMS =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    CoplanarWaveguide,
    Microstrip,
    Waveguide,
}

impl StructureType {
    pub const ALL: [StructureType; 3] = [Self::CoplanarWaveguide, Self::Microstrip, Self::Waveguide];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoplanarWaveguide => "coplanar_waveguide",
            Self::Microstrip => "microstrip",
            Self::Waveguide => "waveguide",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpw" | "coplanar_waveguide" | "coplanar-waveguide" => Ok(Self::CoplanarWaveguide),
            "msl" | "microstrip" => Ok(Self::Microstrip),
            "wg" | "waveguide" => Ok(Self::Waveguide),
            other => Err(EngineError::invalid(
                "structure",
                format!("unknown structure type {:?}", other),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "nm")]
    Nanometer,
    #[default]
    #[serde(rename = "um")]
    Micrometer,
    #[serde(rename = "mm")]
    Millimeter,
}

impl LengthUnit {
    /// Size of one drawing unit in meters.
    pub fn meters(&self) -> f64 {
        match self {
            Self::Nanometer => 1e-9,
            Self::Micrometer => 1e-6,
            Self::Millimeter => 1e-3,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Nanometer => "nm",
            Self::Micrometer => "um",
            Self::Millimeter => "mm",
        }
    }
}

/// openEMS boundary condition for one face of the simulation box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BoundaryCondition {
    Pec,
    Pmc,
    Mur,
    Pml(u8),
}

impl BoundaryCondition {
    pub fn openems_name(&self) -> String {
        match self {
            Self::Pec => "PEC".to_string(),
            Self::Pmc => "PMC".to_string(),
            Self::Mur => "MUR".to_string(),
            Self::Pml(cells) => format!("PML_{}", cells),
        }
    }
}

impl TryFrom<String> for BoundaryCondition {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        let upper = value.trim().to_ascii_uppercase();
        match upper.as_str() {
            "PEC" => Ok(Self::Pec),
            "PMC" => Ok(Self::Pmc),
            "MUR" => Ok(Self::Mur),
            _ => upper
                .strip_prefix("PML_")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|&n| n > 0)
                .map(Self::Pml)
                .ok_or_else(|| {
                    EngineError::invalid(
                        "boundary",
                        format!("expected PEC, PMC, MUR or PML_<cells> (got {:?})", value),
                    )
                }),
        }
    }
}

impl From<BoundaryCondition> for String {
    fn from(bc: BoundaryCondition) -> Self {
        bc.openems_name()
    }
}

/// Boundary vector in openEMS order: xmin, xmax, ymin, ymax, zmin, zmax.
pub type BoundaryVector = [BoundaryCondition; 6];

// ===== PARAMETER MODEL =====

/// Lengths are in the model's [`LengthUnit`].
///
/// For waveguides `width` and `gap` are the broad and narrow wall dimensions
/// and the substrate fields describe the dielectric filling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub width: f64,
    pub gap: f64,
    pub length: f64,
    pub substrate_height: f64,
    pub substrate_width: f64,
    pub metal_thickness: f64,
    pub air_spacing: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 10.0,
            gap: 6.0,
            length: 5000.0,
            substrate_height: 500.0,
            substrate_width: 5000.0,
            metal_thickness: 0.2,
            air_spacing: 2000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub relative_permittivity: f64,
    pub loss_tangent: f64,
    /// Conductor conductivity in S/m; zero renders a perfect electric conductor.
    pub conductivity: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            relative_permittivity: 11.9,
            loss_tangent: 0.0,
            conductivity: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub resolution: f64,
    pub edge_resolution: f64,
    pub pml_cells: [u32; 6],
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            resolution: 40.0,
            edge_resolution: 2.0,
            pml_cells: [8; 6],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Excitation {
    pub reference_impedance: f64,
    pub port_length: f64,
    /// Run a second excitation from port 2 so S12 and S22 are measured too.
    pub excite_both_ports: bool,
}

impl Default for Excitation {
    fn default() -> Self {
        Self {
            reference_impedance: 50.0,
            port_length: 1000.0,
            excite_both_ports: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencySweep {
    pub start: f64,
    pub stop: f64,
    pub points: usize,
}

impl Default for FrequencySweep {
    fn default() -> Self {
        Self {
            start: 1e9,
            stop: 20e9,
            points: 201,
        }
    }
}

impl FrequencySweep {
    pub fn new(start: f64, stop: f64, points: usize) -> Self {
        Self {
            start,
            stop,
            points,
        }
    }

    /// Linearly spaced axis, the same spacing Octave's `linspace` produces.
    pub fn axis(&self) -> Vec<f64> {
        match self.points {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.stop - self.start) / (n as f64 - 1.0);
                (0..n).map(|i| self.start + step * i as f64).collect()
            }
        }
    }

    pub fn center(&self) -> f64 {
        0.5 * (self.start + self.stop)
    }
}

/// Per-structure defaults for everything except the sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureDefaults {
    pub geometry: Geometry,
    pub material: Material,
    pub mesh: MeshSettings,
    pub excitation: Excitation,
}

impl Default for StructureDefaults {
    fn default() -> Self {
        Self::for_structure(StructureType::CoplanarWaveguide)
    }
}

impl StructureDefaults {
    pub fn for_structure(structure: StructureType) -> Self {
        match structure {
            StructureType::CoplanarWaveguide => Self {
                geometry: Geometry::default(),
                material: Material::default(),
                mesh: MeshSettings::default(),
                excitation: Excitation::default(),
            },
            StructureType::Microstrip => Self {
                geometry: Geometry {
                    width: 300.0,
                    gap: 100.0,
                    length: 10000.0,
                    substrate_height: 500.0,
                    substrate_width: 5000.0,
                    metal_thickness: 0.2,
                    air_spacing: 3000.0,
                },
                material: Material::default(),
                mesh: MeshSettings {
                    resolution: 100.0,
                    edge_resolution: 20.0,
                    pml_cells: [8; 6],
                },
                excitation: Excitation {
                    reference_impedance: 50.0,
                    port_length: 2000.0,
                    excite_both_ports: false,
                },
            },
            StructureType::Waveguide => Self {
                geometry: Geometry {
                    width: 10_000.0,
                    gap: 5_000.0,
                    length: 40_000.0,
                    substrate_height: 5_000.0,
                    substrate_width: 10_000.0,
                    metal_thickness: 0.2,
                    air_spacing: 1000.0,
                },
                material: Material {
                    relative_permittivity: 1.0,
                    loss_tangent: 0.0,
                    conductivity: 0.0,
                },
                mesh: MeshSettings {
                    resolution: 500.0,
                    edge_resolution: 250.0,
                    pml_cells: [8, 8, 0, 0, 0, 0],
                },
                excitation: Excitation {
                    reference_impedance: 50.0,
                    port_length: 5_000.0,
                    excite_both_ports: false,
                },
            },
        }
    }
}

/// Typed description of one full-wave run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterModel {
    pub structure: StructureType,
    #[serde(default)]
    pub unit: LengthUnit,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default)]
    pub material: Material,
    #[serde(default)]
    pub mesh: MeshSettings,
    #[serde(default)]
    pub excitation: Excitation,
    #[serde(default)]
    pub sweep: FrequencySweep,
}

impl Default for ParameterModel {
    fn default() -> Self {
        Self::from_defaults(
            StructureType::CoplanarWaveguide,
            &StructureDefaults::default(),
            FrequencySweep::default(),
        )
    }
}

impl ParameterModel {
    pub fn from_defaults(
        structure: StructureType,
        defaults: &StructureDefaults,
        sweep: FrequencySweep,
    ) -> Self {
        Self {
            structure,
            unit: LengthUnit::Micrometer,
            geometry: defaults.geometry.clone(),
            material: defaults.material.clone(),
            mesh: defaults.mesh.clone(),
            excitation: defaults.excitation.clone(),
            sweep,
        }
    }

    /// Coplanar waveguide with the given center width and gap, everything else default.
    pub fn cpw(width: f64, gap: f64) -> Self {
        let mut model = Self::default();
        model.geometry.width = width;
        model.geometry.gap = gap;
        model
    }

    pub fn with_sweep(mut self, start: f64, stop: f64, points: usize) -> Self {
        self.sweep = FrequencySweep::new(start, stop, points);
        self
    }

    pub fn validate(&self) -> Result<()> {
        super::validation::validate_parameters(self)
    }
}

/// Scalar fields the optimization loop is allowed to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKey {
    Width,
    Gap,
    Length,
    SubstrateHeight,
    PortLength,
    RelativePermittivity,
}

impl ParameterKey {
    pub fn field_path(&self) -> &'static str {
        match self {
            Self::Width => "geometry.width",
            Self::Gap => "geometry.gap",
            Self::Length => "geometry.length",
            Self::SubstrateHeight => "geometry.substrate_height",
            Self::PortLength => "excitation.port_length",
            Self::RelativePermittivity => "material.relative_permittivity",
        }
    }

    pub fn get(&self, model: &ParameterModel) -> f64 {
        match self {
            Self::Width => model.geometry.width,
            Self::Gap => model.geometry.gap,
            Self::Length => model.geometry.length,
            Self::SubstrateHeight => model.geometry.substrate_height,
            Self::PortLength => model.excitation.port_length,
            Self::RelativePermittivity => model.material.relative_permittivity,
        }
    }

    pub fn set(&self, model: &mut ParameterModel, value: f64) {
        match self {
            Self::Width => model.geometry.width = value,
            Self::Gap => model.geometry.gap = value,
            Self::Length => model.geometry.length = value,
            Self::SubstrateHeight => model.geometry.substrate_height = value,
            Self::PortLength => model.excitation.port_length = value,
            Self::RelativePermittivity => model.material.relative_permittivity = value,
        }
    }
}

// ===== SIMULATION RECORD =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl SimulationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Data,
    Figure,
    Script,
    Other,
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("txt" | "dat" | "csv" | "mat" | "s2p" | "json") => Self::Data,
            Some("png" | "fig" | "jpg" | "jpeg" | "svg" | "pdf" | "eps") => Self::Figure,
            Some("m") => Self::Script,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub bytes: u64,
}

/// Why a run ended the way it did.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_secs: Option<f64>,
    pub failure: Option<Failure>,
}

#[derive(Clone, Debug)]
pub struct SimulationRecord {
    pub id: SimulationId,
    pub parameters: ParameterModel,
    pub status: SimulationStatus,
    /// Generated script text; kept so a pending record can be run later.
    pub script: String,
    pub script_path: Option<PathBuf>,
    pub working_directory: PathBuf,
    pub artifacts: Vec<Artifact>,
    pub result: Option<SParameterSet>,
    pub diagnostics: Diagnostics,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

impl SimulationRecord {
    pub fn pending(
        id: SimulationId,
        parameters: ParameterModel,
        script: String,
        working_directory: PathBuf,
    ) -> Self {
        Self {
            id,
            parameters,
            status: SimulationStatus::Pending,
            script,
            script_path: None,
            working_directory,
            artifacts: Vec::new(),
            result: None,
            diagnostics: Diagnostics::default(),
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn artifact_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    /// Mark a completed run as failed at a later stage (e.g. parsing).
    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        self.status = SimulationStatus::Failed;
        self.result = None;
        self.diagnostics.failure = Some(Failure {
            stage,
            message: message.into(),
        });
    }
}

// ===== FREQUENCY-DOMAIN RESULTS =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResonanceKind {
    /// |S21| peak, e.g. a capacitively coupled resonator.
    Peak,
    /// |S21| notch, e.g. a hanger resonator.
    Dip,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// |Z| at the sweep midpoint, in ohms.
    pub characteristic_impedance: f64,
    pub resonant_frequency: Option<f64>,
    pub resonance_kind: Option<ResonanceKind>,
    pub q_factor: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SParameterSet {
    pub frequencies: Vec<f64>,
    pub s11: Vec<Complex64>,
    pub s21: Vec<Complex64>,
    pub s12: Option<Vec<Complex64>>,
    pub s22: Option<Vec<Complex64>>,
    pub reference_impedance: f64,
    /// Impedance seen from port 1, derived from S11.
    pub impedance: Vec<Complex64>,
    /// Port impedance as reported by the solver, when it wrote one.
    pub port_impedance: Option<Vec<Complex64>>,
    pub metrics: DerivedMetrics,
}

impl SParameterSet {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn midpoint_index(&self) -> usize {
        self.frequencies.len() / 2
    }

    /// S12, assuming a reciprocal network when the solver did not write it.
    pub fn s12_or_reciprocal(&self) -> &[Complex64] {
        self.s12.as_deref().unwrap_or(&self.s21)
    }

    /// S22, assuming a symmetric network when the solver did not write it.
    pub fn s22_or_symmetric(&self) -> &[Complex64] {
        self.s22.as_deref().unwrap_or(&self.s11)
    }
}

// ===== OPTIMIZATION TARGETS =====

/// Smallest |S| used for losses, so an ideal match reads 300 dB instead of infinity.
pub const MIN_S_MAGNITUDE: f64 = 1e-15;

fn loss_db(value: Complex64) -> f64 {
    -20.0 * value.norm().max(MIN_S_MAGNITUDE).log10()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    CharacteristicImpedance,
    ResonantFrequency,
    QFactor,
    InsertionLossDb,
    ReturnLossDb,
}

impl TargetMetric {
    /// Metric value for a parsed result, `None` when it was not detected or is not finite.
    pub fn evaluate(&self, result: &SParameterSet) -> Option<f64> {
        if result.is_empty() {
            return None;
        }
        let mid = result.midpoint_index();
        let value = match self {
            Self::CharacteristicImpedance => Some(result.metrics.characteristic_impedance),
            Self::ResonantFrequency => result.metrics.resonant_frequency,
            Self::QFactor => result.metrics.q_factor,
            Self::InsertionLossDb => Some(loss_db(result.s21[mid])),
            Self::ReturnLossDb => Some(loss_db(result.s11[mid])),
        };
        value.filter(|v| v.is_finite())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacteristicImpedance => "characteristic_impedance",
            Self::ResonantFrequency => "resonant_frequency",
            Self::QFactor => "q_factor",
            Self::InsertionLossDb => "insertion_loss_db",
            Self::ReturnLossDb => "return_loss_db",
        }
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tolerance {
    Absolute(f64),
    /// Fraction of the target value, e.g. `0.05` for 5 %.
    Relative(f64),
}

impl Tolerance {
    pub fn resolve(&self, target_value: f64) -> f64 {
        match *self {
            Self::Absolute(abs) => abs,
            Self::Relative(rel) => rel * target_value.abs(),
        }
    }

    pub fn raw(&self) -> f64 {
        match *self {
            Self::Absolute(v) | Self::Relative(v) => v,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    GreaterThanOrEqual,
    LessThanOrEqual,
}

/// Side condition that must hold alongside the primary target for convergence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecondaryConstraint {
    pub metric: TargetMetric,
    pub relationship: RelationshipType,
    pub bound: f64,
}

impl SecondaryConstraint {
    pub fn is_satisfied(&self, result: &SParameterSet) -> bool {
        match self.metric.evaluate(result) {
            Some(value) => match self.relationship {
                RelationshipType::GreaterThanOrEqual => value >= self.bound,
                RelationshipType::LessThanOrEqual => value <= self.bound,
            },
            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationTarget {
    pub metric: TargetMetric,
    pub target_value: f64,
    pub tolerance: Tolerance,
    #[serde(default)]
    pub constraints: Vec<SecondaryConstraint>,
}

impl OptimizationTarget {
    pub fn new(metric: TargetMetric, target_value: f64, tolerance: Tolerance) -> Self {
        Self {
            metric,
            target_value,
            tolerance,
            constraints: Vec::new(),
        }
    }

    /// 50 Ω style impedance target with an absolute tolerance in ohms.
    pub fn impedance(target_ohms: f64, tolerance_ohms: f64) -> Self {
        Self::new(
            TargetMetric::CharacteristicImpedance,
            target_ohms,
            Tolerance::Absolute(tolerance_ohms),
        )
    }

    pub fn with_constraint(mut self, constraint: SecondaryConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn validate(&self) -> Result<()> {
        super::validation::validate_target(self)
    }
}

/// How a metric moves when a parameter grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Increasing,
    Decreasing,
}

impl Sensitivity {
    pub fn sign(&self) -> f64 {
        match self {
            Self::Increasing => 1.0,
            Self::Decreasing => -1.0,
        }
    }
}

/// A parameter under control of the optimization loop, with its search bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlledParameter {
    pub key: ParameterKey,
    pub min_val: f64,
    pub max_val: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub sensitivity: Sensitivity,
}

impl ControlledParameter {
    pub fn new(key: ParameterKey, min_val: f64, max_val: f64, initial_step: f64) -> Self {
        let sensitivity = match key {
            // Wider center strips and thicker dielectric load the line capacitively.
            ParameterKey::Width | ParameterKey::RelativePermittivity => Sensitivity::Decreasing,
            _ => Sensitivity::Increasing,
        };
        Self {
            key,
            min_val,
            max_val,
            initial_step,
            min_step: initial_step / 1024.0,
            sensitivity,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = min_step;
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_val, self.max_val)
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min_val && value <= self.max_val
    }
}

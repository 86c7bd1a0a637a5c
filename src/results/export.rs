use num_complex::Complex64;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::cache::ResultCache;
use super::metrics::{magnitude_db, phase_deg};
use super::touchstone::write_touchstone;
use crate::core::{
    DerivedMetrics, EngineError, ParameterModel, Result, SParameterSet, SimulationRecord, Stage,
    StructureType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Touchstone,
    Csv,
    Json,
    Octave,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Touchstone => "s2p",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Octave => "mat",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "touchstone" | "network-parameter" | "s2p" => Ok(Self::Touchstone),
            "csv" | "tabular" => Ok(Self::Csv),
            "json" | "structured-record" => Ok(Self::Json),
            "octave" | "native-numeric" | "matlab" => Ok(Self::Octave),
            _ => Err(EngineError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Serialize the parsed result of `id`. The format is checked before the lookup.
pub fn export(cache: &ResultCache, id: &str, format: &str) -> Result<Vec<u8>> {
    let format: ExportFormat = format.parse()?;
    let record = cache.get(id)?;
    export_record(record, format)
}

pub fn export_record(record: &SimulationRecord, format: ExportFormat) -> Result<Vec<u8>> {
    let set = record.result.as_ref().ok_or_else(|| EngineError::NotFound {
        id: record.id.to_string(),
        what: "parsed result",
    })?;
    let bytes = match format {
        ExportFormat::Touchstone => write_touchstone(set, &header_comments(record)).into_bytes(),
        ExportFormat::Csv => to_csv(set).into_bytes(),
        ExportFormat::Json => to_json(record, set)?,
        ExportFormat::Octave => to_octave_text(set).into_bytes(),
    };
    tracing::debug!(simulation = %record.id, ?format, bytes = bytes.len(), "exported");
    Ok(bytes)
}

/// Write an export to `path`, or to `<working dir>/<id>.<ext>` when no path is given.
/// A directory path gets the default file name inside it.
pub fn export_to_file(
    cache: &ResultCache,
    id: &str,
    format: &str,
    path: Option<&Path>,
) -> Result<PathBuf> {
    let parsed: ExportFormat = format.parse()?;
    let record = cache.get(id)?;
    let bytes = export_record(record, parsed)?;

    let file_name = format!("{}.{}", record.id, parsed.extension());
    let target = match path {
        Some(p) if p.is_dir() => p.join(file_name),
        Some(p) => p.to_path_buf(),
        None => record.working_directory.join(file_name),
    };
    fs::write(&target, bytes).map_err(|e| EngineError::io(Stage::Export, &target, e))?;
    tracing::info!(simulation = %record.id, path = %target.display(), "export written");
    Ok(target)
}

fn header_comments(record: &SimulationRecord) -> Vec<String> {
    let p = &record.parameters;
    vec![
        format!("simulation {}", record.id),
        format!("structure {}", p.structure),
        format!(
            "width {} gap {} length {} ({})",
            p.geometry.width,
            p.geometry.gap,
            p.geometry.length,
            p.unit.symbol()
        ),
        format!("substrate er {} height {}", p.material.relative_permittivity, p.geometry.substrate_height),
    ]
}

fn named_parameters(set: &SParameterSet) -> Vec<(&'static str, &[Complex64])> {
    let mut out: Vec<(&'static str, &[Complex64])> = vec![("s11", &set.s11), ("s21", &set.s21)];
    if let Some(s12) = &set.s12 {
        out.push(("s12", s12));
    }
    if let Some(s22) = &set.s22 {
        out.push(("s22", s22));
    }
    out
}

fn to_csv(set: &SParameterSet) -> String {
    let params = named_parameters(set);
    let mut out = String::from("frequency_hz");
    for (name, _) in &params {
        for suffix in ["re", "im", "mag_db", "phase_deg"] {
            let _ = write!(out, ",{}_{}", name, suffix);
        }
    }
    out.push_str(",impedance_re,impedance_im\n");

    for (i, f) in set.frequencies.iter().enumerate() {
        let _ = write!(out, "{:.12e}", f);
        for (_, values) in &params {
            let s = values[i];
            let _ = write!(
                out,
                ",{:.12e},{:.12e},{:.6},{:.4}",
                s.re,
                s.im,
                magnitude_db(s),
                phase_deg(s)
            );
        }
        let z = set.impedance[i];
        let _ = writeln!(out, ",{:.12e},{:.12e}", z.re, z.im);
    }
    out
}

#[derive(Serialize)]
struct ComplexSeries {
    real: Vec<f64>,
    imag: Vec<f64>,
    magnitude_db: Vec<f64>,
    phase_deg: Vec<f64>,
}

impl ComplexSeries {
    fn new(values: &[Complex64]) -> Self {
        Self {
            real: values.iter().map(|v| v.re).collect(),
            imag: values.iter().map(|v| v.im).collect(),
            magnitude_db: values.iter().map(|&v| magnitude_db(v)).collect(),
            phase_deg: values.iter().map(|&v| phase_deg(v)).collect(),
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    simulation_id: &'a str,
    structure: StructureType,
    parameters: &'a ParameterModel,
    reference_impedance: f64,
    frequency_hz: &'a [f64],
    s_parameters: BTreeMap<&'static str, ComplexSeries>,
    impedance: ComplexSeries,
    port_impedance: Option<ComplexSeries>,
    metrics: &'a DerivedMetrics,
}

fn to_json(record: &SimulationRecord, set: &SParameterSet) -> Result<Vec<u8>> {
    let doc = JsonExport {
        simulation_id: record.id.as_str(),
        structure: record.parameters.structure,
        parameters: &record.parameters,
        reference_impedance: set.reference_impedance,
        frequency_hz: &set.frequencies,
        s_parameters: named_parameters(set)
            .into_iter()
            .map(|(name, values)| (name, ComplexSeries::new(values)))
            .collect(),
        impedance: ComplexSeries::new(&set.impedance),
        port_impedance: set.port_impedance.as_deref().map(ComplexSeries::new),
        metrics: &set.metrics,
    };
    serde_json::to_vec_pretty(&doc).map_err(|e| EngineError::Io {
        stage: Stage::Export,
        path: record.working_directory.clone(),
        source: std::io::Error::other(e),
    })
}

fn octave_real_column(out: &mut String, name: &str, values: &[f64]) {
    let _ = writeln!(out, "# name: {}\n# type: matrix\n# rows: {}\n# columns: 1", name, values.len());
    for v in values {
        let _ = writeln!(out, " {:.12e}", v);
    }
    out.push_str("\n\n");
}

fn octave_complex_column(out: &mut String, name: &str, values: &[Complex64]) {
    let _ = writeln!(
        out,
        "# name: {}\n# type: complex matrix\n# rows: {}\n# columns: 1",
        name,
        values.len()
    );
    for v in values {
        let _ = writeln!(out, " ({:.12e},{:.12e})", v.re, v.im);
    }
    out.push_str("\n\n");
}

/// Octave's text save format; `load` reads it back as named variables.
fn to_octave_text(set: &SParameterSet) -> String {
    let mut out = String::from("# Created by emsim-optimizer\n");
    let _ = writeln!(out, "# name: z0\n# type: scalar\n{}\n\n", set.reference_impedance);
    octave_real_column(&mut out, "frequency", &set.frequencies);
    for (name, values) in named_parameters(set) {
        octave_complex_column(&mut out, name, values);
    }
    octave_complex_column(&mut out, "impedance", &set.impedance);
    if let Some(zp) = &set.port_impedance {
        octave_complex_column(&mut out, "port_impedance", zp);
    }
    out
}

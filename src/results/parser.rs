use num_complex::Complex64;
use std::fs;
use std::path::{Path, PathBuf};

use super::metrics;
use crate::core::{
    EngineError, Result, SParameterSet, SimulationId, SimulationRecord, SimulationStatus, Stage,
};
use crate::simulation::script::{FREQUENCY_FILE, IMPEDANCE_IMAG_FILE, IMPEDANCE_REAL_FILE};

/// Read the solver's ASCII artifacts for `record` into an [`SParameterSet`].
///
/// Does not touch the record; attaching the result is up to the caller.
pub fn parse(record: &SimulationRecord) -> Result<SParameterSet> {
    let dir = &record.working_directory;
    let id = &record.id;
    let expected = record.parameters.sweep.points;

    let frequency_path = dir.join(FREQUENCY_FILE);
    let frequencies = read_vector(id, &frequency_path)?;
    if frequencies.len() != expected {
        return Err(EngineError::malformed(
            id,
            Some(frequency_path),
            format!("expected {} frequency points, found {}", expected, frequencies.len()),
        ));
    }
    if let Some(i) = frequencies.windows(2).position(|w| w[1] <= w[0]) {
        return Err(EngineError::malformed(
            id,
            Some(frequency_path),
            format!("frequency axis is not strictly increasing at index {}", i + 1),
        ));
    }

    let present = discover_pairs(dir);
    tracing::debug!(simulation = %id, pairs = ?present, "S-parameter files found");
    let s11 = read_pair(id, dir, "s11", expected)?;
    let s21 = read_pair(id, dir, "s21", expected)?;
    let s12 = optional_pair(id, dir, "s12", expected, &present)?;
    let s22 = optional_pair(id, dir, "s22", expected, &present)?;
    let port_impedance = read_impedance(id, dir, expected)?;

    let z0 = record.parameters.excitation.reference_impedance;
    let impedance = metrics::impedance_from_reflection(&s11, z0);
    let derived = metrics::derive(&frequencies, &s21, &impedance);

    Ok(SParameterSet {
        frequencies,
        s11,
        s21,
        s12,
        s22,
        reference_impedance: z0,
        impedance,
        port_impedance,
        metrics: derived,
    })
}

/// Parse a completed record in place: attach the result, or mark the record
/// failed at the parsing stage. Records that did not complete are left alone.
pub fn attach(record: &mut SimulationRecord) {
    if record.status != SimulationStatus::Completed {
        return;
    }
    match parse(record) {
        Ok(set) => {
            tracing::debug!(
                simulation = %record.id,
                z0 = set.metrics.characteristic_impedance,
                "parsed result"
            );
            record.result = Some(set);
        }
        Err(err) => {
            tracing::warn!(simulation = %record.id, error = %err, "result is malformed");
            record.fail(Stage::Parsing, err.to_string());
        }
    }
}

/// Names (`s11`, `s21`, ...) of every `sXY_real.txt` in `dir`.
fn discover_pairs(dir: &Path) -> Vec<String> {
    let pattern = format!("{}/s??_real.txt", glob::Pattern::escape(&dir.to_string_lossy()));
    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };
    let mut names: Vec<String> = paths
        .filter_map(|p| p.ok())
        .filter_map(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix("_real.txt"))
                .map(str::to_string)
        })
        .collect();
    names.sort();
    names
}

/// Whitespace- or comma-separated numbers, one or many per line.
pub fn read_vector(id: &SimulationId, path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|e| {
        let reason = if e.kind() == std::io::ErrorKind::NotFound {
            "file is missing".to_string()
        } else {
            format!("unreadable: {}", e)
        };
        EngineError::malformed(id, Some(path.to_path_buf()), reason)
    })?;

    let mut values = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        for token in line.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
            let value: f64 = token.parse().map_err(|_| {
                EngineError::malformed(
                    id,
                    Some(path.to_path_buf()),
                    format!("non-numeric value {:?} on line {}", token, line_no + 1),
                )
            })?;
            if !value.is_finite() {
                return Err(EngineError::malformed(
                    id,
                    Some(path.to_path_buf()),
                    format!("non-finite value {:?} on line {}", token, line_no + 1),
                ));
            }
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(EngineError::malformed(id, Some(path.to_path_buf()), "file is empty"));
    }
    Ok(values)
}

fn pair_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}_real.txt", name)),
        dir.join(format!("{}_imag.txt", name)),
    )
}

fn read_complex(id: &SimulationId, real_path: PathBuf, imag_path: PathBuf, expected: usize) -> Result<Vec<Complex64>> {
    let re = read_vector(id, &real_path)?;
    let im = read_vector(id, &imag_path)?;
    for (path, len) in [(real_path, re.len()), (imag_path, im.len())] {
        if len != expected {
            return Err(EngineError::malformed(
                id,
                Some(path),
                format!("expected {} values to match the frequency axis, found {}", expected, len),
            ));
        }
    }
    Ok(re.into_iter().zip(im).map(|(r, i)| Complex64::new(r, i)).collect())
}

fn read_pair(id: &SimulationId, dir: &Path, name: &str, expected: usize) -> Result<Vec<Complex64>> {
    let (re, im) = pair_paths(dir, name);
    read_complex(id, re, im, expected)
}

fn optional_pair(
    id: &SimulationId,
    dir: &Path,
    name: &str,
    expected: usize,
    present: &[String],
) -> Result<Option<Vec<Complex64>>> {
    let (re, im) = pair_paths(dir, name);
    if present.iter().any(|p| p == name) || im.exists() {
        read_complex(id, re, im, expected).map(Some)
    } else {
        Ok(None)
    }
}

fn read_impedance(id: &SimulationId, dir: &Path, expected: usize) -> Result<Option<Vec<Complex64>>> {
    let re = dir.join(IMPEDANCE_REAL_FILE);
    let im = dir.join(IMPEDANCE_IMAG_FILE);
    if !re.exists() && !im.exists() {
        return Ok(None);
    }
    read_complex(id, re, im, expected).map(Some)
}

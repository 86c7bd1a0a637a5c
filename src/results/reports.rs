//! Summaries of a parsed sweep, shaped for JSON output.

use num_complex::Complex64;
use serde::Serialize;

use super::metrics::{magnitude_db, phase_deg, vswr};
use crate::core::{DerivedMetrics, EngineError, Result, SParameterSet, SimulationId};

/// Return loss that counts as matched.
pub const MATCHED_RETURN_LOSS_DB: f64 = 10.0;
pub const HIGH_INSERTION_LOSS_DB: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        Self {
            mean: mean(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Index of the largest value; NaN never wins.
fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterStats {
    pub name: &'static str,
    pub magnitude_db: SeriesStats,
    pub phase_range_deg: [f64; 2],
}

impl ParameterStats {
    fn new(name: &'static str, values: &[Complex64]) -> Self {
        let db: Vec<f64> = values.iter().map(|&v| magnitude_db(v)).collect();
        let phase = SeriesStats::of(&values.iter().map(|&v| phase_deg(v)).collect::<Vec<_>>());
        Self {
            name,
            magnitude_db: SeriesStats::of(&db),
            phase_range_deg: [phase.min, phase.max],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub low_hz: f64,
    pub high_hz: f64,
    pub width_hz: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchingAnalysis {
    pub best_return_loss_db: f64,
    pub best_match_frequency_hz: f64,
    pub mean_vswr: f64,
    pub min_vswr: f64,
    /// Span of frequencies with |S11| at or below −10 dB.
    pub bandwidth_10db: Option<Band>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransmissionAnalysis {
    pub mean_insertion_loss_db: f64,
    pub best_transmission_db: f64,
    pub best_transmission_frequency_hz: f64,
    pub worst_transmission_db: f64,
    pub worst_transmission_frequency_hz: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SParameterReport {
    pub simulation_id: SimulationId,
    pub points: usize,
    pub frequency_range_hz: [f64; 2],
    pub parameters: Vec<ParameterStats>,
    pub matching: MatchingAnalysis,
    pub transmission: TransmissionAnalysis,
    pub metrics: DerivedMetrics,
    pub recommendations: Vec<String>,
}

pub fn s_parameter_report(id: &SimulationId, set: &SParameterSet) -> Result<SParameterReport> {
    if set.is_empty() {
        return Err(EngineError::malformed(id, None, "result has no frequency points"));
    }
    let freqs = &set.frequencies;

    let mut parameters = vec![ParameterStats::new("s11", &set.s11), ParameterStats::new("s21", &set.s21)];
    if let Some(s12) = &set.s12 {
        parameters.push(ParameterStats::new("s12", s12));
    }
    if let Some(s22) = &set.s22 {
        parameters.push(ParameterStats::new("s22", s22));
    }

    let s11_db: Vec<f64> = set.s11.iter().map(|&s| magnitude_db(s)).collect();
    let return_loss: Vec<f64> = s11_db.iter().map(|db| -db).collect();
    let best = argmax(&return_loss).unwrap_or(0);
    let vswrs: Vec<f64> = set.s11.iter().map(|&s| vswr(s)).collect();
    let matched: Vec<f64> = freqs
        .iter()
        .zip(&s11_db)
        .filter(|(_, db)| **db <= -MATCHED_RETURN_LOSS_DB)
        .map(|(f, _)| *f)
        .collect();
    let bandwidth_10db = match (matched.first(), matched.last()) {
        (Some(&low), Some(&high)) => Some(Band {
            low_hz: low,
            high_hz: high,
            width_hz: high - low,
        }),
        _ => None,
    };
    let matching = MatchingAnalysis {
        best_return_loss_db: return_loss[best],
        best_match_frequency_hz: freqs[best],
        mean_vswr: mean(&vswrs),
        min_vswr: SeriesStats::of(&vswrs).min,
        bandwidth_10db,
    };

    let s21_db: Vec<f64> = set.s21.iter().map(|&s| magnitude_db(s)).collect();
    let strongest = argmax(&s21_db).unwrap_or(0);
    let weakest = argmin(&s21_db).unwrap_or(0);
    let transmission = TransmissionAnalysis {
        mean_insertion_loss_db: -mean(&s21_db),
        best_transmission_db: s21_db[strongest],
        best_transmission_frequency_hz: freqs[strongest],
        worst_transmission_db: s21_db[weakest],
        worst_transmission_frequency_hz: freqs[weakest],
    };

    let mut recommendations = Vec::new();
    if matching.best_return_loss_db < MATCHED_RETURN_LOSS_DB {
        recommendations.push(format!(
            "Return loss never reaches {} dB: adjust width and gap toward {} ohm",
            MATCHED_RETURN_LOSS_DB, set.reference_impedance
        ));
    }
    if transmission.mean_insertion_loss_db > HIGH_INSERTION_LOSS_DB {
        recommendations.push("High insertion loss: check conductor and substrate losses".to_string());
    }
    if let Some(f0) = set.metrics.resonant_frequency {
        recommendations.push(format!("Resonance near {:.4} GHz", f0 / 1e9));
    }
    if recommendations.is_empty() {
        recommendations.push("Matching and transmission are acceptable across the band".to_string());
    }

    Ok(SParameterReport {
        simulation_id: id.clone(),
        points: set.len(),
        frequency_range_hz: [freqs[0], freqs[freqs.len() - 1]],
        parameters,
        matching,
        transmission,
        metrics: set.metrics.clone(),
        recommendations,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpedanceSource {
    /// Solver-reported port impedance.
    Port,
    /// Derived from S11 against the reference impedance.
    Reflection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    Excellent,
    Good,
    Poor,
}

impl StabilityClass {
    pub fn from_variation_percent(variation: f64) -> Self {
        if variation < 5.0 {
            Self::Excellent
        } else if variation < 10.0 {
            Self::Good
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MagnitudeStats {
    pub mean: f64,
    pub min: f64,
    pub min_frequency_hz: f64,
    pub max: f64,
    pub max_frequency_hz: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetError {
    pub mean: f64,
    pub max_positive: f64,
    pub max_negative: f64,
    pub rms: f64,
    /// Mean error relative to the target.
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpedanceReport {
    pub simulation_id: SimulationId,
    pub target_impedance: f64,
    pub source: ImpedanceSource,
    pub characteristic_impedance: f64,
    pub magnitude: MagnitudeStats,
    pub real: SeriesStats,
    pub imag: SeriesStats,
    pub error: TargetError,
    /// Standard deviation of |Z| over its mean.
    pub variation_percent: f64,
    pub stability: StabilityClass,
    pub recommendations: Vec<String>,
}

pub fn impedance_report(id: &SimulationId, set: &SParameterSet, target: f64) -> Result<ImpedanceReport> {
    if !(target.is_finite() && target > 0.0) {
        return Err(EngineError::invalid("target_impedance", "must be > 0").for_simulation(id));
    }
    let (source, z) = match &set.port_impedance {
        Some(zp) if !zp.is_empty() => (ImpedanceSource::Port, zp.as_slice()),
        _ => (ImpedanceSource::Reflection, set.impedance.as_slice()),
    };
    if z.is_empty() {
        return Err(EngineError::malformed(id, None, "result has no impedance values"));
    }

    let magnitudes: Vec<f64> = z.iter().map(|v| v.norm()).collect();
    let lo = argmin(&magnitudes).unwrap_or(0);
    let hi = argmax(&magnitudes).unwrap_or(0);
    let magnitude = MagnitudeStats {
        mean: mean(&magnitudes),
        min: magnitudes[lo],
        min_frequency_hz: set.frequencies[lo],
        max: magnitudes[hi],
        max_frequency_hz: set.frequencies[hi],
        std_dev: std_dev(&magnitudes),
    };

    let errors: Vec<f64> = magnitudes.iter().map(|m| m - target).collect();
    let error = TargetError {
        mean: mean(&errors),
        max_positive: errors.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        max_negative: errors.iter().copied().fold(f64::INFINITY, f64::min),
        rms: (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt(),
        percent: 100.0 * mean(&errors) / target,
    };

    let variation_percent = if magnitude.mean > 0.0 {
        100.0 * magnitude.std_dev / magnitude.mean
    } else {
        f64::INFINITY
    };
    let stability = StabilityClass::from_variation_percent(variation_percent);

    let mut recommendations = Vec::new();
    if error.percent.abs() <= 5.0 {
        recommendations.push(format!("Impedance is within 5% of the {} ohm target", target));
    } else if error.mean < 0.0 {
        recommendations.push("Impedance too low: increase the gap or reduce the width".to_string());
    } else {
        recommendations.push("Impedance too high: reduce the gap or increase the width".to_string());
    }
    if stability == StabilityClass::Poor {
        recommendations.push(
            "Impedance varies strongly over frequency: check mesh resolution and port placement".to_string(),
        );
    }

    Ok(ImpedanceReport {
        simulation_id: id.clone(),
        target_impedance: target,
        source,
        characteristic_impedance: set.metrics.characteristic_impedance,
        magnitude,
        real: SeriesStats::of(&z.iter().map(|v| v.re).collect::<Vec<_>>()),
        imag: SeriesStats::of(&z.iter().map(|v| v.im).collect::<Vec<_>>()),
        error,
        variation_percent,
        stability,
        recommendations,
    })
}

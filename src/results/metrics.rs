//! Quantities derived from a parsed sweep.

use num_complex::Complex64;

use crate::core::{DerivedMetrics, ResonanceKind};

/// Minimum distance from the band median for an |S21| extremum to count as a resonance.
pub const MIN_PROMINENCE_DB: f64 = 3.0;

pub fn magnitude_db(value: Complex64) -> f64 {
    20.0 * value.norm().log10()
}

pub fn phase_deg(value: Complex64) -> f64 {
    value.arg().to_degrees()
}

/// Input impedance seen through a reflection coefficient: `Z0 (1 + Γ) / (1 − Γ)`.
pub fn impedance_from_reflection(s11: &[Complex64], z0: f64) -> Vec<Complex64> {
    let one = Complex64::new(1.0, 0.0);
    s11.iter().map(|&g| z0 * (one + g) / (one - g)).collect()
}

pub fn vswr(s11: Complex64) -> f64 {
    let mag = s11.norm();
    if mag >= 1.0 {
        f64::INFINITY
    } else {
        (1.0 + mag) / (1.0 - mag)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resonance {
    pub index: usize,
    pub frequency: f64,
    pub kind: ResonanceKind,
    pub prominence_db: f64,
}

/// Most prominent interior |S21| extremum, if it stands at least 3 dB off the band median.
pub fn detect_resonance(frequencies: &[f64], s21_db: &[f64]) -> Option<Resonance> {
    let n = s21_db.len().min(frequencies.len());
    if n < 3 {
        return None;
    }
    let median = median(&s21_db[..n])?;

    let mut best: Option<Resonance> = None;
    for i in 1..n - 1 {
        let (prev, here, next) = (s21_db[i - 1], s21_db[i], s21_db[i + 1]);
        let kind = if here > prev && here >= next && here > median {
            ResonanceKind::Peak
        } else if here < prev && here <= next && here < median {
            ResonanceKind::Dip
        } else {
            continue;
        };
        let prominence = (here - median).abs();
        if best.is_none_or(|b| prominence > b.prominence_db) {
            best = Some(Resonance {
                index: i,
                frequency: frequencies[i],
                kind,
                prominence_db: prominence,
            });
        }
    }
    best.filter(|r| r.prominence_db >= MIN_PROMINENCE_DB)
}

/// Linear interpolation of the frequency where the curve between `a` and `b` meets `level`.
fn crossing(frequencies: &[f64], db: &[f64], a: usize, b: usize, level: f64) -> f64 {
    let (fa, fb) = (frequencies[a], frequencies[b]);
    let (ya, yb) = (db[a], db[b]);
    if (yb - ya).abs() < f64::EPSILON {
        return fa;
    }
    fa + (level - ya) * (fb - fa) / (yb - ya)
}

/// Loaded Q from the 3 dB bandwidth around a detected resonance.
pub fn q_factor(frequencies: &[f64], s21_db: &[f64], resonance: &Resonance) -> Option<f64> {
    let i = resonance.index;
    let (level, beyond): (f64, fn(f64, f64) -> bool) = match resonance.kind {
        ResonanceKind::Peak => (s21_db[i] - 3.0, |v, level| v <= level),
        ResonanceKind::Dip => (s21_db[i] + 3.0, |v, level| v >= level),
    };

    let left = (0..i).rev().find(|&j| beyond(s21_db[j], level))?;
    let right = (i + 1..s21_db.len()).find(|&j| beyond(s21_db[j], level))?;

    let f_low = crossing(frequencies, s21_db, left, left + 1, level);
    let f_high = crossing(frequencies, s21_db, right - 1, right, level);
    let bandwidth = f_high - f_low;
    (bandwidth > 0.0).then(|| resonance.frequency / bandwidth)
}

/// |Z| at the sweep midpoint.
pub fn characteristic_impedance(impedance: &[Complex64]) -> f64 {
    impedance
        .get(impedance.len() / 2)
        .map(|z| z.norm())
        .unwrap_or(f64::NAN)
}

pub fn derive(frequencies: &[f64], s21: &[Complex64], impedance: &[Complex64]) -> DerivedMetrics {
    let s21_db: Vec<f64> = s21.iter().map(|&s| magnitude_db(s)).collect();
    let resonance = detect_resonance(frequencies, &s21_db);
    let q = resonance.as_ref().and_then(|r| q_factor(frequencies, &s21_db, r));

    DerivedMetrics {
        characteristic_impedance: characteristic_impedance(impedance),
        resonant_frequency: resonance.map(|r| r.frequency),
        resonance_kind: resonance.map(|r| r.kind),
        q_factor: q,
    }
}

//! Touchstone (`.s2p`) network-parameter files.

use num_complex::Complex64;

use crate::core::{EngineError, Result, SParameterSet};

/// A 2-port network as read back from a Touchstone file.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoPort {
    pub reference_impedance: f64,
    pub frequencies: Vec<f64>,
    pub s11: Vec<Complex64>,
    pub s21: Vec<Complex64>,
    pub s12: Vec<Complex64>,
    pub s22: Vec<Complex64>,
}

/// Render `set` as RI data in Hz. Missing S12/S22 are filled from S21/S11.
pub fn write_touchstone(set: &SParameterSet, comments: &[String]) -> String {
    let mut out = String::new();
    for comment in comments {
        out.push_str(&format!("! {}\n", comment));
    }
    out.push_str(&format!("# Hz S RI R {}\n", set.reference_impedance));
    out.push_str("! freq  ReS11  ImS11  ReS21  ImS21  ReS12  ImS12  ReS22  ImS22\n");

    let s12 = set.s12_or_reciprocal();
    let s22 = set.s22_or_symmetric();
    for (i, f) in set.frequencies.iter().enumerate() {
        out.push_str(&format!("{:.12e}", f));
        for s in [set.s11[i], set.s21[i], s12[i], s22[i]] {
            out.push_str(&format!(" {:.12e} {:.12e}", s.re, s.im));
        }
        out.push('\n');
    }
    out
}

/// Parse a 2-port Touchstone file in RI, MA or DB format.
pub fn read_touchstone(contents: &str) -> Result<TwoPort> {
    let malformed = EngineError::Import;

    let mut z0 = 50.0;
    let mut format = "MA".to_string();
    let mut scale = 1e9;
    let mut seen_options = false;
    let mut network = TwoPort {
        reference_impedance: z0,
        frequencies: Vec::new(),
        s11: Vec::new(),
        s21: Vec::new(),
        s12: Vec::new(),
        s22: Vec::new(),
    };
    // Values may wrap across lines, so collect tokens until a row is complete.
    let mut pending: Vec<f64> = Vec::new();

    for (line_no, raw) in contents.lines().enumerate() {
        let line = raw.split('!').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if seen_options {
                continue;
            }
            seen_options = true;
            let tokens: Vec<String> = line[1..].split_whitespace().map(|t| t.to_ascii_uppercase()).collect();
            let mut i = 0;
            while i < tokens.len() {
                match tokens[i].as_str() {
                    "HZ" => scale = 1.0,
                    "KHZ" => scale = 1e3,
                    "MHZ" => scale = 1e6,
                    "GHZ" => scale = 1e9,
                    "S" => {}
                    "Y" | "Z" | "H" | "G" => {
                        return Err(malformed(format!("only S parameters are supported, got {}", tokens[i])));
                    }
                    "RI" | "MA" | "DB" => format = tokens[i].clone(),
                    "R" => {
                        let value = tokens.get(i + 1).ok_or_else(|| malformed("R without a value".to_string()))?;
                        z0 = value
                            .parse()
                            .map_err(|_| malformed(format!("bad reference impedance {:?}", value)))?;
                        i += 1;
                    }
                    other => return Err(malformed(format!("unknown option {:?}", other))),
                }
                i += 1;
            }
            continue;
        }

        for token in line.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| malformed(format!("non-numeric value {:?} on line {}", token, line_no + 1)))?;
            pending.push(value);
        }
        while pending.len() >= 9 {
            let row: Vec<f64> = pending.drain(..9).collect();
            network.frequencies.push(row[0] * scale);
            let mut values = row[1..].chunks(2).map(|p| to_complex(&format, p[0], p[1]));
            // 2-port order is S11 S21 S12 S22.
            for target in [&mut network.s11, &mut network.s21, &mut network.s12, &mut network.s22] {
                if let Some(v) = values.next() {
                    target.push(v);
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err(malformed(format!("{} trailing values do not form a 2-port row", pending.len())));
    }
    if network.frequencies.is_empty() {
        return Err(malformed("no data rows".to_string()));
    }
    network.reference_impedance = z0;
    Ok(network)
}

fn to_complex(format: &str, a: f64, b: f64) -> Complex64 {
    match format {
        "RI" => Complex64::new(a, b),
        "DB" => Complex64::from_polar(10f64.powf(a / 20.0), b.to_radians()),
        _ => Complex64::from_polar(a, b.to_radians()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ma_in_ghz() {
        let text = "! test\n# GHz S MA R 75\n1.0 0.5 90 1 0 1 0 0.5 -90\n";
        let net = read_touchstone(text).unwrap();
        assert_eq!(net.reference_impedance, 75.0);
        assert_eq!(net.frequencies, vec![1e9]);
        assert!((net.s11[0] - Complex64::new(0.0, 0.5)).norm() < 1e-12);
        assert!((net.s22[0] - Complex64::new(0.0, -0.5)).norm() < 1e-12);
    }

    #[test]
    fn reads_db_with_wrapped_rows() {
        let text = "# MHz S DB R 50\n100 -20 0 0 0\n 0 0 -20 180\n";
        let net = read_touchstone(text).unwrap();
        assert_eq!(net.frequencies, vec![1e8]);
        assert!((net.s11[0].norm() - 0.1).abs() < 1e-12);
        assert!((net.s22[0] - Complex64::new(-0.1, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn defaults_follow_the_format_defaults() {
        let net = read_touchstone("1 1 0 0 0 0 0 1 0\n").unwrap();
        assert_eq!(net.frequencies, vec![1e9]);
        assert_eq!(net.reference_impedance, 50.0);
    }

    #[test]
    fn rejects_y_parameters_and_partial_rows() {
        assert!(read_touchstone("# Hz Y RI R 50\n1 0 0 0 0 0 0 0 0\n").is_err());
        assert!(read_touchstone("# Hz S RI R 50\n1 0 0 0\n").is_err());
        assert!(read_touchstone("! only comments\n").is_err());
    }
}

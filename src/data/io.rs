//! Reading and writing measured datasets.
//!
//! Two on-disk shapes are supported:
//!
//! - the plain-text triplet format: whitespace-separated `time label value` records,
//!   one per line, where the label is a component name (concentration files) or a
//!   numeric wavelength (spectral files). `#` starts a comment, blank lines are
//!   ignored;
//! - wide CSV: a `time` column followed by one column per component/wavelength.

use crate::data::{ConcentrationData, SpectralData};
use crate::error::{KinFitError, Result};
use ndarray::{Array1, Array2};
use std::path::Path;

/// One parsed triplet line: (time, label, value, source line number).
type Triplet = (f64, String, f64, usize);

fn format_error(path: &Path, line: usize, reason: impl Into<String>) -> KinFitError {
    KinFitError::DataFormat {
        file: path.display().to_string(),
        line,
        reason: reason.into(),
    }
}

/// Parse the triplet text format, keeping the label as a string.
fn read_triplets(path: &Path) -> Result<Vec<Triplet>> {
    let contents = std::fs::read_to_string(path)?;
    let mut triplets = Vec::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(format_error(
                path,
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }

        let time: f64 = fields[0]
            .parse()
            .map_err(|_| format_error(path, line_no, format!("invalid time '{}'", fields[0])))?;
        let value: f64 = fields[2]
            .parse()
            .map_err(|_| format_error(path, line_no, format!("invalid value '{}'", fields[2])))?;
        if !time.is_finite() || !value.is_finite() {
            return Err(format_error(path, line_no, "non-finite time or value"));
        }

        triplets.push((time, fields[1].to_string(), value, line_no));
    }

    Ok(triplets)
}

/// Sorted unique values of a float sequence (exact equality; identical text
/// produces identical floats).
fn sorted_unique(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN grid values"));
    out.dedup();
    out
}

fn index_of(grid: &[f64], value: f64) -> usize {
    grid.binary_search_by(|probe| probe.partial_cmp(&value).expect("non-NaN grid values"))
        .expect("value taken from the grid")
}

/// Read concentration measurements from a triplet text file.
///
/// Component columns appear in order of first appearance; entries absent from the
/// file stay NaN (sparse measurements are allowed).
pub fn read_concentration_txt<P: AsRef<Path>>(path: P) -> Result<ConcentrationData> {
    let path = path.as_ref();
    let triplets = read_triplets(path)?;
    if triplets.is_empty() {
        return Err(format_error(path, 0, "file contains no measurements"));
    }

    let times = sorted_unique(triplets.iter().map(|t| t.0));
    let mut components: Vec<String> = Vec::new();
    for (_, label, _, _) in &triplets {
        if !components.contains(label) {
            components.push(label.clone());
        }
    }

    let mut values = Array2::from_elem((times.len(), components.len()), f64::NAN);
    for (time, label, value, line_no) in &triplets {
        let i = index_of(&times, *time);
        let j = components.iter().position(|c| c == label).unwrap();
        if !values[[i, j]].is_nan() {
            return Err(format_error(
                path,
                *line_no,
                format!("duplicate measurement for '{}' at t = {}", label, time),
            ));
        }
        values[[i, j]] = *value;
    }

    ConcentrationData::new(Array1::from_vec(times), components, values)
}

/// Read a spectral dataset from a triplet text file (`time wavelength value`).
///
/// The file must cover the full time x wavelength grid.
pub fn read_spectral_txt<P: AsRef<Path>>(path: P) -> Result<SpectralData> {
    let path = path.as_ref();
    let triplets = read_triplets(path)?;
    if triplets.is_empty() {
        return Err(format_error(path, 0, "file contains no measurements"));
    }

    let mut wavelengths_raw = Vec::with_capacity(triplets.len());
    for (_, label, _, line_no) in &triplets {
        let wl: f64 = label
            .parse()
            .ok()
            .filter(|w: &f64| w.is_finite())
            .ok_or_else(|| {
                format_error(path, *line_no, format!("invalid wavelength '{}'", label))
            })?;
        wavelengths_raw.push(wl);
    }

    let times = sorted_unique(triplets.iter().map(|t| t.0));
    let wavelengths = sorted_unique(wavelengths_raw.iter().copied());

    let mut absorbance = Array2::from_elem((times.len(), wavelengths.len()), f64::NAN);
    for ((time, _, value, line_no), wl) in triplets.iter().zip(wavelengths_raw.iter()) {
        let i = index_of(&times, *time);
        let j = index_of(&wavelengths, *wl);
        if !absorbance[[i, j]].is_nan() {
            return Err(format_error(
                path,
                *line_no,
                format!("duplicate measurement at t = {}, wavelength = {}", time, wl),
            ));
        }
        absorbance[[i, j]] = *value;
    }

    if absorbance.iter().any(|v| v.is_nan()) {
        return Err(format_error(
            path,
            0,
            "spectral file does not cover the full time x wavelength grid",
        ));
    }

    SpectralData::new(
        Array1::from_vec(times),
        Array1::from_vec(wavelengths),
        absorbance,
    )
}

/// Write concentration measurements in the triplet text format (NaN entries are
/// skipped, preserving sparsity).
pub fn write_concentration_txt<P: AsRef<Path>>(data: &ConcentrationData, path: P) -> Result<()> {
    let mut out = String::new();
    for (i, &t) in data.times().iter().enumerate() {
        for (j, name) in data.components().iter().enumerate() {
            let v = data.values()[[i, j]];
            if v.is_nan() {
                continue;
            }
            out.push_str(&format!("{} {} {}\n", t, name, v));
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Write a spectral dataset in the triplet text format.
pub fn write_spectral_txt<P: AsRef<Path>>(data: &SpectralData, path: P) -> Result<()> {
    let mut out = String::new();
    for (i, &t) in data.times().iter().enumerate() {
        for (j, &wl) in data.wavelengths().iter().enumerate() {
            out.push_str(&format!("{} {} {}\n", t, wl, data.absorbance()[[i, j]]));
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Read concentration measurements from a wide CSV file
/// (`time,<component>,<component>,...`; empty cells mark missing measurements).
pub fn read_concentration_csv<P: AsRef<Path>>(path: P) -> Result<ConcentrationData> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(format_error(path, 1, "expected a time column and at least one component"));
    }
    let components: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut times = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line_no = idx + 2;
        let record = record?;
        if record.len() != headers.len() {
            return Err(format_error(
                path,
                line_no,
                format!("expected {} fields, found {}", headers.len(), record.len()),
            ));
        }
        let t: f64 = record[0]
            .trim()
            .parse()
            .map_err(|_| format_error(path, line_no, format!("invalid time '{}'", &record[0])))?;
        times.push(t);

        let mut row = Vec::with_capacity(components.len());
        for field in record.iter().skip(1) {
            let field = field.trim();
            if field.is_empty() {
                row.push(f64::NAN);
            } else {
                let v: f64 = field.parse().map_err(|_| {
                    format_error(path, line_no, format!("invalid value '{}'", field))
                })?;
                row.push(v);
            }
        }
        rows.push(row);
    }

    let n = times.len();
    let mut values = Array2::from_elem((n, components.len()), f64::NAN);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            values[[i, j]] = v;
        }
    }

    ConcentrationData::new(Array1::from_vec(times), components, values)
}

/// Write concentration measurements as wide CSV (missing entries become empty cells).
pub fn write_concentration_csv<P: AsRef<Path>>(data: &ConcentrationData, path: P) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;

    let mut header = vec!["time".to_string()];
    header.extend(data.components().iter().cloned());
    writer.write_record(&header)?;

    for (i, &t) in data.times().iter().enumerate() {
        let mut record = vec![t.to_string()];
        for j in 0..data.n_components() {
            let v = data.values()[[i, j]];
            record.push(if v.is_nan() { String::new() } else { v.to_string() });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a spectral dataset from wide CSV (`time,<wavelength>,<wavelength>,...`).
pub fn read_spectral_csv<P: AsRef<Path>>(path: P) -> Result<SpectralData> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(format_error(path, 1, "expected a time column and at least one wavelength"));
    }
    let mut wavelengths = Vec::with_capacity(headers.len() - 1);
    for h in headers.iter().skip(1) {
        let wl: f64 = h
            .trim()
            .parse()
            .map_err(|_| format_error(path, 1, format!("invalid wavelength header '{}'", h)))?;
        wavelengths.push(wl);
    }

    let mut times = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line_no = idx + 2;
        let record = record?;
        if record.len() != headers.len() {
            return Err(format_error(
                path,
                line_no,
                format!("expected {} fields, found {}", headers.len(), record.len()),
            ));
        }
        let t: f64 = record[0]
            .trim()
            .parse()
            .map_err(|_| format_error(path, line_no, format!("invalid time '{}'", &record[0])))?;
        times.push(t);

        let mut row = Vec::with_capacity(wavelengths.len());
        for field in record.iter().skip(1) {
            let v: f64 = field.trim().parse().map_err(|_| {
                format_error(path, line_no, format!("invalid value '{}'", field))
            })?;
            row.push(v);
        }
        rows.push(row);
    }

    let n = times.len();
    let mut absorbance = Array2::zeros((n, wavelengths.len()));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            absorbance[[i, j]] = v;
        }
    }

    SpectralData::new(
        Array1::from_vec(times),
        Array1::from_vec(wavelengths),
        absorbance,
    )
}

/// Write a spectral dataset as wide CSV.
pub fn write_spectral_csv<P: AsRef<Path>>(data: &SpectralData, path: P) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;

    let mut header = vec!["time".to_string()];
    header.extend(data.wavelengths().iter().map(|wl| wl.to_string()));
    writer.write_record(&header)?;

    for (i, &t) in data.times().iter().enumerate() {
        let mut record = vec![t.to_string()];
        for j in 0..data.n_wavelengths() {
            record.push(data.absorbance()[[i, j]].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

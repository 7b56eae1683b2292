//! Measured datasets: concentration profiles and spectra.
//!
//! Two kinds of measurements drive an estimation: concentration data (time x
//! component, possibly sparse) and spectral data (a dense time x wavelength
//! absorbance matrix `D`). Both are read from the plain-text triplet format or from
//! wide CSV files, see [`crate::data::io`].

pub mod io;

use crate::error::{KinFitError, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Measured concentration profiles for a set of components.
///
/// Stored as a times x components matrix; missing measurements are NaN and are
/// skipped when residuals are formed.
#[derive(Debug, Clone)]
pub struct ConcentrationData {
    times: Array1<f64>,
    components: Vec<String>,
    values: Array2<f64>,
}

impl ConcentrationData {
    /// Create from a time grid, component names and a times x components matrix.
    pub fn new(times: Array1<f64>, components: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != times.len() || values.ncols() != components.len() {
            return Err(KinFitError::DimensionMismatch(format!(
                "concentration matrix is {}x{}, expected {}x{}",
                values.nrows(),
                values.ncols(),
                times.len(),
                components.len()
            )));
        }
        if !times.windows(2).into_iter().all(|w| w[0] < w[1]) {
            return Err(KinFitError::InvalidInput(
                "measurement times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            times,
            components,
            values,
        })
    }

    /// Build from per-component columns sharing one time grid.
    pub fn from_columns(times: Vec<f64>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n = times.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Array2::from_elem((n, columns.len()), f64::NAN);
        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != n {
                return Err(KinFitError::DimensionMismatch(format!(
                    "column '{}' has {} entries, expected {}",
                    name,
                    column.len(),
                    n
                )));
            }
            for (i, v) in column.into_iter().enumerate() {
                values[[i, j]] = v;
            }
            names.push(name);
        }
        Self::new(Array1::from_vec(times), names, values)
    }

    /// Measurement times.
    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    /// Component names, in column order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The times x components measurement matrix (NaN marks a missing entry).
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Column view for one component.
    pub fn column(&self, component: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.components.iter().position(|c| c == component)?;
        Some(self.values.column(j))
    }

    /// Number of measurement times.
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Number of measured components.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Number of actual (non-NaN) measurements.
    pub fn n_measurements(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// First and last measurement time.
    pub fn span(&self) -> Option<(f64, f64)> {
        match self.times.len() {
            0 => None,
            n => Some((self.times[0], self.times[n - 1])),
        }
    }
}

/// A dense spectral dataset: absorbance `D` on a time x wavelength grid.
#[derive(Debug, Clone)]
pub struct SpectralData {
    times: Array1<f64>,
    wavelengths: Array1<f64>,
    absorbance: Array2<f64>,
}

impl SpectralData {
    /// Create from a time grid, wavelength grid and a times x wavelengths matrix.
    ///
    /// The grid must be complete: NaN entries are rejected.
    pub fn new(
        times: Array1<f64>,
        wavelengths: Array1<f64>,
        absorbance: Array2<f64>,
    ) -> Result<Self> {
        if absorbance.nrows() != times.len() || absorbance.ncols() != wavelengths.len() {
            return Err(KinFitError::DimensionMismatch(format!(
                "absorbance matrix is {}x{}, expected {}x{}",
                absorbance.nrows(),
                absorbance.ncols(),
                times.len(),
                wavelengths.len()
            )));
        }
        if absorbance.iter().any(|v| v.is_nan()) {
            return Err(KinFitError::InvalidInput(
                "spectral data must cover the full time x wavelength grid".to_string(),
            ));
        }
        if !times.windows(2).into_iter().all(|w| w[0] < w[1]) {
            return Err(KinFitError::InvalidInput(
                "measurement times must be strictly increasing".to_string(),
            ));
        }
        if !wavelengths.windows(2).into_iter().all(|w| w[0] < w[1]) {
            return Err(KinFitError::InvalidInput(
                "wavelengths must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            times,
            wavelengths,
            absorbance,
        })
    }

    /// Measurement times.
    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    /// Wavelength grid.
    pub fn wavelengths(&self) -> &Array1<f64> {
        &self.wavelengths
    }

    /// The times x wavelengths absorbance matrix.
    pub fn absorbance(&self) -> &Array2<f64> {
        &self.absorbance
    }

    /// Number of measurement times.
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Number of wavelengths.
    pub fn n_wavelengths(&self) -> usize {
        self.wavelengths.len()
    }

    /// First and last measurement time.
    pub fn span(&self) -> Option<(f64, f64)> {
        match self.times.len() {
            0 => None,
            n => Some((self.times[0], self.times[n - 1])),
        }
    }

    /// Keep every `step`-th wavelength, discarding the rest.
    ///
    /// A cheap way to thin dense spectrometer grids before estimation; `step` of 0
    /// or 1 leaves the data unchanged.
    pub fn decrease_wavelengths(&mut self, step: usize) {
        if step <= 1 {
            return;
        }
        let keep: Vec<usize> = (0..self.wavelengths.len()).step_by(step).collect();
        let wavelengths = Array1::from_iter(keep.iter().map(|&j| self.wavelengths[j]));
        let mut absorbance = Array2::zeros((self.times.len(), keep.len()));
        for (new_j, &old_j) in keep.iter().enumerate() {
            absorbance.column_mut(new_j).assign(&self.absorbance.column(old_j));
        }
        self.wavelengths = wavelengths;
        self.absorbance = absorbance;
    }

    /// Multiplicative scatter correction against the mean spectrum.
    ///
    /// Each spectrum is regressed on the mean spectrum (`x ~ a*m + b`) and replaced
    /// by `(x - b) / a`. Spectra with no variation against the mean are left alone.
    pub fn msc(&mut self) {
        let n_times = self.times.len();
        let n_wl = self.wavelengths.len();
        if n_times == 0 || n_wl < 2 {
            return;
        }

        let Some(mean_spectrum) = self.absorbance.mean_axis(ndarray::Axis(0)) else {
            return;
        };
        let m_mean = mean_spectrum.mean().unwrap_or(0.0);
        let m_var: f64 = mean_spectrum.iter().map(|m| (m - m_mean).powi(2)).sum();
        if m_var <= f64::EPSILON {
            return;
        }

        for mut row in self.absorbance.rows_mut() {
            let x_mean = row.mean().unwrap_or(0.0);
            let cov: f64 = row
                .iter()
                .zip(mean_spectrum.iter())
                .map(|(x, m)| (m - m_mean) * (x - x_mean))
                .sum();
            let a = cov / m_var;
            if a.abs() <= f64::EPSILON {
                continue;
            }
            let b = x_mean - a * m_mean;
            row.mapv_inplace(|x| (x - b) / a);
        }
    }
}

//! The estimation objective: simulate, then compare against the data.
//!
//! Concentration residuals weight each measured point by its component variance.
//! Spectral residuals use the separable structure of `D = Z * S^T`: with the
//! trajectories `Z` fixed by the trial parameters, the absorbance profiles `S` are
//! the solution of a linear least-squares subproblem per wavelength, and the
//! residual is the weighted reconstruction error of `D`.

use crate::data::{ConcentrationData, SpectralData};
use crate::error::{KinFitError, Result};
use crate::estimate::DEVICE_VARIANCE_KEY;
use crate::parameters::Parameters;
use crate::problem::{check_parameter_len, Problem};
use crate::simulate::Simulator;
use crate::utils::linalg::clamped_lstsq;
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Nonlinear least-squares problem for kinetic parameter estimation.
#[derive(Debug, Clone)]
pub struct EstimationProblem {
    simulator: Simulator,
    parameters: Parameters,
    components: Vec<String>,
    concentration: Option<ConcentrationData>,
    spectra: Option<SpectralData>,
    /// Column mapping: concentration data column -> model component index
    conc_columns: Vec<usize>,
    /// Variances keyed by component name plus "device"
    variances: HashMap<String, f64>,
    /// Bounds applied to the absorbance profiles solved from `D`
    s_bounds: (f64, f64),
}

impl EstimationProblem {
    /// Assemble the estimation problem.
    ///
    /// `components` is the model's component order (the columns of `Z`). Every
    /// component in the concentration dataset must be a declared model component.
    pub fn new(
        simulator: Simulator,
        parameters: Parameters,
        components: Vec<String>,
        concentration: Option<ConcentrationData>,
        spectra: Option<SpectralData>,
        variances: HashMap<String, f64>,
        s_bounds: (f64, f64),
    ) -> Result<Self> {
        if concentration.is_none() && spectra.is_none() {
            return Err(KinFitError::InvalidModel(
                "estimation needs a concentration or spectral dataset".to_string(),
            ));
        }
        if parameters.free().is_empty() {
            return Err(KinFitError::InvalidModel(
                "estimation needs at least one free parameter".to_string(),
            ));
        }

        let mut conc_columns = Vec::new();
        if let Some(data) = &concentration {
            for name in data.components() {
                let j = components
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| KinFitError::UnknownVariable(name.clone()))?;
                conc_columns.push(j);
            }
        }

        Ok(Self {
            simulator,
            parameters,
            components,
            concentration,
            spectra,
            conc_columns,
            variances,
            s_bounds,
        })
    }

    /// The parameter set backing this problem.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Initial internal parameter vector for the optimizer.
    pub fn initial_internal(&self) -> Result<Array1<f64>> {
        Ok(Array1::from_vec(
            self.parameters
                .free_internal_values()
                .map_err(KinFitError::from)?,
        ))
    }

    /// Parameters with the internal optimizer vector written back in.
    pub fn realize(&self, internal: &Array1<f64>) -> Result<Parameters> {
        let mut params = self.parameters.clone();
        params
            .update_from_internal(&internal.to_vec())
            .map_err(KinFitError::from)?;
        Ok(params)
    }

    /// Simulate with the given parameter values.
    pub fn simulate(&self, params: &Parameters) -> Result<crate::simulate::SimulationResults> {
        self.simulator.with_constants(params.value_map()).run()
    }

    // Floor for estimated variances: a perfect variance fit (noise-free data)
    // would otherwise send the residual weights to infinity.
    const MIN_VARIANCE: f64 = 1e-12;

    fn variance_of(&self, component: &str) -> f64 {
        self.variances
            .get(component)
            .copied()
            .unwrap_or(1.0)
            .max(Self::MIN_VARIANCE)
    }

    fn device_variance(&self) -> f64 {
        self.variances
            .get(DEVICE_VARIANCE_KEY)
            .copied()
            .unwrap_or(1.0)
            .max(Self::MIN_VARIANCE)
    }

    /// Solve the per-wavelength linear subproblem for the absorbance profiles.
    ///
    /// `z_meas` is times x components (trajectories at measurement times), `d` is
    /// times x wavelengths; the result is wavelengths x components, clamped into
    /// the profile bounds.
    pub fn solve_profiles(
        z_meas: &Array2<f64>,
        d: &Array2<f64>,
        s_bounds: (f64, f64),
    ) -> Result<Array2<f64>> {
        let n_wl = d.ncols();
        let n_comp = z_meas.ncols();
        if d.nrows() != z_meas.nrows() {
            return Err(KinFitError::DimensionMismatch(format!(
                "{} spectra but {} trajectory rows",
                d.nrows(),
                z_meas.nrows()
            )));
        }

        let mut s = Array2::zeros((n_wl, n_comp));
        for l in 0..n_wl {
            let b = d.column(l).to_owned();
            let coeffs = clamped_lstsq(z_meas, &b, s_bounds.0, s_bounds.1)?;
            s.row_mut(l).assign(&coeffs);
        }
        Ok(s)
    }

    /// Reconstructed spectra `Z * S^T` for given trajectories and profiles.
    pub fn reconstruct(z_meas: &Array2<f64>, s: &Array2<f64>) -> Array2<f64> {
        z_meas.dot(&s.t())
    }
}

impl Problem for EstimationProblem {
    fn eval(&self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        check_parameter_len(self, internal)?;
        let params = self.realize(internal)?;
        let results = self.simulate(&params)?;

        let mut residuals = Vec::with_capacity(self.residual_count());

        if let Some(data) = &self.concentration {
            let query: Vec<f64> = data.times().to_vec();
            let z_meas = results.z_at(&query);
            for (col, (&model_col, name)) in self
                .conc_columns
                .iter()
                .zip(data.components().iter())
                .enumerate()
            {
                let weight = 1.0 / self.variance_of(name).sqrt();
                for i in 0..data.n_times() {
                    let measured = data.values()[[i, col]];
                    if measured.is_nan() {
                        continue;
                    }
                    residuals.push((measured - z_meas[[i, model_col]]) * weight);
                }
            }
        }

        if let Some(data) = &self.spectra {
            let query: Vec<f64> = data.times().to_vec();
            let z_meas = results.z_at(&query);
            let s = Self::solve_profiles(&z_meas, data.absorbance(), self.s_bounds)?;
            let d_hat = Self::reconstruct(&z_meas, &s);
            let weight = 1.0 / self.device_variance().sqrt();
            for i in 0..data.n_times() {
                for l in 0..data.n_wavelengths() {
                    residuals.push((data.absorbance()[[i, l]] - d_hat[[i, l]]) * weight);
                }
            }
        }

        Ok(Array1::from_vec(residuals))
    }

    fn parameter_count(&self) -> usize {
        self.parameters.free().len()
    }

    fn residual_count(&self) -> usize {
        let conc = self
            .concentration
            .as_ref()
            .map(|d| d.n_measurements())
            .unwrap_or(0);
        let spectral = self
            .spectra
            .as_ref()
            .map(|d| d.n_times() * d.n_wavelengths())
            .unwrap_or(0);
        conc + spectral
    }
}

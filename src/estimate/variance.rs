//! Variance estimation from spectral data.
//!
//! Before fitting parameters to spectra, the noise structure has to be known:
//! how much variance each component contributes and how much is instrument
//! (device) noise. The estimator alternates three linear/nonlinear sweeps until
//! the concentration trajectories stop moving:
//!
//! 1. absorbance profiles `S` from `D` with the current concentrations fixed,
//! 2. concentrations `C` from `D` with `S` fixed,
//! 3. a short parameter refit of the model trajectories `Z` against `C`.
//!
//! Afterwards the per-component and device variances come from one linear solve
//! over the squared reconstruction error per wavelength.

use crate::data::SpectralData;
use crate::error::{KinFitError, Result};
use crate::estimate::problem::EstimationProblem;
use crate::estimate::DEVICE_VARIANCE_KEY;
use crate::lm::LevenbergMarquardt;
use crate::parameters::Parameters;
use crate::problem::{check_parameter_len, Problem};
use crate::simulate::Simulator;
use crate::utils::linalg::{clamped_lstsq, qr_lstsq};
use log::info;
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Outcome of variance estimation.
#[derive(Debug, Clone)]
pub struct VarianceResult {
    /// Estimated variances keyed by component name, plus `"device"`
    pub sigma_sq: HashMap<String, f64>,

    /// Concentration estimates at the measurement times (times x components)
    pub c: Array2<f64>,

    /// Absorbance profiles (wavelengths x components)
    pub s: Array2<f64>,

    /// Parameters after the embedded refits
    pub parameters: Parameters,

    /// Alternating sweeps performed
    pub iterations: usize,

    /// Whether the trajectory change dropped below tolerance
    pub converged: bool,
}

/// Inner problem: fit the model trajectories to the current concentration
/// estimates.
struct TrajectoryFit<'a> {
    simulator: &'a Simulator,
    parameters: Parameters,
    times: Vec<f64>,
    c: &'a Array2<f64>,
}

impl Problem for TrajectoryFit<'_> {
    fn eval(&self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        check_parameter_len(self, internal)?;
        let mut params = self.parameters.clone();
        params
            .update_from_internal(&internal.to_vec())
            .map_err(KinFitError::from)?;

        let results = self.simulator.with_constants(params.value_map()).run()?;
        let z_meas = results.z_at(&self.times);

        let mut residuals = Vec::with_capacity(self.residual_count());
        for i in 0..z_meas.nrows() {
            for j in 0..z_meas.ncols() {
                residuals.push(z_meas[[i, j]] - self.c[[i, j]]);
            }
        }
        Ok(Array1::from_vec(residuals))
    }

    fn parameter_count(&self) -> usize {
        self.parameters.free().len()
    }

    fn residual_count(&self) -> usize {
        self.c.nrows() * self.c.ncols()
    }
}

/// Alternating variance estimator for spectral datasets.
#[derive(Debug, Clone)]
pub struct VarianceEstimator {
    max_iter: usize,
    tolerance: f64,
    tee: bool,
    s_bounds: (f64, f64),
}

impl VarianceEstimator {
    /// Configure from the model settings and the profile bounds.
    pub fn new(settings: &crate::settings::Settings, s_bounds: (f64, f64)) -> Self {
        Self {
            max_iter: settings.variance_estimator.max_iter,
            tolerance: settings.variance_estimator.tolerance,
            tee: settings.variance_estimator.tee,
            s_bounds,
        }
    }

    /// Run the alternating scheme.
    ///
    /// `components` is the model component order (columns of `Z`), `simulator`
    /// the compiled model, `parameters` the current parameter estimates.
    pub fn run(
        &self,
        simulator: &Simulator,
        parameters: &Parameters,
        components: &[String],
        spectra: &SpectralData,
    ) -> Result<VarianceResult> {
        if spectra.n_times() < components.len() {
            return Err(KinFitError::InvalidInput(format!(
                "variance estimation needs at least as many spectra ({}) as components ({})",
                spectra.n_times(),
                components.len()
            )));
        }

        let times: Vec<f64> = spectra.times().to_vec();
        let d = spectra.absorbance();

        let mut params = parameters.clone();
        let mut z_prev = simulator
            .with_constants(params.value_map())
            .run()?
            .z_at(&times);
        let mut c = z_prev.clone();
        let mut s = EstimationProblem::solve_profiles(&c, d, self.s_bounds)?;

        if self.tee {
            info!("{:>11} {:>16}", "Iter", "|Zi-Zi+1|");
        }

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            iterations += 1;

            // S from D given C, then C from D given S
            s = EstimationProblem::solve_profiles(&c, d, self.s_bounds)?;
            c = solve_concentrations(&s, d)?;

            // Pull the model towards the concentration estimates
            if !params.free().is_empty() {
                let fit = TrajectoryFit {
                    simulator,
                    parameters: params.clone(),
                    times: times.clone(),
                    c: &c,
                };
                let initial = Array1::from_vec(
                    params.free_internal_values().map_err(KinFitError::from)?,
                );
                let lm = LevenbergMarquardt::new()
                    .with_max_iterations(20)
                    .minimize(&fit, initial)?;
                params.update_from_internal(&lm.params.to_vec())
                    .map_err(KinFitError::from)?;
            }

            let z = simulator
                .with_constants(params.value_map())
                .run()?
                .z_at(&times);

            let mut norm_diff = 0.0;
            for (a, b) in z.iter().zip(z_prev.iter()) {
                norm_diff += (a - b).powi(2);
            }
            let norm_diff = norm_diff.sqrt();

            if self.tee {
                info!("{:>10} {:>20.12e}", iterations, norm_diff);
            }

            z_prev = z;
            if norm_diff < self.tolerance {
                converged = true;
                break;
            }
        }

        let sigma_sq = solve_variances(&s, &z_prev, d, components)?;

        Ok(VarianceResult {
            sigma_sq,
            c,
            s,
            parameters: params,
            iterations,
            converged,
        })
    }
}

/// Solve the concentrations at each measurement time from `D` given `S`
/// (nonnegative least squares per spectrum).
fn solve_concentrations(s: &Array2<f64>, d: &Array2<f64>) -> Result<Array2<f64>> {
    let n_times = d.nrows();
    let n_comp = s.ncols();
    let mut c = Array2::zeros((n_times, n_comp));
    for i in 0..n_times {
        let b = d.row(i).to_owned();
        let row = clamped_lstsq(s, &b, 0.0, f64::INFINITY)?;
        c.row_mut(i).assign(&row);
    }
    Ok(c)
}

/// Per-component and device variances from the squared reconstruction error.
///
/// Builds `A w = b` with `A[l, k] = S[l, k]^2` plus a trailing ones column for
/// the device term, and `b[l]` the time-averaged squared residual of `D` at
/// wavelength `l`. Negative solutions are clamped to zero.
fn solve_variances(
    s: &Array2<f64>,
    z: &Array2<f64>,
    d: &Array2<f64>,
    components: &[String],
) -> Result<HashMap<String, f64>> {
    let n_wl = s.nrows();
    let n_comp = s.ncols();
    let n_times = d.nrows();
    if n_comp != components.len() {
        return Err(KinFitError::DimensionMismatch(format!(
            "{} profile columns for {} components",
            n_comp,
            components.len()
        )));
    }

    let d_hat = z.dot(&s.t());

    let mut a = Array2::ones((n_wl, n_comp + 1));
    let mut b = Array1::zeros(n_wl);
    for l in 0..n_wl {
        for k in 0..n_comp {
            a[[l, k]] = s[[l, k]].powi(2);
        }
        let mut acc = 0.0;
        for t in 0..n_times {
            acc += (d[[t, l]] - d_hat[[t, l]]).powi(2);
        }
        b[l] = acc / n_times as f64;
    }

    let w = qr_lstsq(&a, &b)?;

    let mut sigma_sq = HashMap::new();
    for (k, name) in components.iter().enumerate() {
        sigma_sq.insert(name.clone(), w[k].max(0.0));
    }
    sigma_sq.insert(DEVICE_VARIANCE_KEY.to_string(), w[n_comp].max(0.0));
    Ok(sigma_sq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RateExpr;
    use crate::ode::OdeSystem;
    use crate::settings::Settings;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn simulator(k1: f64) -> Simulator {
        let mut constants = HashMap::new();
        constants.insert("k1".to_string(), k1);
        let system = OdeSystem::new(
            vec!["A".to_string(), "B".to_string()],
            vec![
                RateExpr::parse("-k1 * A").unwrap(),
                RateExpr::parse("k1 * A").unwrap(),
            ],
            constants,
            vec![],
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.collocation.nfe = 40;
        settings.collocation.ncp = 1;
        Simulator::new(system, vec![1.0, 0.0], 2, 0.0, 4.0, &settings).unwrap()
    }

    fn synthetic_spectra(k1: f64, noise: f64) -> SpectralData {
        let times: Vec<f64> = (0..21).map(|i| i as f64 * 0.2).collect();
        let z = simulator(k1).run().unwrap().z_at(&times);

        // Distinct absorbance fingerprints per component over 8 wavelengths
        let wavelengths: Vec<f64> = (0..8).map(|j| 200.0 + 10.0 * j as f64).collect();
        let mut s = Array2::zeros((8, 2));
        for l in 0..8 {
            let x = l as f64 / 7.0;
            s[[l, 0]] = 2.0 * (-(x - 0.3_f64).powi(2) / 0.05).exp();
            s[[l, 1]] = 1.5 * (-(x - 0.7_f64).powi(2) / 0.08).exp();
        }

        let mut d = z.dot(&s.t());
        if noise > 0.0 {
            let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
            let dist = Normal::new(0.0, noise).unwrap();
            d.mapv_inplace(|v| v + dist.sample(&mut rng));
        }

        SpectralData::new(
            Array1::from_vec(times),
            Array1::from_vec(wavelengths),
            d,
        )
        .unwrap()
    }

    #[test]
    fn test_noise_free_spectra_give_tiny_variances() {
        let spectra = synthetic_spectra(0.8, 0.0);
        let mut params = Parameters::new();
        params.add_param_with_bounds("k1", 0.8, 0.0, 10.0).unwrap();

        let estimator = VarianceEstimator::new(&Settings::default(), (0.0, f64::INFINITY));
        let result = estimator
            .run(
                &simulator(0.8),
                &params,
                &["A".to_string(), "B".to_string()],
                &spectra,
            )
            .unwrap();

        assert!(result.converged);
        for key in ["A", "B", DEVICE_VARIANCE_KEY] {
            let sigma = result.sigma_sq[key];
            assert!(sigma < 1e-8, "sigma_sq[{}] = {} too large", key, sigma);
        }
    }

    #[test]
    fn test_device_noise_is_detected() {
        let noise = 1e-2;
        let spectra = synthetic_spectra(0.8, noise);
        let mut params = Parameters::new();
        params.add_param_with_bounds("k1", 0.6, 0.0, 10.0).unwrap();

        let estimator = VarianceEstimator::new(&Settings::default(), (0.0, f64::INFINITY));
        let result = estimator
            .run(
                &simulator(0.6),
                &params,
                &["A".to_string(), "B".to_string()],
                &spectra,
            )
            .unwrap();

        // The device variance estimate should land near noise^2
        let device = result.sigma_sq[DEVICE_VARIANCE_KEY];
        assert!(
            device > 1e-6 && device < 1e-2,
            "device variance {} out of range",
            device
        );

        // And the embedded refits should have pulled k1 towards the truth
        let k1 = result.parameters.get("k1").unwrap().value();
        assert_relative_eq!(k1, 0.8, epsilon = 0.1);
    }

    #[test]
    fn test_too_few_spectra_rejected() {
        let times = vec![0.0];
        let d = Array2::from_elem((1, 3), 0.5);
        let spectra = SpectralData::new(
            Array1::from_vec(times),
            array![200.0, 210.0, 220.0],
            d,
        )
        .unwrap();

        let mut params = Parameters::new();
        params.add_param("k1", 1.0).unwrap();

        let estimator = VarianceEstimator::new(&Settings::default(), (0.0, f64::INFINITY));
        let result = estimator.run(
            &simulator(1.0),
            &params,
            &["A".to_string(), "B".to_string()],
            &spectra,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_solve_variances_recovers_device_term() {
        // Constant known residual level: b[l] = sigma_dev^2 exactly when S = 0
        let s = Array2::zeros((4, 1));
        let z = Array2::from_elem((5, 1), 1.0);
        let mut d = Array2::zeros((5, 4));
        d.mapv_inplace(|_| 0.1);

        let sigma = solve_variances(&s, &z, &d, &["A".to_string()]).unwrap();
        // d_hat = 0 everywhere, so b[l] = 0.01 and the device column absorbs it
        assert_relative_eq!(sigma[DEVICE_VARIANCE_KEY], 0.01, epsilon = 1e-10);
        assert_eq!(sigma["A"], 0.0);
    }
}

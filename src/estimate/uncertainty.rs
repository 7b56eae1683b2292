//! Uncertainty quantification for fitted parameters.
//!
//! Covariance estimation from the Jacobian at the solution, standard errors,
//! correlation, confidence intervals from stderr multiples, and Monte-Carlo
//! propagation by sampling parameter sets from the covariance.

use crate::error::{KinFitError, Result};
use crate::utils::linalg::{cholesky_factor, spd_inverse};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::collections::HashMap;

/// A confidence interval at one probability level.
#[derive(Debug, Clone)]
pub struct ConfidenceInterval {
    /// The probability level (e.g. 0.6827 for 1-sigma)
    pub probability: f64,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

/// Covariance matrix from the Jacobian at the solution.
///
/// `covar = redchi * inv(J^T J)`, the standard estimate for nonlinear least
/// squares near the optimum.
pub fn covariance_from_jacobian(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let inv = spd_inverse(&jtj).map_err(|e| match e {
        KinFitError::SingularMatrix => KinFitError::ComputationError(
            "Jacobian is rank deficient; covariance is not available".to_string(),
        ),
        other => other,
    })?;
    Ok(inv * redchi)
}

/// Correlation matrix from a covariance matrix.
pub fn correlation_from_covariance(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                correl[[i, j]] = if denom > 0.0 { covar[[i, j]] / denom } else { 0.0 };
            }
        }
    }
    correl
}

/// Standard errors: square roots of the covariance diagonal.
pub fn standard_errors(covar: &Array2<f64>) -> Array1<f64> {
    Array1::from_iter(
        covar
            .diag()
            .iter()
            .map(|&v| if v > 0.0 { v.sqrt() } else { 0.0 }),
    )
}

/// Abramowitz & Stegun 7.1.26 rational approximation of erf (|error| < 1.5e-7).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Two-sided probability mass within `sigma` standard deviations of a normal.
pub fn sigma_to_probability(sigma: f64) -> f64 {
    erf(sigma / std::f64::consts::SQRT_2)
}

/// Inverse of [`sigma_to_probability`] by bisection on [0, 10].
pub fn probability_to_sigma(prob: f64) -> f64 {
    let prob = prob.clamp(0.0, 1.0 - 1e-12);
    let (mut lo, mut hi) = (0.0_f64, 10.0_f64);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if sigma_to_probability(mid) < prob {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Confidence intervals `value +/- sigma * stderr` for each named parameter.
pub fn confidence_intervals(
    names: &[String],
    values: &[f64],
    std_errors: &Array1<f64>,
    sigmas: &[f64],
) -> HashMap<String, Vec<ConfidenceInterval>> {
    let mut intervals = HashMap::new();

    for (i, name) in names.iter().enumerate() {
        if i >= values.len() || i >= std_errors.len() {
            break;
        }
        let value = values[i];
        let stderr = std_errors[i];

        let levels = sigmas
            .iter()
            .map(|&sigma| ConfidenceInterval {
                probability: sigma_to_probability(sigma),
                lower: value - sigma * stderr,
                upper: value + sigma * stderr,
            })
            .collect();
        intervals.insert(name.clone(), levels);
    }

    intervals
}

/// Result of Monte-Carlo uncertainty propagation.
#[derive(Debug, Clone)]
pub struct MonteCarloResult {
    /// Sampled parameter sets, one row per draw
    pub parameter_sets: Vec<Array1<f64>>,
    /// Per-parameter sample means
    pub means: Array1<f64>,
    /// Per-parameter sample standard deviations
    pub stds: Array1<f64>,
}

/// Sample parameter sets from a multivariate normal defined by the covariance.
///
/// Draws `values + L z` with `L` the Cholesky factor of the covariance and `z`
/// standard normal.
pub fn monte_carlo_covariance<R: Rng>(
    values: &Array1<f64>,
    covar: &Array2<f64>,
    n_samples: usize,
    rng: &mut R,
) -> Result<MonteCarloResult> {
    let n = values.len();
    if covar.nrows() != n || covar.ncols() != n {
        return Err(KinFitError::DimensionMismatch(format!(
            "covariance is {}x{}, expected {}x{}",
            covar.nrows(),
            covar.ncols(),
            n,
            n
        )));
    }

    let l = cholesky_factor(covar)?;
    let mut sets = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let z: Array1<f64> =
            Array1::from_iter((0..n).map(|_| StandardNormal.sample(rng)));
        let sample = values + &l.dot(&z);
        sets.push(sample);
    }

    let mut means = Array1::zeros(n);
    for set in &sets {
        means = means + set;
    }
    means /= n_samples.max(1) as f64;

    let mut stds = Array1::zeros(n);
    if n_samples > 1 {
        for set in &sets {
            for i in 0..n {
                stds[i] += (set[i] - means[i]).powi(2);
            }
        }
        stds.mapv_inplace(|v: f64| (v / (n_samples - 1) as f64).sqrt());
    }

    Ok(MonteCarloResult {
        parameter_sets: sets,
        means,
        stds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr2, array};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_covariance_from_jacobian() {
        // Orthogonal-ish Jacobian with known J^T J
        let jac = arr2(&[[1.0, 0.0], [0.0, 2.0], [1.0, 0.0]]);
        // J^T J = [[2, 0], [0, 4]] -> inv = [[0.5, 0], [0, 0.25]]
        let covar = covariance_from_jacobian(&jac, 2.0).unwrap();
        assert_relative_eq!(covar[[0, 0]], 1.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 1]], 0.5, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rank_deficient_jacobian_rejected() {
        let jac = arr2(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        assert!(covariance_from_jacobian(&jac, 1.0).is_err());
    }

    #[test]
    fn test_correlation_matrix() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);
        let correl = correlation_from_covariance(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1_f64 * 0.2).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors() {
        let covar = arr2(&[[0.04, 0.0], [0.0, 0.25]]);
        let errors = standard_errors(&covar);
        assert_relative_eq!(errors[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(errors[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sigma_probability_conversion() {
        assert_relative_eq!(sigma_to_probability(1.0), 0.6827, epsilon = 1e-3);
        assert_relative_eq!(sigma_to_probability(2.0), 0.9545, epsilon = 1e-3);
        assert_relative_eq!(sigma_to_probability(3.0), 0.9973, epsilon = 1e-3);

        for &sigma in &[0.5, 1.0, 2.0] {
            let prob = sigma_to_probability(sigma);
            assert_relative_eq!(probability_to_sigma(prob), sigma, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_confidence_intervals() {
        let names = vec!["k1".to_string(), "k2".to_string()];
        let values = [2.0, 0.5];
        let std_errors = array![0.1, 0.02];

        let intervals = confidence_intervals(&names, &values, &std_errors, &[1.0, 2.0]);
        assert_eq!(intervals.len(), 2);

        let k1 = &intervals["k1"];
        assert_eq!(k1.len(), 2);
        assert_relative_eq!(k1[0].lower, 1.9, epsilon = 1e-12);
        assert_relative_eq!(k1[0].upper, 2.1, epsilon = 1e-12);
        assert_relative_eq!(k1[1].lower, 1.8, epsilon = 1e-12);
        assert_relative_eq!(k1[1].upper, 2.2, epsilon = 1e-12);
    }

    #[test]
    fn test_monte_carlo_statistics() {
        let values = array![2.0, 0.5];
        let covar = arr2(&[[0.04, 0.0], [0.0, 0.01]]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mc = monte_carlo_covariance(&values, &covar, 2000, &mut rng).unwrap();
        assert_eq!(mc.parameter_sets.len(), 2000);

        // Sample statistics should approach the inputs
        assert_relative_eq!(mc.means[0], 2.0, epsilon = 0.02);
        assert_relative_eq!(mc.means[1], 0.5, epsilon = 0.01);
        assert_relative_eq!(mc.stds[0], 0.2, epsilon = 0.02);
        assert_relative_eq!(mc.stds[1], 0.1, epsilon = 0.01);
    }
}

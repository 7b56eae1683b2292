//! The parameter estimator: Levenberg-Marquardt plus uncertainty analysis.
//!
//! Runs the optimizer over an [`EstimationProblem`], writes the fitted values and
//! standard errors back into the parameter set, and derives chi-square statistics,
//! covariance, correlation and confidence intervals from the Jacobian at the
//! solution.

use crate::error::Result;
use crate::estimate::problem::EstimationProblem;
use crate::estimate::uncertainty::{
    confidence_intervals, correlation_from_covariance, covariance_from_jacobian, standard_errors,
    ConfidenceInterval,
};
use crate::lm::{LevenbergMarquardt, LmResult};
use crate::parameters::Parameters;
use crate::problem::Problem;
use crate::settings::Settings;
use log::{info, warn};
use ndarray::Array2;
use std::collections::HashMap;

/// Everything a parameter fit produces.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Fitted parameters, standard errors attached
    pub parameters: Parameters,

    /// Raw optimizer diagnostics
    pub lm: LmResult,

    /// Chi-square (weighted sum of squared residuals) at the solution
    pub chisqr: f64,

    /// Reduced chi-square, `chisqr / nfree`
    pub redchi: f64,

    /// Degrees of freedom, `n_residuals - n_free_parameters`
    pub nfree: usize,

    /// Covariance of the free parameters (external space), when available
    pub covariance: Option<Array2<f64>>,

    /// Correlation matrix of the free parameters, when available
    pub correlation: Option<Array2<f64>>,

    /// Confidence intervals per free parameter at the configured sigma levels
    pub confidence: HashMap<String, Vec<ConfidenceInterval>>,
}

/// Drives the Levenberg-Marquardt fit for a reaction model.
#[derive(Debug, Clone)]
pub struct ParameterEstimator {
    max_iterations: usize,
    sigmas: Vec<f64>,
    tee: bool,
}

impl ParameterEstimator {
    /// Configure the estimator from the model settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            max_iterations: settings.parameter_estimator.max_iterations,
            sigmas: settings.parameter_estimator.sigmas.clone(),
            tee: settings.parameter_estimator.tee,
        }
    }

    /// Run the fit and the subsequent uncertainty analysis.
    pub fn run(&self, problem: &EstimationProblem) -> Result<FitOutcome> {
        let initial = problem.initial_internal()?;

        let optimizer = LevenbergMarquardt::new()
            .with_max_iterations(self.max_iterations)
            .with_calc_jacobian(true);
        let lm = optimizer.minimize(problem, initial)?;

        if self.tee {
            info!(
                "parameter estimation finished: {} (cost {:.6e}, {} iterations)",
                lm.message, lm.cost, lm.iterations
            );
        }

        let mut parameters = problem.realize(&lm.params)?;
        let free_names = parameters.free_names();

        let ndata = problem.residual_count();
        let nvarys = problem.parameter_count();
        let nfree = if ndata > nvarys { ndata - nvarys } else { 1 };
        let chisqr = lm.cost;
        let redchi = chisqr / nfree as f64;

        // Covariance in internal space, then mapped through the bounds transform
        let mut covariance = None;
        let mut correlation = None;
        let mut confidence = HashMap::new();

        if let Some(jacobian) = &lm.jacobian {
            match covariance_from_jacobian(jacobian, redchi) {
                Ok(covar_internal) => {
                    let covar = external_covariance(&parameters, &free_names, &covar_internal)?;
                    let errors = standard_errors(&covar);

                    for (i, name) in free_names.iter().enumerate() {
                        if let Some(param) = parameters.get_mut(name) {
                            param.set_stderr(Some(errors[i]));
                        }
                    }

                    let values: Vec<f64> = free_names
                        .iter()
                        .filter_map(|n| parameters.get(n).map(|p| p.value()))
                        .collect();
                    confidence = confidence_intervals(&free_names, &values, &errors, &self.sigmas);
                    correlation = Some(correlation_from_covariance(&covar));
                    covariance = Some(covar);
                }
                Err(e) => {
                    warn!("covariance analysis skipped: {}", e);
                }
            }
        }

        Ok(FitOutcome {
            parameters,
            lm,
            chisqr,
            redchi,
            nfree,
            covariance,
            correlation,
            confidence,
        })
    }
}

/// Map an internal-space covariance into external (bounded) parameter space.
///
/// First-order propagation through the bounds transform: each entry picks up the
/// derivative of the external value with respect to the internal one for both of
/// its parameters.
fn external_covariance(
    parameters: &Parameters,
    free_names: &[String],
    covar_internal: &Array2<f64>,
) -> Result<Array2<f64>> {
    let mut factors = Vec::with_capacity(free_names.len());
    for name in free_names {
        let param = parameters
            .get(name)
            .ok_or_else(|| crate::error::KinFitError::ParameterError(name.clone()))?;
        // d(external)/d(internal) equals the gradient scale factor at unit gradient
        let factor = param
            .bounds_transform()
            .scale_gradient(param.value(), 1.0)
            .map_err(crate::parameters::parameter::ParameterError::from)?;
        factors.push(factor.abs());
    }

    let n = factors.len();
    let mut covar = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            covar[[i, j]] = covar_internal[[i, j]] * factors[i] * factors[j];
        }
    }
    Ok(covar)
}

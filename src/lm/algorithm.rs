//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Damped normal equations `(J^T J + lambda I) delta = J^T r` with accept/reject
//! lambda control. The damped system is solved by Cholesky; when damping has not
//! restored definiteness the solve falls back to QR least squares on the same
//! system.

use faer::{Col, Mat};
use log::debug;
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{KinFitError, Result};
use crate::problem::{check_parameter_len, Problem};
use crate::utils::linalg::{cholesky_solve, qr_lstsq};

use super::config::LmConfig;

/// Result of a Levenberg-Marquardt run.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals at the solution
    pub cost: f64,

    /// Number of accepted iterations
    pub iterations: usize,

    /// Number of residual evaluations (Jacobian columns included)
    pub func_evals: usize,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the stopping condition
    pub message: String,

    /// The Jacobian at the solution (when requested via `calc_jacobian`)
    pub jacobian: Option<Array2<f64>>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create an optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for relative change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Request the Jacobian at the solution (needed for covariance analysis).
    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.config.calc_jacobian = calc_jacobian;
        self
    }

    /// Minimize the sum of squared residuals of `problem` starting from
    /// `initial_params`.
    pub fn minimize<P: Problem + Sync>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        check_parameter_len(problem, &initial_params)?;
        let n_params = initial_params.len();

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;

        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut iterations = 0;

        loop {
            let jac = problem.jacobian(&params)?;
            func_evals += n_params;

            // Gradient g = J^T r and its norm, via faer
            let j_f = to_faer_mat(&jac);
            let r_f = to_faer_col(&residuals);
            let g = j_f.transpose() * &r_f;
            let gradient_norm = g.norm_l2();

            if gradient_norm < self.config.gtol {
                return self.finish(
                    problem,
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    true,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                );
            }

            // Normal equations J^T J + lambda I
            let jt = jac.t().to_owned();
            let jtj = jt.dot(&jac);
            let jtr = jt.dot(&residuals);

            // Inner loop: adapt lambda until a step is accepted or lambda maxes out
            loop {
                let mut damped = jtj.clone();
                for i in 0..n_params {
                    damped[[i, i]] += lambda;
                }

                let delta = match cholesky_solve(&damped, &jtr) {
                    Ok(step) => step,
                    Err(KinFitError::SingularMatrix) => qr_lstsq(&damped, &jtr)?,
                    Err(e) => return Err(e),
                };

                let new_params = &params - &delta;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost < cost {
                    let param_change = delta.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
                    let cost_change = (cost - new_cost) / cost.max(1e-10);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;

                    debug!(
                        "lm iter {:3}  cost {:.6e}  lambda {:.2e}  |dx| {:.2e}",
                        iterations, cost, lambda, param_change
                    );

                    if param_change < self.config.xtol {
                        return self.finish(
                            problem,
                            params,
                            residuals,
                            cost,
                            iterations,
                            func_evals,
                            true,
                            format!(
                                "Parameter convergence: |dx| = {:.2e} < {:.2e}",
                                param_change, self.config.xtol
                            ),
                        );
                    }
                    if cost_change < self.config.ftol {
                        return self.finish(
                            problem,
                            params,
                            residuals,
                            cost,
                            iterations,
                            func_evals,
                            true,
                            format!(
                                "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                                cost_change, self.config.ftol
                            ),
                        );
                    }
                    if iterations >= self.config.max_iterations {
                        return self.finish(
                            problem,
                            params,
                            residuals,
                            cost,
                            iterations,
                            func_evals,
                            false,
                            format!(
                                "Maximum iterations ({}) reached",
                                self.config.max_iterations
                            ),
                        );
                    }
                    break; // back to the outer loop with a fresh Jacobian
                }

                // Step rejected
                lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                debug!(
                    "lm iter {:3}  rejected step, lambda {:.2e}",
                    iterations, lambda
                );
                if lambda >= self.config.max_lambda {
                    return self.finish(
                        problem,
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        false,
                        "Failed to decrease cost, and lambda reached maximum".to_string(),
                    );
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish<P: Problem + Sync>(
        &self,
        problem: &P,
        params: Array1<f64>,
        residuals: Array1<f64>,
        cost: f64,
        iterations: usize,
        func_evals: usize,
        success: bool,
        message: String,
    ) -> Result<LmResult> {
        let jacobian = if self.config.calc_jacobian {
            Some(problem.jacobian(&params)?)
        } else {
            None
        };

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message,
            jacobian,
        })
    }
}

fn to_faer_mat(arr: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

fn to_faer_col(arr: &Array1<f64>) -> Col<f64> {
    Col::from_fn(arr.len(), |i| arr[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Exponential decay fitted to exact synthetic data.
    struct Decay {
        t: Array1<f64>,
        y: Array1<f64>,
    }

    impl Problem for Decay {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (c0, k) = (params[0], params[1]);
            Ok(self
                .t
                .iter()
                .zip(self.y.iter())
                .map(|(&t, &y)| c0 * (-k * t).exp() - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.t.len()
        }
    }

    fn decay() -> Decay {
        let t: Array1<f64> = Array1::linspace(0.0, 4.0, 20);
        let y = t.mapv(|t: f64| 3.0 * (-1.2 * t).exp());
        Decay { t, y }
    }

    #[test]
    fn test_converges_to_truth() {
        let result = LevenbergMarquardt::new()
            .minimize(&decay(), array![1.0, 0.5])
            .unwrap();

        assert!(result.success, "message: {}", result.message);
        assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(result.params[1], 1.2, epsilon = 1e-5);
        assert!(result.cost < 1e-10);
    }

    #[test]
    fn test_linear_problem_converges_quickly() {
        struct Line {
            x: Array1<f64>,
            y: Array1<f64>,
        }
        impl Problem for Line {
            fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
                Ok(self
                    .x
                    .iter()
                    .zip(self.y.iter())
                    .map(|(&x, &y)| params[0] * x + params[1] - y)
                    .collect())
            }
            fn parameter_count(&self) -> usize {
                2
            }
            fn residual_count(&self) -> usize {
                self.x.len()
            }
        }

        let x = array![0.0, 1.0, 2.0, 3.0];
        let y = x.mapv(|x: f64| 2.0 * x - 1.0);
        let result = LevenbergMarquardt::new()
            .minimize(&Line { x, y }, array![0.0, 0.0])
            .unwrap();

        assert!(result.success);
        assert_relative_eq!(result.params[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.params[1], -1.0, epsilon = 1e-6);
        assert!(result.iterations < 20);
    }

    #[test]
    fn test_max_iterations_reported() {
        let result = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .with_ftol(1e-30)
            .with_xtol(1e-30)
            .with_gtol(1e-30)
            .minimize(&decay(), array![1.0, 0.5])
            .unwrap();

        assert!(!result.success);
        assert!(result.message.contains("Maximum iterations"));
    }

    #[test]
    fn test_jacobian_returned_on_request() {
        let result = LevenbergMarquardt::new()
            .with_calc_jacobian(true)
            .minimize(&decay(), array![1.0, 0.5])
            .unwrap();
        let jac = result.jacobian.expect("jacobian requested");
        assert_eq!(jac.shape(), &[20, 2]);
    }

    #[test]
    fn test_wrong_parameter_count_rejected() {
        let result = LevenbergMarquardt::new().minimize(&decay(), array![1.0]);
        assert!(result.is_err());
    }
}

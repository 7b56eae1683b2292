//! The nonlinear least-squares problem trait.
//!
//! Anything that can turn a parameter vector into a residual vector can be fitted:
//! the estimation problems in [`crate::estimate`] simulate the reaction model on
//! every call, but simple closed-form models work just as well (the tests below fit
//! a first-order decay directly).

use crate::error::{KinFitError, Result};
use ndarray::{Array1, Array2};

/// A nonlinear least-squares problem solvable by [`crate::lm::LevenbergMarquardt`].
pub trait Problem {
    /// Evaluate the residual vector at the given parameters.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of parameters the optimizer varies.
    fn parameter_count(&self) -> usize;

    /// Number of residuals returned by [`Problem::eval`].
    fn residual_count(&self) -> usize;

    /// Jacobian of the residuals with respect to the parameters.
    ///
    /// The default uses forward finite differences; each column re-evaluates the
    /// residuals once, so for simulation-backed problems a column costs one ODE
    /// solve and the columns run in parallel.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized + Sync,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Whether [`Problem::jacobian`] is an analytical implementation.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// Check a parameter vector length against the problem, with a uniform error.
pub(crate) fn check_parameter_len<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
) -> Result<()> {
    if params.len() != problem.parameter_count() {
        return Err(KinFitError::DimensionMismatch(format!(
            "expected {} parameters, got {}",
            problem.parameter_count(),
            params.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// First-order decay fitted to sampled data: residual = c0 * exp(-k t) - y.
    struct DecayProblem {
        t: Array1<f64>,
        y: Array1<f64>,
    }

    impl Problem for DecayProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            check_parameter_len(self, params)?;
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

    fn decay_problem() -> DecayProblem {
        let t = array![0.0, 0.5, 1.0, 1.5, 2.0];
        let y = t.mapv(|t: f64| 2.0 * (-0.8 * t).exp());
        DecayProblem { t, y }
    }

    #[test]
    fn test_residuals_vanish_at_truth() {
        let problem = decay_problem();
        let residuals = problem.eval(&array![2.0, 0.8]).unwrap();
        for r in residuals.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
        assert_relative_eq!(problem.eval_cost(&array![2.0, 0.8]).unwrap(), 0.0);
    }

    #[test]
    fn test_parameter_count_enforced() {
        let problem = decay_problem();
        assert!(problem.eval(&array![2.0]).is_err());
    }

    #[test]
    fn test_default_jacobian_matches_analytic() {
        let problem = decay_problem();
        let params = array![2.0, 0.8];
        let jac = problem.jacobian(&params).unwrap();

        assert_eq!(jac.shape(), &[5, 2]);
        for (i, &t) in problem.t.iter().enumerate() {
            let d_c0 = (-0.8_f64 * t).exp();
            let d_k = -2.0 * t * (-0.8_f64 * t).exp();
            assert_relative_eq!(jac[[i, 0]], d_c0, epsilon = 1e-5);
            assert_relative_eq!(jac[[i, 1]], d_k, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_cost_is_sum_of_squares() {
        let problem = decay_problem();
        let params = array![2.5, 0.8];
        let residuals = problem.eval(&params).unwrap();
        let expected: f64 = residuals.iter().map(|r| r * r).sum();
        assert_relative_eq!(problem.eval_cost(&params).unwrap(), expected);
    }
}

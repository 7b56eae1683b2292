//! Finite-difference Jacobians.
//!
//! Estimation problems re-simulate the reaction model on every residual
//! evaluation, so a Jacobian costs one ODE solve per parameter. The columns are
//! independent and run on the rayon thread pool.

use crate::error::{KinFitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Default relative step size for forward differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Forward-difference Jacobian: `J[i, j] = d residual[i] / d param[j]`.
///
/// The step for each parameter scales with its magnitude, falling back to the
/// absolute step for parameters near zero.
pub fn jacobian<P>(problem: &P, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    P: Problem + ?Sized + Sync,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let base = problem.eval(params)?;
    if base.len() != n_residuals {
        return Err(KinFitError::DimensionMismatch(format!(
            "expected {} residuals, got {}",
            n_residuals,
            base.len()
        )));
    }

    let columns: Vec<Array1<f64>> = (0..n_params)
        .into_par_iter()
        .map(|j| -> Result<Array1<f64>> {
            let step = if params[j].abs() > eps {
                params[j].abs() * eps
            } else {
                eps
            };

            let mut perturbed = params.clone();
            perturbed[j] += step;

            let shifted = problem.eval(&perturbed)?;
            Ok((&shifted - &base) / step)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut jac = Array2::zeros((n_residuals, n_params));
    for (j, column) in columns.into_iter().enumerate() {
        jac.column_mut(j).assign(&column);
    }
    Ok(jac)
}

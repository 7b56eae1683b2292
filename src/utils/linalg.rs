//! Dense linear-algebra routines for the estimators.
//!
//! Everything here operates on small systems (one row per parameter or per
//! component), so straightforward dense factorizations are the right tool: Cholesky
//! for the damped normal equations and the covariance inverse, Gram-Schmidt QR as
//! the least-squares fallback when the normal equations lose definiteness.

use crate::error::{KinFitError, Result};
use ndarray::{Array1, Array2};

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
///
/// Returns `SingularMatrix` when a non-positive pivot appears.
pub fn cholesky_factor(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(KinFitError::DimensionMismatch(format!(
            "Cholesky factorization needs a square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(KinFitError::SingularMatrix);
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Ok(l)
}

/// Solve `A x = b` for symmetric positive-definite `A` via Cholesky.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let l = cholesky_factor(a)?;
    Ok(cholesky_solve_factored(&l, b))
}

/// Solve with a precomputed lower factor (forward then backward substitution).
pub fn cholesky_solve_factored(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // L y = b
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            let yj = y[j];
            y[i] -= l[[i, j]] * yj;
        }
        y[i] /= l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }
    x
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn spd_inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky_factor(a)?;
    let mut inv = Array2::zeros((n, n));
    let mut unit = Array1::zeros(n);
    for j in 0..n {
        unit.fill(0.0);
        unit[j] = 1.0;
        let col = cholesky_solve_factored(&l, &unit);
        inv.column_mut(j).assign(&col);
    }
    Ok(inv)
}

/// Least-squares solution of `A x = b` (m x n, m >= n) by Gram-Schmidt QR.
///
/// Linearly dependent columns contribute zero, mirroring the rank-deficiency
/// handling of the optimizer's fallback path.
pub fn qr_lstsq(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let m = a.nrows();
    let n = a.ncols();
    if b.len() != m {
        return Err(KinFitError::DimensionMismatch(format!(
            "matrix has {} rows but right-hand side has {}",
            m,
            b.len()
        )));
    }

    let mut q = a.clone();
    let mut r = Array2::<f64>::zeros((n, n));

    for jj in 0..n {
        for kk in 0..jj {
            let dot = (0..m).map(|i| q[[i, kk]] * q[[i, jj]]).sum::<f64>();
            r[[kk, jj]] = dot;
            for i in 0..m {
                q[[i, jj]] -= dot * q[[i, kk]];
            }
        }
        let norm = (0..m).map(|i| q[[i, jj]] * q[[i, jj]]).sum::<f64>().sqrt();
        if norm > 1e-12 {
            r[[jj, jj]] = norm;
            for i in 0..m {
                q[[i, jj]] /= norm;
            }
        } else {
            for i in 0..m {
                q[[i, jj]] = 0.0;
            }
            r[[jj, jj]] = 0.0;
        }
    }

    // Q^T b, then back-substitution through R
    let mut qtb = Array1::zeros(n);
    for jj in 0..n {
        qtb[jj] = (0..m).map(|i| q[[i, jj]] * b[i]).sum::<f64>();
    }

    let mut x = Array1::zeros(n);
    for jj in (0..n).rev() {
        if r[[jj, jj]].abs() < 1e-12 {
            x[jj] = 0.0;
            continue;
        }
        x[jj] = qtb[jj];
        for kk in (jj + 1)..n {
            x[jj] -= r[[jj, kk]] * x[kk];
        }
        x[jj] /= r[[jj, jj]];
    }

    Ok(x)
}

/// Least squares followed by clamping into `[lo, hi]`.
///
/// The spectral subproblems bound the absorbance profiles (nonnegative by
/// default); clamping the unconstrained solution stands in for bound-constrained
/// least squares at the accuracy the alternating scheme needs.
pub fn clamped_lstsq(a: &Array2<f64>, b: &Array1<f64>, lo: f64, hi: f64) -> Result<Array1<f64>> {
    let mut x = qr_lstsq(a, b)?;
    x.mapv_inplace(|v| v.clamp(lo, hi));
    Ok(x)
}

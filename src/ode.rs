//! The compiled ODE system and its adaptive Runge-Kutta integrator.
//!
//! A reaction model compiles down to a state vector (components first, then
//! complementary states) and one rate expression per state. The integrator is an
//! embedded Cash-Karp 4(5) pair with step-size control, sampled exactly on the
//! caller's output grid.

use crate::error::{KinFitError, Result};
use crate::expr::RateExpr;
use crate::steps::StepFunction;
use ndarray::Array2;
use std::collections::HashMap;

/// Name of the time variable inside rate expressions.
pub const TIME_VARIABLE: &str = "t";

/// A reaction model compiled to first-order ODE form.
#[derive(Debug, Clone)]
pub struct OdeSystem {
    /// State names, defining the layout of the state vector
    state_names: Vec<String>,

    /// One rate expression per state, aligned with `state_names`
    rates: Vec<RateExpr>,

    /// Constant values visible to every rate (the kinetic parameters)
    constants: HashMap<String, f64>,

    /// Time-dependent step signals visible to every rate
    steps: Vec<StepFunction>,
}

impl OdeSystem {
    /// Bundle states, rates, parameter values and step signals into a system.
    pub fn new(
        state_names: Vec<String>,
        rates: Vec<RateExpr>,
        constants: HashMap<String, f64>,
        steps: Vec<StepFunction>,
    ) -> Result<Self> {
        if state_names.len() != rates.len() {
            return Err(KinFitError::DimensionMismatch(format!(
                "{} states but {} rate expressions",
                state_names.len(),
                rates.len()
            )));
        }
        Ok(Self {
            state_names,
            rates,
            constants,
            steps,
        })
    }

    /// Number of states.
    pub fn dim(&self) -> usize {
        self.state_names.len()
    }

    /// The same system with a different set of constant values.
    ///
    /// The estimator re-simulates with trial parameter values on every residual
    /// evaluation; only the constants change between runs.
    pub fn with_constants(&self, constants: HashMap<String, f64>) -> Self {
        Self {
            state_names: self.state_names.clone(),
            rates: self.rates.clone(),
            constants,
            steps: self.steps.clone(),
        }
    }

    /// State names in state-vector order.
    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    /// A fresh evaluation environment seeded with the constants.
    ///
    /// The integrator owns one of these as a workspace and updates the
    /// time-dependent entries in place at every right-hand-side evaluation.
    pub fn make_env(&self) -> HashMap<String, f64> {
        self.constants.clone()
    }

    /// Evaluate dy/dt at `(t, y)` into `dydt`, using `env` as workspace.
    pub fn rhs(
        &self,
        t: f64,
        y: &[f64],
        env: &mut HashMap<String, f64>,
        dydt: &mut [f64],
    ) -> Result<()> {
        if y.len() != self.dim() || dydt.len() != self.dim() {
            return Err(KinFitError::DimensionMismatch(format!(
                "state vector length {} does not match system dimension {}",
                y.len(),
                self.dim()
            )));
        }

        env.insert(TIME_VARIABLE.to_string(), t);
        for (name, &value) in self.state_names.iter().zip(y.iter()) {
            env.insert(name.clone(), value);
        }
        for step in &self.steps {
            env.insert(step.name().to_string(), step.value(t));
        }

        for (slot, rate) in dydt.iter_mut().zip(self.rates.iter()) {
            *slot = rate.eval(env)?;
        }
        Ok(())
    }
}

// Cash-Karp embedded 4(5) tableau.
const A2: [f64; 1] = [1.0 / 5.0];
const A3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
const A4: [f64; 3] = [3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0];
const A5: [f64; 4] = [-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0];
const A6: [f64; 5] = [
    1631.0 / 55296.0,
    175.0 / 512.0,
    575.0 / 13824.0,
    44275.0 / 110592.0,
    253.0 / 4096.0,
];
const C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0];
const B5: [f64; 6] = [
    37.0 / 378.0,
    0.0,
    250.0 / 621.0,
    125.0 / 594.0,
    0.0,
    512.0 / 1771.0,
];
const B4: [f64; 6] = [
    2825.0 / 27648.0,
    0.0,
    18575.0 / 48384.0,
    13525.0 / 55296.0,
    277.0 / 14336.0,
    1.0 / 4.0,
];

/// Adaptive Cash-Karp Runge-Kutta 4(5) integrator.
#[derive(Debug, Clone)]
pub struct Rk45 {
    rtol: f64,
    atol: f64,
    max_steps: usize,
}

impl Rk45 {
    /// Create an integrator with the given tolerances and step budget.
    pub fn new(rtol: f64, atol: f64, max_steps: usize) -> Self {
        Self {
            rtol,
            atol,
            max_steps,
        }
    }

    /// Integrate the system from `grid[0]`, sampling the solution at every grid
    /// time. Returns a `grid.len() x dim` trajectory matrix.
    ///
    /// The grid must be strictly increasing and the initial state must match the
    /// system dimension.
    pub fn integrate(
        &self,
        system: &OdeSystem,
        y0: &[f64],
        grid: &[f64],
    ) -> Result<Array2<f64>> {
        let dim = system.dim();
        if y0.len() != dim {
            return Err(KinFitError::DimensionMismatch(format!(
                "initial state has {} entries, system dimension is {}",
                y0.len(),
                dim
            )));
        }
        if grid.len() < 2 {
            return Err(KinFitError::InvalidInput(
                "output grid needs at least two time points".to_string(),
            ));
        }
        if !grid.windows(2).all(|w| w[0] < w[1]) {
            return Err(KinFitError::InvalidInput(
                "output grid must be strictly increasing".to_string(),
            ));
        }

        let mut env = system.make_env();
        let mut trajectory = Array2::zeros((grid.len(), dim));

        let mut t = grid[0];
        let mut y = y0.to_vec();
        trajectory.row_mut(0).assign(&ndarray::aview1(&y));

        let span = grid[grid.len() - 1] - grid[0];
        let mut h = span * 1e-3;
        let mut steps_taken = 0usize;

        let mut k = vec![vec![0.0; dim]; 6];
        let mut y_stage = vec![0.0; dim];

        for (row, &target) in grid.iter().enumerate().skip(1) {
            while t < target {
                if steps_taken >= self.max_steps {
                    return Err(KinFitError::IntegrationFailure(format!(
                        "step budget of {} exhausted at t = {:.6e}",
                        self.max_steps, t
                    )));
                }
                steps_taken += 1;

                let h_try = h.min(target - t);
                if h_try <= f64::EPSILON * t.abs().max(1.0) {
                    return Err(KinFitError::IntegrationFailure(format!(
                        "step size underflow at t = {:.6e}",
                        t
                    )));
                }

                // Six Cash-Karp stages
                system.rhs(t, &y, &mut env, &mut k[0])?;
                let coeffs: [&[f64]; 5] = [&A2, &A3, &A4, &A5, &A6];
                for stage in 1..6 {
                    for i in 0..dim {
                        let mut acc = 0.0;
                        for (j, &a) in coeffs[stage - 1].iter().enumerate() {
                            acc += a * k[j][i];
                        }
                        y_stage[i] = y[i] + h_try * acc;
                    }
                    let (_, rest) = k.split_at_mut(stage);
                    system.rhs(t + C[stage] * h_try, &y_stage, &mut env, &mut rest[0])?;
                }

                // Fifth-order solution and embedded error estimate
                let mut err: f64 = 0.0;
                for i in 0..dim {
                    let mut y5 = y[i];
                    let mut y4 = y[i];
                    for s in 0..6 {
                        y5 += h_try * B5[s] * k[s][i];
                        y4 += h_try * B4[s] * k[s][i];
                    }
                    let scale = self.atol + self.rtol * y[i].abs().max(y5.abs());
                    err = err.max(((y5 - y4) / scale).abs());
                    y_stage[i] = y5;
                }

                if !err.is_finite() || y_stage.iter().any(|v| !v.is_finite()) {
                    return Err(KinFitError::IntegrationFailure(format!(
                        "non-finite state encountered at t = {:.6e}",
                        t
                    )));
                }

                if err <= 1.0 {
                    // Accept the step and let the controller grow it
                    t += h_try;
                    y.copy_from_slice(&y_stage);
                    let growth = if err > 0.0 {
                        (0.9 * err.powf(-0.2)).min(5.0)
                    } else {
                        5.0
                    };
                    h = (h_try * growth).min(span);
                } else {
                    h = h_try * (0.9 * err.powf(-0.25)).max(0.1);
                }
            }

            trajectory.row_mut(row).assign(&ndarray::aview1(&y));
        }

        Ok(trajectory)
    }
}

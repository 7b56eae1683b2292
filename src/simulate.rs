//! Simulation of a compiled reaction model.
//!
//! The simulator integrates the ODE system on the settings-defined output grid and
//! splits the trajectory into the component matrix `Z`, the complementary-state
//! matrix `X` and the component derivatives `dZdt`. Trajectories are linearly
//! interpolated onto measurement times when residuals are formed.

use crate::error::{KinFitError, Result};
use crate::ode::{OdeSystem, Rk45};
use crate::settings::Settings;
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;

/// Trajectories produced by a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResults {
    times: Array1<f64>,
    components: Vec<String>,
    states: Vec<String>,
    z: Array2<f64>,
    x: Array2<f64>,
    dzdt: Array2<f64>,
}

impl SimulationResults {
    /// Output time grid.
    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    /// Component names (columns of `Z`).
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Complementary state names (columns of `X`).
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Component concentration trajectories, times x components.
    pub fn z(&self) -> &Array2<f64> {
        &self.z
    }

    /// Complementary state trajectories, times x states.
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Component concentration derivatives, times x components.
    pub fn dzdt(&self) -> &Array2<f64> {
        &self.dzdt
    }

    /// Trajectory of one component.
    pub fn component(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.components.iter().position(|c| c == name)?;
        Some(self.z.column(j))
    }

    /// Trajectory of one complementary state.
    pub fn state(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.states.iter().position(|s| s == name)?;
        Some(self.x.column(j))
    }

    /// Component concentrations sampled at arbitrary times by linear
    /// interpolation (clamped to the end values outside the grid).
    pub fn z_at(&self, times: &[f64]) -> Array2<f64> {
        interpolate_columns(&self.times, &self.z, times)
    }
}

/// Sample `matrix` (rows aligned with `grid`) at `query` times by linear
/// interpolation; queries outside the grid take the boundary rows.
pub fn interpolate_columns(grid: &Array1<f64>, matrix: &Array2<f64>, query: &[f64]) -> Array2<f64> {
    let n_cols = matrix.ncols();
    let n_grid = grid.len();
    let mut out = Array2::zeros((query.len(), n_cols));

    for (row, &t) in query.iter().enumerate() {
        if n_grid == 0 {
            break;
        }
        // Index of the first grid point >= t
        let upper = grid.iter().position(|&g| g >= t).unwrap_or(n_grid - 1);

        if upper == 0 || grid[upper] == t {
            out.row_mut(row).assign(&matrix.row(upper));
            continue;
        }
        if grid[upper] < t {
            // t beyond the last grid point
            out.row_mut(row).assign(&matrix.row(n_grid - 1));
            continue;
        }

        let lower = upper - 1;
        let weight = (t - grid[lower]) / (grid[upper] - grid[lower]);
        for col in 0..n_cols {
            out[[row, col]] =
                matrix[[lower, col]] * (1.0 - weight) + matrix[[upper, col]] * weight;
        }
    }

    out
}

/// Integrates a compiled reaction model over its time horizon.
#[derive(Debug, Clone)]
pub struct Simulator {
    system: OdeSystem,
    y0: Vec<f64>,
    n_components: usize,
    t0: f64,
    tf: f64,
    grid_points: usize,
    integrator: Rk45,
}

impl Simulator {
    /// Create a simulator for a compiled system.
    ///
    /// The state vector lays components out first; `n_components` marks the split
    /// between `Z` and `X` columns.
    pub fn new(
        system: OdeSystem,
        y0: Vec<f64>,
        n_components: usize,
        t0: f64,
        tf: f64,
        settings: &Settings,
    ) -> Result<Self> {
        if y0.len() != system.dim() {
            return Err(KinFitError::DimensionMismatch(format!(
                "initial state has {} entries, system dimension is {}",
                y0.len(),
                system.dim()
            )));
        }
        if n_components > system.dim() {
            return Err(KinFitError::DimensionMismatch(format!(
                "{} components exceed system dimension {}",
                n_components,
                system.dim()
            )));
        }
        if !(tf > t0) {
            return Err(KinFitError::InvalidModel(format!(
                "time horizon [{}, {}] is empty",
                t0, tf
            )));
        }

        Ok(Self {
            system,
            y0,
            n_components,
            t0,
            tf,
            grid_points: settings.collocation.grid_points(),
            integrator: Rk45::new(
                settings.simulator.rtol,
                settings.simulator.atol,
                settings.simulator.max_steps,
            ),
        })
    }

    /// The same simulator with different constant (parameter) values.
    pub fn with_constants(&self, constants: HashMap<String, f64>) -> Self {
        Self {
            system: self.system.with_constants(constants),
            ..self.clone()
        }
    }

    /// The output time grid.
    pub fn grid(&self) -> Vec<f64> {
        let n = self.grid_points.max(2);
        (0..n)
            .map(|i| self.t0 + (self.tf - self.t0) * i as f64 / (n - 1) as f64)
            .collect()
    }

    /// Integrate and split the trajectory into `Z`, `X` and `dZdt`.
    pub fn run(&self) -> Result<SimulationResults> {
        let grid = self.grid();
        let trajectory = self.integrator.integrate(&self.system, &self.y0, &grid)?;

        let n_times = grid.len();
        let n_comp = self.n_components;
        let n_states = self.system.dim() - n_comp;

        let mut z = Array2::zeros((n_times, n_comp));
        let mut x = Array2::zeros((n_times, n_states));
        for i in 0..n_times {
            for j in 0..n_comp {
                z[[i, j]] = trajectory[[i, j]];
            }
            for j in 0..n_states {
                x[[i, j]] = trajectory[[i, n_comp + j]];
            }
        }

        // Derivatives from the right-hand side on the output grid
        let mut dzdt = Array2::zeros((n_times, n_comp));
        let mut env = self.system.make_env();
        let mut dydt = vec![0.0; self.system.dim()];
        for (i, &t) in grid.iter().enumerate() {
            let y: Vec<f64> = trajectory.row(i).to_vec();
            self.system.rhs(t, &y, &mut env, &mut dydt)?;
            for j in 0..n_comp {
                dzdt[[i, j]] = dydt[j];
            }
        }

        let names = self.system.state_names();
        Ok(SimulationResults {
            times: Array1::from_vec(grid),
            components: names[..n_comp].to_vec(),
            states: names[n_comp..].to_vec(),
            z,
            x,
            dzdt,
        })
    }
}

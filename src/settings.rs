//! Run settings for simulation and estimation.
//!
//! Settings are grouped the way users encounter them: general switches, the output
//! grid (`collocation`), integrator controls, and one block per estimator. The
//! `Display` implementation prints the same YAML-like listing the tutorial shows on
//! the console, so `println!("{}", model.settings())` is the discoverability tool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// General switches that cut across the estimators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Run a plain simulation first and start estimation from its trajectories
    pub initialize_from_simulation: bool,

    /// Rescale estimated variances so the largest component variance is 1.0
    pub scale_variances: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            initialize_from_simulation: true,
            scale_variances: false,
        }
    }
}

/// Shape of the output grid trajectories are reported on.
///
/// The names keep the finite-element vocabulary of the field: `nfe` elements with
/// `ncp` sample points each give an output grid of `nfe * ncp + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationSettings {
    /// Number of finite elements over the time horizon
    pub nfe: usize,

    /// Sample points per element
    pub ncp: usize,
}

impl Default for CollocationSettings {
    fn default() -> Self {
        Self { nfe: 50, ncp: 3 }
    }
}

impl CollocationSettings {
    /// Total number of output grid points (including both end points).
    pub fn grid_points(&self) -> usize {
        self.nfe.max(1) * self.ncp.max(1) + 1
    }
}

/// Controls for the embedded Runge-Kutta integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorSettings {
    /// Relative tolerance of the adaptive step controller
    pub rtol: f64,

    /// Absolute tolerance of the adaptive step controller
    pub atol: f64,

    /// Hard cap on accepted + rejected steps per integration
    pub max_steps: usize,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 100_000,
        }
    }
}

/// Controls for the parameter estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimatorSettings {
    /// Label of the optimization method (informational; the embedded
    /// Levenberg-Marquardt solver is always used)
    pub solver: String,

    /// Echo the iteration log at info level
    pub tee: bool,

    /// Sigma levels for reported confidence intervals
    pub sigmas: Vec<f64>,

    /// Measurement variances keyed by component name plus "device".
    /// When empty they come from the variance estimator or default to 1.0.
    pub variances: HashMap<String, f64>,

    /// Maximum Levenberg-Marquardt iterations
    pub max_iterations: usize,
}

impl Default for ParameterEstimatorSettings {
    fn default() -> Self {
        Self {
            solver: "leastsq".to_string(),
            tee: false,
            sigmas: vec![1.0, 2.0, 3.0],
            variances: HashMap::new(),
            max_iterations: 100,
        }
    }
}

/// Controls for the spectral variance estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceEstimatorSettings {
    /// Maximum alternating sweeps
    pub max_iter: usize,

    /// Convergence tolerance on the trajectory change between sweeps
    pub tolerance: f64,

    /// Echo the per-sweep residual table at info level
    pub tee: bool,
}

impl Default for VarianceEstimatorSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 5e-10,
            tee: false,
        }
    }
}

/// All settings of a reaction model run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub general: GeneralSettings,
    pub collocation: CollocationSettings,
    pub simulator: SimulatorSettings,
    pub parameter_estimator: ParameterEstimatorSettings,
    pub variance_estimator: VarianceEstimatorSettings,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "general:")?;
        writeln!(
            f,
            "  initialize_from_simulation: {}",
            self.general.initialize_from_simulation
        )?;
        writeln!(f, "  scale_variances: {}", self.general.scale_variances)?;

        writeln!(f, "collocation:")?;
        writeln!(f, "  nfe: {}", self.collocation.nfe)?;
        writeln!(f, "  ncp: {}", self.collocation.ncp)?;

        writeln!(f, "simulator:")?;
        writeln!(f, "  rtol: {:e}", self.simulator.rtol)?;
        writeln!(f, "  atol: {:e}", self.simulator.atol)?;
        writeln!(f, "  max_steps: {}", self.simulator.max_steps)?;

        writeln!(f, "parameter_estimator:")?;
        writeln!(f, "  solver: {}", self.parameter_estimator.solver)?;
        writeln!(f, "  tee: {}", self.parameter_estimator.tee)?;
        writeln!(f, "  sigmas: {:?}", self.parameter_estimator.sigmas)?;
        writeln!(
            f,
            "  max_iterations: {}",
            self.parameter_estimator.max_iterations
        )?;
        if !self.parameter_estimator.variances.is_empty() {
            writeln!(f, "  variances:")?;
            let mut keys: Vec<&String> = self.parameter_estimator.variances.keys().collect();
            keys.sort();
            for key in keys {
                writeln!(f, "    {}: {}", key, self.parameter_estimator.variances[key])?;
            }
        }

        writeln!(f, "variance_estimator:")?;
        writeln!(f, "  max_iter: {}", self.variance_estimator.max_iter)?;
        writeln!(f, "  tolerance: {:e}", self.variance_estimator.tolerance)?;
        write!(f, "  tee: {}", self.variance_estimator.tee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.collocation.nfe, 50);
        assert_eq!(settings.collocation.ncp, 3);
        assert_eq!(settings.collocation.grid_points(), 151);
        assert!(settings.general.initialize_from_simulation);
        assert_eq!(settings.parameter_estimator.solver, "leastsq");
    }

    #[test]
    fn test_grid_points_never_degenerate() {
        let mut collocation = CollocationSettings { nfe: 0, ncp: 0 };
        assert_eq!(collocation.grid_points(), 2);
        collocation.nfe = 10;
        collocation.ncp = 1;
        assert_eq!(collocation.grid_points(), 11);
    }

    #[test]
    fn test_display_listing() {
        let mut settings = Settings::default();
        settings
            .parameter_estimator
            .variances
            .insert("device".to_string(), 1e-4);

        let listing = format!("{}", settings);
        assert!(listing.contains("general:"));
        assert!(listing.contains("  nfe: 50"));
        assert!(listing.contains("parameter_estimator:"));
        assert!(listing.contains("    device: 0.0001"));
        assert!(listing.ends_with("tee: false"));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut settings = Settings::default();
        settings.collocation.nfe = 60;
        settings.collocation.ncp = 1;
        settings.parameter_estimator.tee = true;

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}

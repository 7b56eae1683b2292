//! Parameter and variance estimation.
//!
//! [`EstimationProblem`] turns a reaction model plus its datasets into a nonlinear
//! least-squares problem (every residual evaluation re-simulates the model).
//! [`ParameterEstimator`] drives the Levenberg-Marquardt solver over it and attaches
//! covariance-based uncertainties; [`VarianceEstimator`] recovers per-component and
//! device noise variances from spectral data before the parameter fit.

pub mod parameter_estimator;
pub mod problem;
pub mod uncertainty;
pub mod variance;

pub use parameter_estimator::{FitOutcome, ParameterEstimator};
pub use problem::EstimationProblem;
pub use uncertainty::{ConfidenceInterval, MonteCarloResult};
pub use variance::{VarianceEstimator, VarianceResult};

/// Key under which the instrument (device) variance is reported.
pub const DEVICE_VARIANCE_KEY: &str = "device";

//! # kinfit-rs
//!
//! `kinfit-rs` estimates kinetic rate parameters of reaction models from measured
//! concentration profiles or spectra, with uncertainty calculation.
//!
//! The library provides:
//! - A [`ReactionModel`] builder: components, complementary states, kinetic
//!   parameters, rate expressions, step signals and datasets
//! - An embedded adaptive Runge-Kutta simulator for the resulting ODE systems
//! - A Levenberg-Marquardt estimator with bounds handling, plus a variance
//!   estimator for spectral data
//! - Covariance-based standard errors and confidence intervals for the fit
//!
//! ## Basic Usage
//!
//! ```
//! use kinfit_rs::{ReactionModel, Result};
//!
//! fn main() -> Result<()> {
//!     let mut r1 = ReactionModel::new("reaction-1");
//!     r1.add_parameter_with_bounds("k1", 2.0, 0.0, 5.0)?;
//!     r1.add_component("A", 1.0)?;
//!     r1.add_component("B", 0.0)?;
//!     r1.add_ode("A", "-k1 * A")?;
//!     r1.add_ode("B", "k1 * A")?;
//!     r1.set_times(0.0, 5.0)?;
//!     let results = r1.simulate()?;
//!     results.show_parameters();
//!     Ok(())
//! }
//! ```

// Public modules
pub mod error;

// Rate expressions and the parameter system
pub mod expr;
pub mod parameters;

// Model definition and measured data
pub mod data;
pub mod model;
pub mod settings;
pub mod steps;

// Simulation
pub mod ode;
pub mod simulate;

// Estimation
pub mod estimate;
pub mod lm;
pub mod problem;

// Reporting
pub mod plot;
pub mod results;

mod utils;

// Re-exports for convenience
pub use error::{KinFitError, Result};
pub use model::{DataCategory, ReactionModel};
pub use parameters::{Parameter, Parameters};
pub use problem::Problem;
pub use results::ResultsObject;
pub use settings::Settings;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

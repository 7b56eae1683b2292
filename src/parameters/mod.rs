//! The kinetic parameter system.
//!
//! Rate parameters are named quantities with an initial guess, optional bounds and a
//! fixed/free flag. The estimator varies the free parameters through the Minuit-style
//! bounds transform, so the optimizer itself never sees a constraint.

pub mod bounds;
pub mod parameter;
#[allow(clippy::module_inception)]
pub mod parameters;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use parameter::{Parameter, ParameterError};
pub use parameters::Parameters;

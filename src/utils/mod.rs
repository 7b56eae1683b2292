//! Numerical utilities shared by the simulator and the estimators.

pub mod finite_difference;
pub mod linalg;

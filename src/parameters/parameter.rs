//! A single kinetic parameter.
//!
//! Parameters are the unknowns of the estimation problem: rate constants, activation
//! energies, equilibrium constants. Each carries an initial guess (kept for reset),
//! optional bounds, a fixed/free flag and, after a fit, its standard error.

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Parameter '{name}' is already defined")]
    DuplicateParameter { name: String },
}

/// A kinetic parameter of a reaction model.
///
/// # Examples
///
/// ```
/// use kinfit_rs::parameters::Parameter;
///
/// let k1 = Parameter::with_bounds("k1", 2.0, 0.0, 5.0).unwrap();
/// assert_eq!(k1.name(), "k1");
/// assert_eq!(k1.value(), 2.0);
/// assert!(!k1.fixed());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    name: String,

    /// Current value
    value: f64,

    /// Initial guess when created (for reset operations)
    init_value: f64,

    /// Whether the parameter is held fixed during estimation
    fixed: bool,

    /// Bounds on the value
    bounds: Bounds,

    /// Optional unit label, carried through to reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,

    /// Standard error, set after a fit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<f64>,
}

impl Parameter {
    /// Create a free, unbounded parameter with the given initial guess.
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            init_value: value,
            fixed: false,
            bounds: Bounds::default(),
            units: None,
            stderr: None,
        }
    }

    /// Create a free parameter with bounds; the initial guess is clamped into them.
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        let value = bounds.clamp(value);

        Ok(Self {
            name: name.to_string(),
            value,
            init_value: value,
            fixed: false,
            bounds,
            units: None,
            stderr: None,
        })
    }

    /// Name of the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value; errors when outside bounds.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.contains(value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }
        self.value = value;
        Ok(())
    }

    /// The initial guess the parameter was created with.
    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Restore the initial guess (clamped into the current bounds) and clear stderr.
    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
        self.stderr = None;
    }

    /// Whether the parameter is held fixed during estimation.
    pub fn fixed(&self) -> bool {
        self.fixed
    }

    /// Hold the parameter fixed or release it.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Bounds of the parameter.
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Replace the bounds; the current value is clamped into the new range.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }

    /// Unit label, if any.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Attach a unit label (for reports and plots).
    pub fn set_units(&mut self, units: Option<&str>) {
        self.units = units.map(|s| s.to_string());
    }

    /// Standard error from the last fit, if available.
    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    /// Record the standard error after a fit.
    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    /// The bounds transform used by the estimator for this parameter.
    pub fn bounds_transform(&self) -> BoundsTransform {
        BoundsTransform::new(self.bounds)
    }

    /// Current value mapped into the optimizer's unbounded internal space.
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        self.bounds_transform()
            .to_internal(self.value)
            .map_err(ParameterError::from)
    }

    /// Map an internal optimizer value back to the bounded external value.
    pub fn from_internal(&self, internal: f64) -> f64 {
        self.bounds_transform().to_external(internal)
    }
}

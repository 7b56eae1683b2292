//! Parameter bounds and the Minuit-style bounds transform.
//!
//! Rate constants are often constrained to physically meaningful ranges (k >= 0, or a
//! window from the literature). Internally the optimizer works with unbounded values;
//! the transform maps between the two so bound handling never leaks into the
//! Levenberg-Marquardt core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Bounds constraints on a kinetic parameter.
///
/// Either side may be infinite; `Bounds::default()` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

// JSON has no representation for infinities, so open sides serialize as null.
impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;
        let min = self.min.is_finite().then_some(self.min);
        let max = self.max.is_finite().then_some(self.max);
        state.serialize_field("min", &min)?;
        state.serialize_field("max", &max)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,
            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;
        Ok(Bounds {
            min: helper.min.unwrap_or(f64::NEG_INFINITY),
            max: helper.max.unwrap_or(f64::INFINITY),
        })
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Create bounds with min and max values; errors when min > max.
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Unbounded constraint (-inf, +inf).
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bounded from below only.
    pub fn min_only(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    /// Bounded from above only.
    pub fn max_only(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    /// Check whether a value satisfies the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether the parameter is bounded from below.
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    /// Whether the parameter is bounded from above.
    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value into the bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Minuit-style transform between bounded external values and the unbounded
/// internal values seen by the optimizer.
///
/// - unbounded: identity
/// - lower bound only: `ext = min - 1 + sqrt(int^2 + 1)`
/// - upper bound only: `ext = max + 1 - sqrt(int^2 + 1)`
/// - both: `ext = min + (sin(int) + 1) * (max - min) / 2`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    /// Create a new transform for the given bounds.
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Map an internal (unbounded) value to its external (bounded) value.
    pub fn to_external(&self, internal: f64) -> f64 {
        let Bounds { min, max } = self.bounds;
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => internal,
            (true, false) => min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => min + (internal.sin() + 1.0) * (max - min) / 2.0,
        }
    }

    /// Map an external value to the internal value the optimizer varies.
    ///
    /// The external value must be finite and within bounds.
    pub fn to_internal(&self, external: f64) -> Result<f64, BoundsError> {
        if !external.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }
        if !self.bounds.contains(external) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let Bounds { min, max } = self.bounds;
        let internal = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => external,
            (true, false) => ((external - min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((max - external + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let scaled = 2.0 * (external - min) / (max - min) - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        };
        Ok(internal)
    }

    /// Chain-rule factor for a gradient taken with respect to the external value.
    pub fn scale_gradient(&self, external: f64, gradient: f64) -> Result<f64, BoundsError> {
        if !self.bounds.contains(external) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let Bounds { min, max } = self.bounds;
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => Ok(gradient),
            (true, false) => {
                let internal = self.to_internal(external)?;
                Ok(gradient * internal / (internal.powi(2) + 1.0).sqrt())
            }
            (false, true) => {
                let internal = self.to_internal(external)?;
                Ok(-gradient * internal / (internal.powi(2) + 1.0).sqrt())
            }
            (true, true) => {
                let internal = self.to_internal(external)?;
                Ok(gradient * (max - min) * internal.cos() / 2.0)
            }
        }
    }
}

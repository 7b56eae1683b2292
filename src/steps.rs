//! Time-dependent step signals.
//!
//! Feeds, dosing events and other switched inputs enter rate expressions as named
//! signals that ramp smoothly between 0 and 1 around a switching time. The smooth
//! sigmoid form keeps the right-hand side differentiable, which the adaptive
//! integrator and the finite-difference Jacobian both rely on.

use serde::{Deserialize, Serialize};

/// Direction of the switch at the step time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepDirection {
    /// Signal ramps 0 -> 1 at the step time
    On,
    /// Signal ramps 1 -> 0 at the step time
    Off,
}

/// A smooth on/off switching signal, referenced by name from rate expressions.
///
/// The signal is `magnitude * s(t)` where `s` is a sigmoid centered on the step
/// time with transition width `eta`:
///
/// `s(t) = 1 / (1 + exp(-(t - time) / eta))` for [`StepDirection::On`],
/// and `1 - s(t)` for [`StepDirection::Off`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFunction {
    name: String,
    time: f64,
    direction: StepDirection,
    magnitude: f64,
    eta: f64,
}

/// Default transition width; narrow relative to typical batch times.
const DEFAULT_ETA: f64 = 1e-2;

impl StepFunction {
    /// Create a unit step switching at `time`.
    pub fn new(name: &str, time: f64, direction: StepDirection) -> Self {
        Self {
            name: name.to_string(),
            time,
            direction,
            magnitude: 1.0,
            eta: DEFAULT_ETA,
        }
    }

    /// Scale the plateau value (default 1.0).
    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = magnitude;
        self
    }

    /// Set the transition width (default 1e-2). Values closer to zero make the
    /// switch sharper; zero or negative widths are clamped to the default.
    pub fn with_smoothing(mut self, eta: f64) -> Self {
        self.eta = if eta > 0.0 { eta } else { DEFAULT_ETA };
        self
    }

    /// Name used to reference the signal inside rate expressions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Switching time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Evaluate the signal at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        let s = 1.0 / (1.0 + (-(t - self.time) / self.eta).exp());
        match self.direction {
            StepDirection::On => self.magnitude * s,
            StepDirection::Off => self.magnitude * (1.0 - s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_on_step_plateaus() {
        let step = StepFunction::new("feed", 5.0, StepDirection::On);
        assert!(step.value(0.0) < 1e-6);
        assert_relative_eq!(step.value(5.0), 0.5, epsilon = 1e-12);
        assert!(step.value(10.0) > 1.0 - 1e-6);
    }

    #[test]
    fn test_off_step_mirrors_on() {
        let on = StepFunction::new("s", 2.0, StepDirection::On);
        let off = StepFunction::new("s", 2.0, StepDirection::Off);
        for &t in &[0.0, 1.9, 2.0, 2.1, 4.0] {
            assert_relative_eq!(on.value(t) + off.value(t), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_magnitude_scaling() {
        let step = StepFunction::new("feed", 1.0, StepDirection::On).with_magnitude(240.0);
        assert!(step.value(3.0) > 239.9);
        assert!(step.value(-1.0) < 0.1);
    }

    #[test]
    fn test_smoothing_width() {
        let sharp = StepFunction::new("s", 0.0, StepDirection::On).with_smoothing(1e-4);
        let wide = StepFunction::new("s", 0.0, StepDirection::On).with_smoothing(1.0);
        // At the same small offset the sharp step is much further along
        assert!(sharp.value(0.01) > 0.99);
        assert!(wide.value(0.01) < 0.6);

        // Non-positive widths fall back to the default rather than dividing by zero
        let fallback = StepFunction::new("s", 0.0, StepDirection::On).with_smoothing(0.0);
        assert!(fallback.value(1.0).is_finite());
    }
}

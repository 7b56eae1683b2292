//! The user-facing reaction model builder.
//!
//! A `ReactionModel` collects components, complementary states, kinetic parameters,
//! rate expressions, step signals and measured data, then runs simulation or
//! estimation over them:
//!
//! ```
//! use kinfit_rs::ReactionModel;
//!
//! let mut r1 = ReactionModel::new("reaction-1");
//! r1.add_parameter_with_bounds("k1", 2.0, 0.0, 5.0).unwrap();
//! r1.add_parameter_with_bounds("k2", 0.2, 0.0, 2.0).unwrap();
//! r1.add_component("A", 1.0).unwrap();
//! r1.add_component("B", 0.0).unwrap();
//! r1.add_component("C", 0.0).unwrap();
//! r1.add_ode("A", "-k1 * A").unwrap();
//! r1.add_ode("B", "k1 * A - k2 * B").unwrap();
//! r1.add_ode("C", "k2 * B").unwrap();
//! r1.set_times(0.0, 10.0).unwrap();
//! let results = r1.simulate().unwrap();
//! // At t = 10 almost all of A has reacted through B into C
//! assert!(results.simulation.component("C").unwrap()[150] > 0.8);
//! ```

use crate::data::{io, ConcentrationData, SpectralData};
use crate::error::{KinFitError, Result};
use crate::estimate::{
    EstimationProblem, ParameterEstimator, VarianceEstimator, DEVICE_VARIANCE_KEY,
};
use crate::expr::RateExpr;
use crate::ode::{OdeSystem, TIME_VARIABLE};
use crate::parameters::{Parameter, Parameters};
use crate::problem::Problem;
use crate::results::{ParameterSummary, ResultsObject};
use crate::settings::Settings;
use crate::simulate::Simulator;
use crate::steps::{StepDirection, StepFunction};
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reserved name of the volume state.
pub const VOLUME_STATE: &str = "V";

/// A measured chemical species of the reaction.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub init_value: f64,
}

/// An unmeasured (complementary) state such as temperature or volume.
#[derive(Debug, Clone)]
pub struct ComplementaryState {
    pub name: String,
    pub init_value: f64,
    pub description: Option<String>,
}

/// Kind of dataset attached with [`ReactionModel::add_data_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCategory {
    Concentration,
    Spectral,
}

/// A single reaction system: model definition, data and run results.
#[derive(Debug, Clone)]
pub struct ReactionModel {
    name: String,
    components: Vec<Component>,
    states: Vec<ComplementaryState>,
    parameters: Parameters,
    odes: HashMap<String, RateExpr>,
    steps: Vec<StepFunction>,
    concentration_data: Option<ConcentrationData>,
    spectra: Option<SpectralData>,
    times: Option<(f64, f64)>,
    s_bounds: (f64, f64),

    /// Run settings; mutate freely before `simulate`/`run_opt`
    pub settings: Settings,

    results: Option<ResultsObject>,
}

impl ReactionModel {
    /// Create an empty reaction model.
    ///
    /// The volume state `V` is reserved and auto-created with value 1.0; it stays
    /// constant unless given an ODE.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: Vec::new(),
            states: vec![ComplementaryState {
                name: VOLUME_STATE.to_string(),
                init_value: 1.0,
                description: Some("Volume".to_string()),
            }],
            parameters: Parameters::new(),
            odes: HashMap::new(),
            steps: Vec::new(),
            concentration_data: None,
            spectra: None,
            times: None,
            s_bounds: (0.0, f64::INFINITY),
            settings: Settings::default(),
            results: None,
        }
    }

    /// Name of the reaction model.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_name(&self, name: &str, kind: &'static str) -> Result<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false)
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(KinFitError::InvalidInput(format!(
                "'{}' is not a valid {} name",
                name, kind
            )));
        }
        if name == TIME_VARIABLE {
            return Err(KinFitError::ReservedName(name.to_string(), kind));
        }

        let taken = self.components.iter().any(|c| c.name == name)
            || self.states.iter().any(|s| s.name == name)
            || self.parameters.contains(name)
            || self.steps.iter().any(|s| s.name() == name);
        if taken {
            return Err(KinFitError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Declare a kinetic parameter with an initial guess.
    pub fn add_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.check_name(name, "parameter")?;
        self.parameters
            .add(Parameter::new(name, value))
            .map_err(KinFitError::from)
    }

    /// Declare a kinetic parameter with an initial guess and bounds.
    pub fn add_parameter_with_bounds(
        &mut self,
        name: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<()> {
        self.check_name(name, "parameter")?;
        self.parameters
            .add(Parameter::with_bounds(name, value, min, max)?)
            .map_err(KinFitError::from)
    }

    /// Hold a declared parameter fixed during estimation.
    pub fn fix_parameter(&mut self, name: &str) -> Result<()> {
        self.parameters
            .get_mut(name)
            .ok_or_else(|| KinFitError::UnknownVariable(name.to_string()))?
            .set_fixed(true);
        Ok(())
    }

    /// Declare a measured component with its initial concentration.
    ///
    /// The name `V` is reserved for the volume state and rejected here.
    pub fn add_component(&mut self, name: &str, value: f64) -> Result<()> {
        if name == VOLUME_STATE {
            return Err(KinFitError::ReservedName(name.to_string(), "component"));
        }
        self.check_name(name, "component")?;
        self.components.push(Component {
            name: name.to_string(),
            init_value: value,
        });
        Ok(())
    }

    /// Declare a complementary (unmeasured) state with its initial value.
    ///
    /// Declaring `V` re-initializes the reserved volume state instead of erroring.
    pub fn add_state(&mut self, name: &str, value: f64) -> Result<()> {
        self.add_state_with_description(name, value, None)
    }

    /// Declare a complementary state with a description.
    pub fn add_state_with_description(
        &mut self,
        name: &str,
        value: f64,
        description: Option<&str>,
    ) -> Result<()> {
        if name == VOLUME_STATE {
            let volume = self
                .states
                .iter_mut()
                .find(|s| s.name == VOLUME_STATE)
                .expect("volume state is always present");
            volume.init_value = value;
            if let Some(d) = description {
                volume.description = Some(d.to_string());
            }
            return Ok(());
        }
        self.check_name(name, "state")?;
        self.states.push(ComplementaryState {
            name: name.to_string(),
            init_value: value,
            description: description.map(|s| s.to_string()),
        });
        Ok(())
    }

    /// Attach a rate expression to a declared component or state.
    pub fn add_ode(&mut self, name: &str, expr: &str) -> Result<()> {
        let declared = self.components.iter().any(|c| c.name == name)
            || self.states.iter().any(|s| s.name == name);
        if !declared {
            return Err(KinFitError::UnknownVariable(name.to_string()));
        }
        if self.odes.contains_key(name) {
            return Err(KinFitError::DuplicateName(format!("ODE for {}", name)));
        }
        let parsed = RateExpr::parse(expr)?;
        self.odes.insert(name.to_string(), parsed);
        Ok(())
    }

    /// Attach several rate expressions at once.
    pub fn add_odes(&mut self, rates: &[(&str, &str)]) -> Result<()> {
        for (name, expr) in rates {
            self.add_ode(name, expr)?;
        }
        Ok(())
    }

    /// Declare a smooth step signal usable by name in rate expressions.
    pub fn add_step(&mut self, name: &str, time: f64, direction: StepDirection) -> Result<()> {
        self.check_name(name, "step")?;
        self.steps.push(StepFunction::new(name, time, direction));
        Ok(())
    }

    /// Declare a preconfigured step signal.
    pub fn add_step_fn(&mut self, step: StepFunction) -> Result<()> {
        self.check_name(step.name(), "step")?;
        self.steps.push(step);
        Ok(())
    }

    /// Attach concentration measurements.
    pub fn add_concentration_data(&mut self, data: ConcentrationData) -> Result<()> {
        for name in data.components() {
            if !self.components.iter().any(|c| &c.name == name) {
                return Err(KinFitError::UnknownVariable(name.clone()));
            }
        }
        self.concentration_data = Some(data);
        Ok(())
    }

    /// Attach spectral measurements.
    pub fn add_spectral_data(&mut self, data: SpectralData) {
        self.spectra = Some(data);
    }

    /// Load a dataset from a file; `.txt` files use the triplet format, `.csv`
    /// files the wide format.
    pub fn add_data_file<P: AsRef<Path>>(&mut self, category: DataCategory, path: P) -> Result<()> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        match category {
            DataCategory::Concentration => {
                let data = if is_csv {
                    io::read_concentration_csv(path)?
                } else {
                    io::read_concentration_txt(path)?
                };
                self.add_concentration_data(data)
            }
            DataCategory::Spectral => {
                let data = if is_csv {
                    io::read_spectral_csv(path)?
                } else {
                    io::read_spectral_txt(path)?
                };
                self.add_spectral_data(data);
                Ok(())
            }
        }
    }

    /// Spectral data, for preprocessing (`decrease_wavelengths`, `msc`).
    pub fn spectra_mut(&mut self) -> Option<&mut SpectralData> {
        self.spectra.as_mut()
    }

    /// Attached spectral data.
    pub fn spectra(&self) -> Option<&SpectralData> {
        self.spectra.as_ref()
    }

    /// Attached concentration data.
    pub fn concentration_data(&self) -> Option<&ConcentrationData> {
        self.concentration_data.as_ref()
    }

    /// Set the simulation horizon explicitly (otherwise the data span is used).
    pub fn set_times(&mut self, t0: f64, tf: f64) -> Result<()> {
        if !(tf > t0) {
            return Err(KinFitError::InvalidModel(format!(
                "time horizon [{}, {}] is empty",
                t0, tf
            )));
        }
        self.times = Some((t0, tf));
        Ok(())
    }

    /// Bound a solved profile; only the absorbance profile `"S"` is supported.
    pub fn bound_profile(&mut self, var: &str, bounds: (f64, f64)) -> Result<()> {
        if var != "S" {
            return Err(KinFitError::InvalidInput(format!(
                "profile bounds are supported for 'S' only, got '{}'",
                var
            )));
        }
        if !(bounds.0 < bounds.1) {
            return Err(KinFitError::BoundsError(format!(
                "invalid profile bounds ({}, {})",
                bounds.0, bounds.1
            )));
        }
        self.s_bounds = bounds;
        Ok(())
    }

    /// The kinetic parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Mutable access to the kinetic parameters.
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Component names in declaration order.
    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }

    /// Results of the last `simulate` or `run_opt`.
    pub fn results(&self) -> Option<&ResultsObject> {
        self.results.as_ref()
    }

    fn horizon(&self) -> Result<(f64, f64)> {
        if let Some(times) = self.times {
            return Ok(times);
        }
        let span = self
            .concentration_data
            .as_ref()
            .and_then(|d| d.span())
            .or_else(|| self.spectra.as_ref().and_then(|d| d.span()));
        match span {
            Some((t0, tf)) if tf > t0 => Ok((t0, tf)),
            _ => Err(KinFitError::InvalidModel(
                "no time horizon: call set_times or attach data spanning an interval".to_string(),
            )),
        }
    }

    /// Check the model is complete and internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            return Err(KinFitError::InvalidModel(
                "declare at least one component".to_string(),
            ));
        }

        for component in &self.components {
            if !self.odes.contains_key(&component.name) {
                return Err(KinFitError::MissingOde(component.name.clone()));
            }
        }
        for state in &self.states {
            // The volume state defaults to constant
            if state.name != VOLUME_STATE && !self.odes.contains_key(&state.name) {
                return Err(KinFitError::MissingOde(state.name.clone()));
            }
        }

        for (target, expr) in &self.odes {
            for var in expr.variables() {
                let known = var == TIME_VARIABLE
                    || self.components.iter().any(|c| c.name == var)
                    || self.states.iter().any(|s| s.name == var)
                    || self.parameters.contains(&var)
                    || self.steps.iter().any(|s| s.name() == var);
                if !known {
                    return Err(KinFitError::ExpressionError(format!(
                        "rate of '{}' references unknown variable '{}'",
                        target, var
                    )));
                }
            }
        }

        self.horizon()?;
        Ok(())
    }

    /// Compile the model into an ODE system and its simulator.
    fn build_simulator(&self) -> Result<Simulator> {
        self.validate()?;
        let (t0, tf) = self.horizon()?;

        let mut state_names = Vec::new();
        let mut rates = Vec::new();
        let mut y0 = Vec::new();

        for component in &self.components {
            state_names.push(component.name.clone());
            rates.push(self.odes[&component.name].clone());
            y0.push(component.init_value);
        }
        let constant = RateExpr::Number(0.0);
        for state in &self.states {
            state_names.push(state.name.clone());
            rates.push(self.odes.get(&state.name).cloned().unwrap_or_else(|| constant.clone()));
            y0.push(state.init_value);
        }

        let system = OdeSystem::new(state_names, rates, self.parameters.value_map(), self.steps.clone())?;
        Simulator::new(system, y0, self.components.len(), t0, tf, &self.settings)
    }

    fn parameter_summaries(&self) -> Vec<ParameterSummary> {
        self.parameters
            .iter()
            .map(|p| ParameterSummary {
                name: p.name().to_string(),
                value: p.value(),
                stderr: p.stderr(),
                fixed: p.fixed(),
                units: p.units().map(|u| u.to_string()),
            })
            .collect()
    }

    /// Simulate the model at the current parameter values.
    ///
    /// The results are returned and also stored on the model for `plot` and
    /// [`ReactionModel::results`].
    pub fn simulate(&mut self) -> Result<ResultsObject> {
        let simulator = self.build_simulator()?;
        let simulation = simulator.run()?;
        info!(
            "simulated '{}' on {} grid points",
            self.name,
            simulation.times().len()
        );

        let results = ResultsObject::from_simulation(self.parameter_summaries(), simulation);
        self.results = Some(results.clone());
        Ok(results)
    }

    /// Resolve the measurement variances for estimation.
    ///
    /// Priority: user-set values in the settings, then the variance estimator
    /// (spectral data only), then 1.0 with a warning.
    fn resolve_variances(&mut self, simulator: &Simulator) -> Result<HashMap<String, f64>> {
        let user = &self.settings.parameter_estimator.variances;
        if !user.is_empty() {
            return Ok(user.clone());
        }

        if let Some(spectra) = &self.spectra {
            info!("Solving variance estimation for '{}'", self.name);
            let estimator = VarianceEstimator::new(&self.settings, self.s_bounds);
            let outcome = estimator.run(
                simulator,
                &self.parameters,
                &self.component_names(),
                spectra,
            )?;
            if !outcome.converged {
                warn!(
                    "variance estimation stopped after {} sweeps without converging",
                    outcome.iterations
                );
            }
            // The embedded refits give a better starting point for the main fit
            self.parameters = outcome.parameters.clone();
            return Ok(outcome.sigma_sq);
        }

        for component in &self.components {
            warn!(
                "Variance of component {} not found. Default 1.0",
                component.name
            );
        }
        Ok(HashMap::new())
    }

    fn scale_variances(variances: &mut HashMap<String, f64>) {
        let max_component = variances
            .iter()
            .filter(|(k, _)| k.as_str() != DEVICE_VARIANCE_KEY)
            .map(|(_, &v)| v)
            .fold(0.0_f64, f64::max);
        if max_component > 0.0 {
            for value in variances.values_mut() {
                *value /= max_component;
            }
        }
    }

    /// Estimate the kinetic parameters from the attached data.
    ///
    /// For spectral data without user-supplied variances the variance estimator
    /// runs first; the fitted values and standard errors are written back into the
    /// model's parameters. The results are returned and also stored on the model.
    pub fn run_opt(&mut self) -> Result<ResultsObject> {
        if self.concentration_data.is_none() && self.spectra.is_none() {
            return Err(KinFitError::InvalidModel(
                "run_opt needs a dataset; use add_data_file or add_*_data".to_string(),
            ));
        }

        let simulator = self.build_simulator()?;

        let mut variances = self.resolve_variances(&simulator)?;
        if self.settings.general.scale_variances {
            Self::scale_variances(&mut variances);
        }

        let problem = EstimationProblem::new(
            simulator,
            self.parameters.clone(),
            self.component_names(),
            self.concentration_data.clone(),
            self.spectra.clone(),
            variances.clone(),
            self.s_bounds,
        )?;

        if self.settings.general.initialize_from_simulation {
            let initial_cost = problem.eval_cost(&problem.initial_internal()?)?;
            info!(
                "initial objective at simulated trajectories: {:.6e}",
                initial_cost
            );
        }

        let outcome = ParameterEstimator::new(&self.settings).run(&problem)?;
        self.parameters = outcome.parameters.clone();

        // Final trajectories at the fitted values
        let simulation = self.build_simulator()?.run()?;

        let (c, c_times, s, wavelengths, d_hat) = if let Some(spectra) = &self.spectra {
            let times: Vec<f64> = spectra.times().to_vec();
            let z_meas = simulation.z_at(&times);
            let s = EstimationProblem::solve_profiles(&z_meas, spectra.absorbance(), self.s_bounds)?;
            let d_hat = EstimationProblem::reconstruct(&z_meas, &s);
            (
                Some(z_meas),
                Some(spectra.times().clone()),
                Some(s),
                Some(spectra.wavelengths().clone()),
                Some(d_hat),
            )
        } else {
            (None, None, None, None, None)
        };

        let results = ResultsObject {
            parameters: self.parameter_summaries(),
            simulation,
            c,
            c_times,
            s,
            wavelengths,
            d_hat,
            sigma_sq: variances,
            chisqr: outcome.chisqr,
            redchi: outcome.redchi,
            nfree: outcome.nfree,
            iterations: outcome.lm.iterations,
            success: outcome.lm.success,
            message: outcome.lm.message.clone(),
            covariance: outcome.covariance,
            correlation: outcome.correlation,
            confidence: outcome.confidence,
        };
        self.results = Some(results.clone());
        Ok(results)
    }

    /// Render the last run's trajectories (and spectra, when present) as SVG
    /// charts under `dir`. Returns the files written.
    pub fn plot<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let results = self.results.as_ref().ok_or_else(|| {
            KinFitError::InvalidModel("nothing to plot: run simulate or run_opt first".to_string())
        })?;
        crate::plot::render_results(
            &self.name,
            results,
            self.concentration_data.as_ref(),
            dir.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series_model() -> ReactionModel {
        let mut r1 = ReactionModel::new("reaction-1");
        r1.add_parameter_with_bounds("k1", 2.0, 0.0, 5.0).unwrap();
        r1.add_parameter_with_bounds("k2", 0.2, 0.0, 2.0).unwrap();
        r1.add_component("A", 1.0).unwrap();
        r1.add_component("B", 0.0).unwrap();
        r1.add_component("C", 0.0).unwrap();
        r1.add_odes(&[
            ("A", "-k1 * A"),
            ("B", "k1 * A - k2 * B"),
            ("C", "k2 * B"),
        ])
        .unwrap();
        r1.set_times(0.0, 10.0).unwrap();
        r1
    }

    #[test]
    fn test_component_v_is_reserved() {
        let mut model = ReactionModel::new("r");
        match model.add_component("V", 1.0) {
            Err(KinFitError::ReservedName(name, kind)) => {
                assert_eq!(name, "V");
                assert_eq!(kind, "component");
            }
            other => panic!("expected reserved-name error, got {:?}", other),
        }
    }

    #[test]
    fn test_volume_state_reinitialized_not_duplicated() {
        let mut model = ReactionModel::new("r");
        model.add_state("V", 100.0).unwrap();
        assert_eq!(model.states.len(), 1);
        assert_eq!(model.states[0].init_value, 100.0);
    }

    #[test]
    fn test_time_name_reserved() {
        let mut model = ReactionModel::new("r");
        assert!(matches!(
            model.add_component("t", 1.0),
            Err(KinFitError::ReservedName(..))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected_across_kinds() {
        let mut model = ReactionModel::new("r");
        model.add_component("A", 1.0).unwrap();
        assert!(matches!(
            model.add_parameter("A", 1.0),
            Err(KinFitError::DuplicateName(_))
        ));
        assert!(matches!(
            model.add_state("A", 1.0),
            Err(KinFitError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_validation_catches_missing_ode() {
        let mut model = ReactionModel::new("r");
        model.add_component("A", 1.0).unwrap();
        model.set_times(0.0, 1.0).unwrap();
        assert!(matches!(model.validate(), Err(KinFitError::MissingOde(_))));
    }

    #[test]
    fn test_validation_catches_unknown_rate_variable() {
        let mut model = ReactionModel::new("r");
        model.add_component("A", 1.0).unwrap();
        model.add_ode("A", "-k9 * A").unwrap();
        model.set_times(0.0, 1.0).unwrap();
        assert!(matches!(
            model.validate(),
            Err(KinFitError::ExpressionError(_))
        ));
    }

    #[test]
    fn test_validation_needs_horizon() {
        let mut model = ReactionModel::new("r");
        model.add_parameter("k1", 1.0).unwrap();
        model.add_component("A", 1.0).unwrap();
        model.add_ode("A", "-k1 * A").unwrap();
        assert!(model.validate().is_err());
        model.set_times(0.0, 1.0).unwrap();
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_ode_for_undeclared_name_rejected() {
        let mut model = ReactionModel::new("r");
        assert!(matches!(
            model.add_ode("A", "-A"),
            Err(KinFitError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_simulate_series_reaction() {
        let mut model = series_model();
        let results = model.simulate().unwrap();

        let z = results.simulation.z();
        let n = results.simulation.times().len();
        // Mass balance holds along the trajectory
        for i in 0..n {
            let total = z[[i, 0]] + z[[i, 1]] + z[[i, 2]];
            assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        }
        // Volume stays at its default
        assert_relative_eq!(results.simulation.state("V").unwrap()[n - 1], 1.0);
    }

    #[test]
    fn test_volume_can_get_an_ode() {
        let mut model = ReactionModel::new("r");
        model.add_component("A", 1.0).unwrap();
        model.add_ode("A", "-A / V").unwrap();
        model.add_state("V", 100.0).unwrap();
        model.add_ode("V", "240").unwrap();
        model.set_times(0.0, 2.0).unwrap();

        let results = model.simulate().unwrap();
        let n = results.simulation.times().len();
        assert_relative_eq!(
            results.simulation.state("V").unwrap()[n - 1],
            100.0 + 240.0 * 2.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_run_opt_requires_data() {
        let mut model = series_model();
        assert!(matches!(
            model.run_opt(),
            Err(KinFitError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_bound_profile_only_s() {
        let mut model = series_model();
        assert!(model.bound_profile("S", (0.0, 10.0)).is_ok());
        assert!(model.bound_profile("Z", (0.0, 10.0)).is_err());
        assert!(model.bound_profile("S", (10.0, 0.0)).is_err());
    }

    #[test]
    fn test_horizon_from_data_span() {
        let mut model = ReactionModel::new("r");
        model.add_parameter("k1", 1.0).unwrap();
        model.add_component("A", 1.0).unwrap();
        model.add_ode("A", "-k1 * A").unwrap();

        let data = ConcentrationData::from_columns(
            vec![0.0, 1.0, 2.0],
            vec![("A".to_string(), vec![1.0, 0.4, 0.15])],
        )
        .unwrap();
        model.add_concentration_data(data).unwrap();

        assert_eq!(model.horizon().unwrap(), (0.0, 2.0));
    }

    #[test]
    fn test_concentration_data_must_match_components() {
        let mut model = series_model();
        let data = ConcentrationData::from_columns(
            vec![0.0, 1.0],
            vec![("Q".to_string(), vec![1.0, 0.5])],
        )
        .unwrap();
        assert!(matches!(
            model.add_concentration_data(data),
            Err(KinFitError::UnknownVariable(_))
        ));
    }
}

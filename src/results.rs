//! Results of a simulation or estimation run.
//!
//! `ResultsObject` collects everything a run produced: fitted parameter values with
//! their standard errors, the simulated trajectories, concentration and absorbance
//! estimates for spectral runs, the noise variances and the fit statistics.

use crate::error::Result;
use crate::estimate::uncertainty::ConfidenceInterval;
use crate::simulate::SimulationResults;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// One line of the parameter report.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// Everything produced by `run_opt` (or, with the estimation fields empty, by
/// `simulate`).
#[derive(Debug, Clone)]
pub struct ResultsObject {
    /// Parameter summaries in declaration order
    pub parameters: Vec<ParameterSummary>,

    /// Simulated trajectories at the final parameter values
    pub simulation: SimulationResults,

    /// Concentration estimates at the measurement times (spectral runs)
    pub c: Option<Array2<f64>>,

    /// Times the `c` rows correspond to
    pub c_times: Option<Array1<f64>>,

    /// Absorbance profiles, wavelengths x components (spectral runs)
    pub s: Option<Array2<f64>>,

    /// Wavelength grid for `s` (spectral runs)
    pub wavelengths: Option<Array1<f64>>,

    /// Reconstructed spectra `Z * S^T` at the measurement times (spectral runs)
    pub d_hat: Option<Array2<f64>>,

    /// Noise variances keyed by component plus "device"
    pub sigma_sq: HashMap<String, f64>,

    /// Chi-square at the solution (0.0 for plain simulations)
    pub chisqr: f64,

    /// Reduced chi-square
    pub redchi: f64,

    /// Degrees of freedom
    pub nfree: usize,

    /// Optimizer iterations (0 for plain simulations)
    pub iterations: usize,

    /// Whether the optimizer reported convergence
    pub success: bool,

    /// Stopping message from the optimizer
    pub message: String,

    /// Covariance of the free parameters, when available
    pub covariance: Option<Array2<f64>>,

    /// Correlation of the free parameters, when available
    pub correlation: Option<Array2<f64>>,

    /// Confidence intervals per free parameter
    pub confidence: HashMap<String, Vec<ConfidenceInterval>>,
}

impl ResultsObject {
    /// Wrap a plain simulation without estimation statistics.
    pub fn from_simulation(
        parameters: Vec<ParameterSummary>,
        simulation: SimulationResults,
    ) -> Self {
        Self {
            parameters,
            simulation,
            c: None,
            c_times: None,
            s: None,
            wavelengths: None,
            d_hat: None,
            sigma_sq: HashMap::new(),
            chisqr: 0.0,
            redchi: 0.0,
            nfree: 0,
            iterations: 0,
            success: true,
            message: "simulation".to_string(),
            covariance: None,
            correlation: None,
            confidence: HashMap::new(),
        }
    }

    /// The parameter report as a string.
    pub fn parameter_table(&self) -> String {
        let mut out = String::from("The estimated parameters are:\n");
        for p in &self.parameters {
            let _ = write!(out, "{:>12} = {:>14.6e}", p.name, p.value);
            if let Some(stderr) = p.stderr {
                let _ = write!(out, "  +/- {:.6e}", stderr);
            }
            if p.fixed {
                out.push_str("  (fixed)");
            }
            if let Some(units) = &p.units {
                let _ = write!(out, "  [{}]", units);
            }
            out.push('\n');
        }
        out
    }

    /// Print the parameter report to stdout.
    pub fn show_parameters(&self) {
        print!("{}", self.parameter_table());
    }

    /// Look up a fitted parameter value.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    /// Save the parameter summaries as JSON.
    pub fn save_parameters_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.parameters)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write the simulated component trajectories as wide CSV.
    pub fn z_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_matrix_csv(
            path,
            self.simulation.times(),
            self.simulation.components(),
            self.simulation.z(),
        )
    }

    /// Write the complementary state trajectories as wide CSV.
    pub fn x_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_matrix_csv(
            path,
            self.simulation.times(),
            self.simulation.states(),
            self.simulation.x(),
        )
    }

    /// Write the absorbance profiles (wavelength rows) as wide CSV, when present.
    pub fn s_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let (Some(s), Some(wavelengths)) = (&self.s, &self.wavelengths) {
            write_matrix_csv_with_index(
                path,
                "wavelength",
                wavelengths,
                self.simulation.components(),
                s,
            )?;
        }
        Ok(())
    }
}

fn write_matrix_csv<P: AsRef<Path>>(
    path: P,
    times: &Array1<f64>,
    columns: &[String],
    matrix: &Array2<f64>,
) -> Result<()> {
    write_matrix_csv_with_index(path, "time", times, columns, matrix)
}

fn write_matrix_csv_with_index<P: AsRef<Path>>(
    path: P,
    index_label: &str,
    index: &Array1<f64>,
    columns: &[String],
    matrix: &Array2<f64>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;

    let mut header = vec![index_label.to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for (i, &idx) in index.iter().enumerate() {
        let mut record = vec![idx.to_string()];
        for j in 0..matrix.ncols() {
            record.push(matrix[[i, j]].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RateExpr;
    use crate::ode::OdeSystem;
    use crate::settings::Settings;
    use crate::simulate::Simulator;
    use std::collections::HashMap as Map;

    fn sample_results() -> ResultsObject {
        let mut constants = Map::new();
        constants.insert("k1".to_string(), 1.0);
        let system = OdeSystem::new(
            vec!["A".to_string()],
            vec![RateExpr::parse("-k1 * A").unwrap()],
            constants,
            vec![],
        )
        .unwrap();
        let mut settings = Settings::default();
        settings.collocation.nfe = 5;
        settings.collocation.ncp = 1;
        let simulation = Simulator::new(system, vec![1.0], 1, 0.0, 1.0, &settings)
            .unwrap()
            .run()
            .unwrap();

        let parameters = vec![ParameterSummary {
            name: "k1".to_string(),
            value: 1.0,
            stderr: Some(0.05),
            fixed: false,
            units: Some("1/h".to_string()),
        }];
        ResultsObject::from_simulation(parameters, simulation)
    }

    #[test]
    fn test_parameter_table_format() {
        let results = sample_results();
        let table = results.parameter_table();
        assert!(table.starts_with("The estimated parameters are:"));
        assert!(table.contains("k1"));
        assert!(table.contains("+/-"));
        assert!(table.contains("[1/h]"));
    }

    #[test]
    fn test_parameter_lookup() {
        let results = sample_results();
        assert_eq!(results.parameter("k1"), Some(1.0));
        assert_eq!(results.parameter("k2"), None);
    }

    #[test]
    fn test_csv_and_json_export() {
        let results = sample_results();
        let dir = tempfile::tempdir().unwrap();

        let z_path = dir.path().join("z.csv");
        results.z_to_csv(&z_path).unwrap();
        let contents = std::fs::read_to_string(&z_path).unwrap();
        assert!(contents.starts_with("time,A"));
        assert_eq!(contents.lines().count(), 7);

        let json_path = dir.path().join("params.json");
        results.save_parameters_json(&json_path).unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.contains("\"name\": \"k1\""));
    }
}

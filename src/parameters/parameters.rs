//! An ordered collection of kinetic parameters.
//!
//! Insertion order is significant: the estimator maps the free parameters onto its
//! internal vector in this order, and reports follow it as well.

use crate::parameters::parameter::{Parameter, ParameterError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Ordered, name-keyed set of [`Parameter`]s.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    /// Insertion order of parameter names
    order: Vec<String>,

    /// Name -> parameter storage
    map: HashMap<String, Parameter>,
}

impl Parameters {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; duplicate names are rejected.
    pub fn add(&mut self, param: Parameter) -> Result<(), ParameterError> {
        let name = param.name().to_string();
        if self.map.contains_key(&name) {
            return Err(ParameterError::DuplicateParameter { name });
        }
        self.order.push(name.clone());
        self.map.insert(name, param);
        Ok(())
    }

    /// Convenience: add a free, unbounded parameter.
    pub fn add_param(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.add(Parameter::new(name, value))
    }

    /// Convenience: add a free parameter with bounds.
    pub fn add_param_with_bounds(
        &mut self,
        name: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ParameterError> {
        self.add(Parameter::with_bounds(name, value, min, max)?)
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.map.get(name)
    }

    /// Mutable lookup by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.map.get_mut(name)
    }

    /// Whether a parameter with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Remove a parameter, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        self.order.retain(|n| n != name);
        self.map.remove(name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Parameter names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Iterate parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.order.iter().filter_map(|name| self.map.get(name))
    }

    /// All current values in insertion order.
    pub fn values(&self) -> Vec<f64> {
        self.iter().map(|p| p.value()).collect()
    }

    /// Name -> value map of every parameter (the simulation environment view).
    pub fn value_map(&self) -> HashMap<String, f64> {
        self.iter()
            .map(|p| (p.name().to_string(), p.value()))
            .collect()
    }

    /// The free (not fixed) parameters, in insertion order.
    pub fn free(&self) -> Vec<&Parameter> {
        self.iter().filter(|p| !p.fixed()).collect()
    }

    /// The fixed parameters, in insertion order.
    pub fn fixed(&self) -> Vec<&Parameter> {
        self.iter().filter(|p| p.fixed()).collect()
    }

    /// Names of the free parameters, in insertion order.
    pub fn free_names(&self) -> Vec<String> {
        self.free().iter().map(|p| p.name().to_string()).collect()
    }

    /// Internal (transformed) values of the free parameters, for the optimizer.
    pub fn free_internal_values(&self) -> Result<Vec<f64>, ParameterError> {
        self.free().iter().map(|p| p.to_internal()).collect()
    }

    /// Write a vector of internal optimizer values back into the free parameters.
    ///
    /// The slice must contain exactly one entry per free parameter, in insertion
    /// order. Values pass through each parameter's bounds transform so they always
    /// land inside the bounds.
    pub fn update_from_internal(&mut self, internal: &[f64]) -> Result<(), ParameterError> {
        let free_names = self.free_names();
        if internal.len() != free_names.len() {
            return Err(ParameterError::ParameterNotFound {
                name: format!(
                    "expected {} free parameter values, got {}",
                    free_names.len(),
                    internal.len()
                ),
            });
        }

        for (name, &value) in free_names.iter().zip(internal.iter()) {
            let param = self
                .map
                .get_mut(name)
                .ok_or_else(|| ParameterError::ParameterNotFound { name: name.clone() })?;
            let external = param.from_internal(value);
            param.set_value(external)?;
        }
        Ok(())
    }

    /// Set a parameter value by name.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.map
            .get_mut(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?
            .set_value(value)
    }

    /// Reset every parameter to its initial guess.
    pub fn reset(&mut self) {
        for name in &self.order {
            if let Some(param) = self.map.get_mut(name) {
                param.reset();
            }
        }
    }

    /// Serialize to a JSON array (insertion order preserved).
    pub fn to_json(&self) -> crate::error::Result<String> {
        let ordered: Vec<&Parameter> = self.iter().collect();
        Ok(serde_json::to_string_pretty(&ordered)?)
    }

    /// Parse from the JSON produced by [`Parameters::to_json`].
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let list: Vec<Parameter> = serde_json::from_str(json)?;
        let mut params = Self::new();
        for param in list {
            params.add(param).map_err(crate::error::KinFitError::from)?;
        }
        Ok(params)
    }

    /// Save as JSON to a file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load from a JSON file written by [`Parameters::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Serialize for Parameters {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let ordered: Vec<&Parameter> = self.iter().collect();
        ordered.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let list: Vec<Parameter> = Vec::deserialize(deserializer)?;
        let mut params = Self::new();
        for param in list {
            params
                .add(param)
                .map_err(|e| serde::de::Error::custom(format!("{}", e)))?;
        }
        Ok(params)
    }
}

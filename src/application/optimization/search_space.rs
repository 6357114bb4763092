use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Inclusive bounds and base step for one tunable parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Range centred on a value with no configured bounds: ten steps of 10% each way
    pub fn around(value: f64) -> Self {
        let step = (value.abs() * 0.1).max(0.01);
        let mut min = value - 10.0 * step;
        if value >= 0.0 {
            min = min.max(0.0);
        }
        Self {
            min,
            max: value + 10.0 * step,
            step,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && self.step > 0.0
            && self.min <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Named parameter ranges the tuner may explore.
///
/// Loadable from TOML, one table per parameter:
///
/// ```toml
/// [stop_loss_pct]
/// min = 0.005
/// max = 0.1
/// step = 0.005
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    ranges: BTreeMap<String, ParameterRange>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ranges for the parameters every generated strategy exposes
    pub fn standard() -> Self {
        Self::new()
            .with("entry_threshold", ParameterRange::new(0.5, 3.0, 0.25))
            .with("stop_loss_pct", ParameterRange::new(0.005, 0.1, 0.005))
            .with("take_profit_pct", ParameterRange::new(0.01, 0.2, 0.01))
            .with("position_size", ParameterRange::new(0.1, 1.0, 0.1))
    }

    pub fn with(mut self, name: impl Into<String>, range: ParameterRange) -> Self {
        self.ranges.insert(name.into(), range);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let space: SearchSpace = toml::from_str(content).context("Failed to parse search space TOML")?;
        for (name, range) in &space.ranges {
            if !range.is_valid() {
                bail!(
                    "Invalid range for '{}': min {} max {} step {}",
                    name,
                    range.min,
                    range.max,
                    range.step
                );
            }
        }
        Ok(space)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read search space file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid search space file: {}", path.display()))
    }

    /// Entries of `other` replace entries with the same name
    pub fn merge(mut self, other: SearchSpace) -> Self {
        self.ranges.extend(other.ranges);
        self
    }

    /// Adds an `around` range for every parameter without one
    pub fn covering<'a>(mut self, parameters: impl IntoIterator<Item = (&'a String, &'a f64)>) -> Self {
        for (name, value) in parameters {
            self.ranges
                .entry(name.clone())
                .or_insert_with(|| ParameterRange::around(*value));
        }
        self
    }

    pub fn range(&self, name: &str) -> Option<&ParameterRange> {
        self.ranges.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.ranges.keys()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

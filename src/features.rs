//! Feature names, validation bounds and the positional vector fed to the model.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::weather::WeatherReading;

/// Order of the model's input columns. Validation walks the features in
/// this order as well, so the first reported error is reproducible.
pub const FEATURE_ORDER: [&str; 7] = ["N", "P", "K", "temperature", "humidity", "ph", "rainfall"];

pub const FEATURE_COUNT: usize = FEATURE_ORDER.len();

/// Inclusive bounds for one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    const fn new(name: &'static str, min: f64, max: f64) -> Self {
        Self { name, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub const RANGE_TABLE: [FeatureRange; FEATURE_COUNT] = [
    FeatureRange::new("N", 0.0, 100.0),
    FeatureRange::new("P", 0.0, 100.0),
    FeatureRange::new("K", 0.0, 100.0),
    FeatureRange::new("temperature", 0.0, 50.0),
    FeatureRange::new("humidity", 0.0, 100.0),
    FeatureRange::new("ph", 0.0, 14.0),
    FeatureRange::new("rainfall", 0.0, 500.0),
];

/// Validated model input, indexed by `FEATURE_ORDER`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<f64> {
        FEATURE_ORDER
            .iter()
            .position(|feature| *feature == name)
            .map(|index| self.0[index])
    }
}

/// Raw request fields merged with the fetched weather.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    fields: Map<String, Value>,
}

impl FeatureSet {
    #[cfg(test)]
    pub(crate) fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Weather values replace any `temperature`/`humidity` the caller sent.
    pub fn merge(user: Map<String, Value>, weather: &WeatherReading) -> Self {
        let mut fields = user;
        fields.insert("temperature".to_string(), Value::from(weather.temperature));
        fields.insert("humidity".to_string(), Value::from(weather.humidity));
        Self { fields }
    }

    /// Checks every feature in table order and stops at the first problem.
    pub fn validate(&self) -> Result<FeatureVector, ValidationError> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, range) in values.iter_mut().zip(RANGE_TABLE.iter()) {
            let raw = self
                .fields
                .get(range.name)
                .ok_or(ValidationError::Missing(range.name))?;
            let value = numeric(raw).ok_or(ValidationError::NonNumeric(range.name))?;
            if !range.contains(value) {
                return Err(ValidationError::OutOfRange {
                    feature: range.name,
                    min: range.min,
                    max: range.max,
                });
            }
            *slot = value;
        }
        Ok(FeatureVector(values))
    }
}

/// JSON numbers and numeric strings count; everything else does not.
/// Booleans are rejected on purpose, unlike Python's `float(True) == 1.0`.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

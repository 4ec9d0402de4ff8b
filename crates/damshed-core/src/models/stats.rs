//! Per-dam statistics records.

use serde::{Deserialize, Serialize};

use crate::error::{DamshedError, Result};

/// Out-of-domain value marking a statistic that could not be computed
pub const DEFAULT_SENTINEL: f64 = -9999.0;

/// Attribute name of the computed catchment area
pub const AREA_FIELD: &str = "area_calc";

/// Ordered, run-wide list of tracked variable names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedVariables(Vec<String>);

impl TrackedVariables {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(DamshedError::ConfigInvalid {
                key: "variables".to_string(),
                reason: "at least one tracked variable is required".to_string(),
            });
        }

        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(DamshedError::ConfigInvalid {
                    key: "variables".to_string(),
                    reason: format!("variable #{} has an empty name", i + 1),
                });
            }
            if name == AREA_FIELD {
                return Err(DamshedError::ConfigInvalid {
                    key: "variables".to_string(),
                    reason: format!("'{}' is reserved for the computed area", AREA_FIELD),
                });
            }
            if names[..i].contains(name) {
                return Err(DamshedError::ConfigInvalid {
                    key: "variables".to_string(),
                    reason: format!("variable '{}' is listed twice", name),
                });
            }
        }

        Ok(Self(names))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of every statistics record: one mean per variable plus the area
    pub fn record_len(&self) -> usize {
        self.0.len() + 1
    }

    /// Attribute fields written on merge, in record order
    pub fn field_names(&self) -> Vec<String> {
        let mut fields = self.0.clone();
        fields.push(AREA_FIELD.to_string());
        fields
    }
}

/// Variable means in run order followed by the catchment area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatisticsRecord(Vec<f64>);

impl StatisticsRecord {
    pub fn new(means: Vec<f64>, area: f64) -> Self {
        let mut values = means;
        values.push(area);
        Self(values)
    }

    /// Rebuild a record from stored values, checking its shape
    pub fn from_values(dam_id: &str, values: Vec<f64>, variables: &TrackedVariables) -> Result<Self> {
        if values.len() != variables.record_len() {
            return Err(DamshedError::ShapeMismatch {
                dam_id: dam_id.to_string(),
                expected: variables.record_len(),
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn means(&self) -> &[f64] {
        &self.0[..self.0.len().saturating_sub(1)]
    }

    pub fn area(&self) -> Option<f64> {
        self.0.last().copied()
    }

    /// Number of entries holding the sentinel
    pub fn unknown_count(&self, sentinel: f64) -> usize {
        self.0.iter().filter(|v| **v == sentinel).count()
    }
}

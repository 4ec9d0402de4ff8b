//! Vector feature layers (dam points, river reaches, variable polygons).

use geo::Geometry;
use serde_json::{Map, Value};

/// A single vector feature with attributes
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    /// Feature ID from the source file, if it had one
    pub id: Option<String>,

    pub geometry: Option<Geometry<f64>>,

    pub properties: Map<String, Value>,
}

impl VectorFeature {
    /// Human-readable label for log messages
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// Read a numeric attribute, accepting numbers and numeric strings
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.properties.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Write a floating point attribute, replacing any existing value
    pub fn set_number(&mut self, field: &str, value: f64) {
        let value = serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null);
        self.properties.insert(field.to_string(), value);
    }
}

/// An ordered collection of features read from one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    pub features: Vec<VectorFeature>,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, features: Vec<VectorFeature>) -> Self {
        Self { name: name.into(), features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Attribute equality predicate used to select features
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePredicate {
    pub field: String,
    pub value: Value,
}

impl AttributePredicate {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }

    /// Check a feature against the predicate.
    ///
    /// Numbers compare numerically so that `7`, `7.0` and `"7"` all match.
    pub fn matches(&self, feature: &VectorFeature) -> bool {
        let Some(actual) = feature.properties.get(&self.field) else {
            return false;
        };

        match (as_number(actual), as_number(&self.value)) {
            (Some(a), Some(b)) => a == b,
            _ => actual == &self.value,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(props: Value) -> VectorFeature {
        VectorFeature {
            id: Some("f1".to_string()),
            geometry: None,
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_predicate_numeric_match() {
        let f = feature(json!({"HYRIV_ID": 7}));
        assert!(AttributePredicate::equals("HYRIV_ID", 7).matches(&f));
        assert!(AttributePredicate::equals("HYRIV_ID", 7.0).matches(&f));
        assert!(AttributePredicate::equals("HYRIV_ID", "7").matches(&f));
        assert!(!AttributePredicate::equals("HYRIV_ID", 8).matches(&f));
        assert!(!AttributePredicate::equals("OTHER", 7).matches(&f));
    }

    #[test]
    fn test_predicate_text_match() {
        let f = feature(json!({"NAME": "Kariba"}));
        assert!(AttributePredicate::equals("NAME", "Kariba").matches(&f));
        assert!(!AttributePredicate::equals("NAME", "Aswan").matches(&f));
    }

    #[test]
    fn test_set_number_overwrites() {
        let mut f = feature(json!({"area_calc": "old"}));
        f.set_number("area_calc", 12.5);
        assert_eq!(f.number("area_calc"), Some(12.5));

        f.set_number("bad", f64::NAN);
        assert_eq!(f.properties.get("bad"), Some(&Value::Null));
    }
}

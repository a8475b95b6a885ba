//! Flat applicant records and the transforms that enrich them before scoring.
//!
//! Every stage of the pipeline reads and writes a [`FeatureRecord`]: the request payload seeds
//! it, the bureau extraction merges into it, and the remaps, trend features and fill table
//! complete it before the scaler selects its columns.

mod client;
mod fill;
pub(crate) mod mapping;
pub(crate) mod normalizer;
pub(crate) mod stats;
mod trends;

pub use client::{backup_client_variables, bureau_client_variables, remap_behavior};
pub use fill::FillPlan;
pub use mapping::{CategoryMap, Remapper};
pub use trends::{bureau_age_days, monthly_series_features, quarterly_balance_trend};

use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::BTreeMap;

use normalizer::{parse_datetime, parse_numeric};

/// A single cell of the applicant record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Numeric view of the value; text is parsed best-effort and anything else is NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Number(value) => *value,
            FieldValue::Text(raw) => parse_numeric(raw).unwrap_or(f64::NAN),
            FieldValue::Missing => f64::NAN,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(raw) => Some(raw.as_str()),
            _ => None,
        }
    }

    /// Label used for categorical lookups; integral numbers render without a fraction.
    pub fn label(&self) -> Option<String> {
        match self {
            FieldValue::Text(raw) => Some(raw.clone()),
            FieldValue::Number(value) if value.is_finite() => {
                if value.fract() == 0.0 {
                    Some(format!("{}", *value as i64))
                } else {
                    Some(value.to_string())
                }
            }
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            FieldValue::Missing => true,
            FieldValue::Number(value) => value.is_nan(),
            FieldValue::Text(_) => false,
        }
    }

    /// Missing, NaN or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(raw) => raw.trim().is_empty(),
            other => other.is_missing(),
        }
    }

    /// Number that sweeps infinities and NaN to [`FieldValue::Missing`].
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            FieldValue::Number(value)
        } else {
            FieldValue::Missing
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Missing,
            Value::Bool(flag) => FieldValue::Number(if *flag { 1.0 } else { 0.0 }),
            Value::Number(number) => number
                .as_f64()
                .map(FieldValue::number)
                .unwrap_or(FieldValue::Missing),
            Value::String(raw) => FieldValue::Text(raw.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Ordered name → value map holding one applicant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record from the `cliente` object of a request.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Numeric value of `key`, NaN when absent or non-numeric.
    pub fn number(&self, key: &str) -> f64 {
        self.fields
            .get(key)
            .map(FieldValue::as_f64)
            .unwrap_or(f64::NAN)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_text)
    }

    pub fn datetime(&self, key: &str) -> Option<NaiveDateTime> {
        self.text(key).and_then(parse_datetime)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn set_number(&mut self, key: impl Into<String>, value: f64) {
        self.fields.insert(key.into(), FieldValue::number(value));
    }

    pub fn insert_if_absent(&mut self, key: &str, value: FieldValue) {
        if !self.fields.contains_key(key) {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Names of every field matching `predicate`, in key order.
    pub fn keys_matching<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.fields
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect()
    }

    /// Numeric values of the listed fields, NaN for missing entries.
    pub fn numbers(&self, keys: &[String]) -> Vec<f64> {
        keys.iter().map(|key| self.number(key)).collect()
    }

    pub fn remove_matching<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.fields.len();
        self.fields.retain(|key, _| !predicate(key));
        before - self.fields.len()
    }

    /// Add every field of `other` that this record does not carry yet.
    ///
    /// Returns the names that were already present and therefore kept.
    pub fn merge_absent(&mut self, other: FeatureRecord) -> Vec<String> {
        let mut collisions = Vec::new();
        for (key, value) in other.fields {
            if self.fields.contains_key(&key) {
                collisions.push(key);
            } else {
                self.fields.insert(key, value);
            }
        }
        collisions
    }

    /// Replace the value of `key` with the value of `source` (missing when absent).
    pub fn alias(&mut self, key: &str, source: &str) {
        let value = self.fields.get(source).cloned().unwrap_or(FieldValue::Missing);
        self.fields.insert(key.to_string(), value);
    }
}

impl FromIterator<(String, FieldValue)> for FeatureRecord {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_map_onto_field_variants() {
        let payload = json!({
            "dni_cliente": 1012345678,
            "nombre": "Ana",
            "p3": true,
            "edad_al_contratar": null,
        });
        let record = FeatureRecord::from_json_object(payload.as_object().expect("object"));

        assert_eq!(record.number("dni_cliente"), 1012345678.0);
        assert_eq!(record.text("nombre"), Some("Ana"));
        assert_eq!(record.number("p3"), 1.0);
        assert!(record.get("edad_al_contratar").expect("present").is_missing());
    }

    #[test]
    fn set_number_sweeps_infinities() {
        let mut record = FeatureRecord::new();
        record.set_number("ratio", f64::INFINITY);
        record.set_number("nan", f64::NAN);
        assert_eq!(record.get("ratio"), Some(&FieldValue::Missing));
        assert_eq!(record.get("nan"), Some(&FieldValue::Missing));
    }

    #[test]
    fn merge_absent_keeps_existing_fields() {
        let mut record = FeatureRecord::new();
        record.insert("quanto", 10.0);
        let mut bureau = FeatureRecord::new();
        bureau.insert("quanto", 99.0);
        bureau.insert("fechaConsulta", "2024-05-10");

        let collisions = record.merge_absent(bureau);

        assert_eq!(collisions, vec!["quanto".to_string()]);
        assert_eq!(record.number("quanto"), 10.0);
        assert_eq!(record.text("fechaConsulta"), Some("2024-05-10"));
    }

    #[test]
    fn numeric_text_is_readable_as_number() {
        let mut record = FeatureRecord::new();
        record.insert("score_experian", "  7 ");
        record.insert("departamento", "Antioquia");
        assert_eq!(record.number("score_experian"), 7.0);
        assert!(record.number("departamento").is_nan());
        assert!(record.number("absent").is_nan());
    }

    #[test]
    fn labels_render_integral_numbers_without_fraction() {
        assert_eq!(FieldValue::Number(2.0).label().as_deref(), Some("2"));
        assert_eq!(FieldValue::Number(2.5).label().as_deref(), Some("2.5"));
        assert_eq!(FieldValue::Missing.label(), None);
    }
}

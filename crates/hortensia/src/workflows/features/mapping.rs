use super::normalizer::normalize_label;
use super::FieldValue;
use crate::config::MappingTables;
use std::collections::{BTreeMap, HashMap};

/// Lookup table from a free-text label to a numeric code, keyed by normalized label.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    codes: HashMap<String, f64>,
}

impl CategoryMap {
    pub fn new(entries: &BTreeMap<String, f64>) -> Self {
        let mut codes = HashMap::with_capacity(entries.len());
        for (label, code) in entries {
            codes.insert(normalize_label(label), *code);
        }
        Self { codes }
    }

    pub fn code_for(&self, label: &str) -> Option<f64> {
        self.codes.get(&normalize_label(label)).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Categorical remapping for departments, job types and genders.
///
/// Department labels pass through the known-typo table before the region lookup.
#[derive(Debug, Clone, Default)]
pub struct Remapper {
    departments: CategoryMap,
    job_types: CategoryMap,
    genders: CategoryMap,
    corrections: HashMap<String, String>,
    unmapped: Option<f64>,
}

impl Remapper {
    pub fn new(tables: &MappingTables, common_errors: &BTreeMap<String, String>) -> Self {
        let corrections = common_errors
            .iter()
            .map(|(typo, canonical)| (normalize_label(typo), normalize_label(canonical)))
            .collect();

        Self {
            departments: CategoryMap::new(&tables.departments),
            job_types: CategoryMap::new(&tables.job_types),
            genders: CategoryMap::new(&tables.genders),
            corrections,
            unmapped: tables.unmapped_code,
        }
    }

    /// Canonical department label after normalization and typo correction.
    pub fn canonical_department(&self, label: &str) -> String {
        let normalized = normalize_label(label);
        self.corrections
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    pub fn department_code(&self, value: Option<&FieldValue>) -> FieldValue {
        self.department_code_or(value, self.unmapped)
    }

    /// Department region code with an explicit fallback for labels outside the table.
    pub fn department_code_or(&self, value: Option<&FieldValue>, fallback: Option<f64>) -> FieldValue {
        let Some(label) = value.and_then(FieldValue::label) else {
            return fallback_value(fallback);
        };
        let canonical = self.canonical_department(&label);
        match self.departments.code_for(&canonical) {
            Some(code) => FieldValue::Number(code),
            None => fallback_value(fallback),
        }
    }

    pub fn job_type_code(&self, value: Option<&FieldValue>) -> FieldValue {
        lookup(&self.job_types, value, self.unmapped)
    }

    pub fn gender_code(&self, value: Option<&FieldValue>) -> FieldValue {
        lookup(&self.genders, value, self.unmapped)
    }
}

fn lookup(map: &CategoryMap, value: Option<&FieldValue>, fallback: Option<f64>) -> FieldValue {
    value
        .and_then(FieldValue::label)
        .and_then(|label| map.code_for(&label))
        .map(FieldValue::Number)
        .unwrap_or_else(|| fallback_value(fallback))
}

fn fallback_value(fallback: Option<f64>) -> FieldValue {
    fallback.map(FieldValue::Number).unwrap_or(FieldValue::Missing)
}

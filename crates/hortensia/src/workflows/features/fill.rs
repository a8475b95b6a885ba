use super::{FeatureRecord, FieldValue};

/// Default table for columns a model may read but the pipeline did not produce.
///
/// `nulls` are synthesized as missing and `zeros` as 0. Columns that already exist are never
/// touched, whatever their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillPlan {
    pub nulls: Vec<String>,
    pub zeros: Vec<String>,
}

impl FillPlan {
    pub fn new(nulls: Vec<String>, zeros: Vec<String>) -> Self {
        Self { nulls, zeros }
    }

    /// Synthesize absent columns, then sweep non-finite numbers to missing.
    ///
    /// Returns how many columns were added.
    pub fn apply(&self, record: &mut FeatureRecord) -> usize {
        let before = record.len();
        for column in &self.nulls {
            record.insert_if_absent(column, FieldValue::Missing);
        }
        for column in &self.zeros {
            record.insert_if_absent(column, FieldValue::Number(0.0));
        }
        let added = record.len() - before;
        sweep_non_finite(record);
        added
    }
}

fn sweep_non_finite(record: &mut FeatureRecord) {
    let keys = record.keys_matching(|_| true);
    for key in keys {
        let non_finite = matches!(record.get(&key), Some(FieldValue::Number(value)) if !value.is_finite());
        if non_finite {
            record.insert(key, FieldValue::Missing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_columns_get_documented_defaults() {
        let plan = FillPlan::new(
            vec!["promedio_cuota".to_string(), "quanto".to_string()],
            vec!["num_consultas".to_string(), "Cuentas_sector1".to_string()],
        );
        let mut record = FeatureRecord::new();
        record.insert("quanto", 812.0);
        record.insert("Cuentas_sector1", FieldValue::Missing);

        let added = plan.apply(&mut record);

        assert_eq!(added, 2);
        assert!(record.get("promedio_cuota").expect("null column").is_missing());
        assert_eq!(record.number("num_consultas"), 0.0);
        assert_eq!(record.number("quanto"), 812.0);
        assert!(record.get("Cuentas_sector1").expect("kept").is_missing());
    }

    #[test]
    fn stray_infinities_are_swept() {
        let mut record = FeatureRecord::from_iter([
            ("ratio".to_string(), FieldValue::Number(f64::INFINITY)),
            ("edad".to_string(), FieldValue::Number(30.0)),
        ]);

        FillPlan::default().apply(&mut record);

        assert_eq!(record.get("ratio"), Some(&FieldValue::Missing));
        assert_eq!(record.number("edad"), 30.0);
    }
}

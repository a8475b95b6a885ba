use super::mapping::Remapper;
use super::{FeatureRecord, FieldValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Residence region assumed by the backup engine when the department is unknown.
const BACKUP_RESIDENCE_REGION: f64 = 6.0;

/// Demographic and regional variables shared by the bureau-backed engines.
pub fn bureau_client_variables(
    record: &mut FeatureRecord,
    remapper: &Remapper,
    macros: &BTreeMap<String, f64>,
) {
    let job_type = remapper.job_type_code(record.get("tipo_trabajo"));
    let gender = remapper.gender_code(record.get("genero"));
    record.remove("tipo_trabajo");
    record.insert("tipo_trabajo_cliente", job_type);
    record.insert("genero_cliente", gender);

    let age = record
        .remove("edad_al_contratar")
        .unwrap_or(FieldValue::Number(0.0));
    record.insert("edad_cliente", age);

    let p6 = record.get("p6").cloned().unwrap_or(FieldValue::Number(0.0));
    record.insert("puntaje_p6", p6);

    let expedition = expedition_region(record, remapper);
    record.insert("region_exp", expedition);

    let birth = remapper.department_code(record.get("dpto_nac"));
    let residence = remapper.department_code(record.get("departamento_actual"));
    let retailer = remapper.department_code(record.get("constitucion_department_retailer"));
    record.insert("region_nac", birth);
    record.insert("region_res", residence);
    record.insert("region_ret", retailer);

    inject_macros(record, macros);
    debug!(fields = record.len(), "client variables computed");
}

/// The expedition department falls back to the birth department; Bogota is keyed by city.
fn expedition_region(record: &FeatureRecord, remapper: &Remapper) -> FieldValue {
    let Some(declared) = record.get("departamento_exp") else {
        return FieldValue::Number(-1.0);
    };

    if record.text("ciudad_exp") == Some("BOGOTA D.C.") {
        return remapper.department_code(Some(&FieldValue::from("bogota")));
    }

    if declared.is_blank() {
        remapper.department_code(record.get("dpto_nac"))
    } else {
        remapper.department_code(Some(declared))
    }
}

/// Client variables for the engine that scores without a bureau report.
pub fn backup_client_variables(
    record: &mut FeatureRecord,
    remapper: &Remapper,
    macros: &BTreeMap<String, f64>,
) {
    let residence =
        remapper.department_code_or(record.get("departamento_actual"), Some(BACKUP_RESIDENCE_REGION));
    let birth = remapper.department_code(record.get("dpto_nac"));
    let retailer = remapper.department_code(record.get("constitucion_department_retailer"));
    let job_type = remapper.job_type_code(record.get("tipo_trabajo"));
    let gender = remapper.gender_code(record.get("genero"));

    record.insert("region_res", residence);
    record.insert("region_nac", birth);
    record.insert("region_ret", retailer);
    record.insert("tipo_trabajo", job_type);
    record.insert("genero", gender);
    inject_macros(record, macros);

    record.alias("genero_cliente", "genero");
    record.alias("numero_hijos_cliente", "numero_hijos");
    record.alias("tiene_tarjeta_credito", "tarjeta_credito");
    record.alias("tipo_trabajo_cliente", "tipo_trabajo");
    record.alias("Edad", "edad_al_contratar");
}

fn inject_macros(record: &mut FeatureRecord, macros: &BTreeMap<String, f64>) {
    for (name, value) in macros {
        record.set_number(name.as_str(), *value);
    }
}

/// Map payment-behavior letters to codes. Absent or unknown entries become 1.
pub fn remap_behavior(
    record: &mut FeatureRecord,
    columns: &[String],
    behavior_map: &BTreeMap<String, f64>,
) {
    for column in columns {
        let code = record
            .get(column)
            .and_then(FieldValue::label)
            .and_then(|label| behavior_map.get(label.trim()).copied())
            .unwrap_or(1.0);
        record.set_number(column.as_str(), code);
    }

    let quarters: Vec<String> = (1..=3)
        .map(|quarter| format!("trimestre_{quarter}_moraMaxima"))
        .collect();
    if quarters.iter().all(|key| record.contains(key)) {
        for key in quarters {
            let value = match record.get(&key) {
                Some(FieldValue::Text(raw)) => {
                    FieldValue::number(raw.replace("M ", "").trim().parse().unwrap_or(f64::NAN))
                }
                Some(other) => FieldValue::number(other.as_f64()),
                None => FieldValue::Missing,
            };
            record.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingTables;

    fn remapper() -> Remapper {
        let tables = MappingTables {
            departments: BTreeMap::from([
                ("antioquia".to_string(), 2.0),
                ("bogota".to_string(), 1.0),
                ("valle del cauca".to_string(), 3.0),
            ]),
            job_types: BTreeMap::from([("Empleado".to_string(), 1.0)]),
            genders: BTreeMap::from([("F".to_string(), 0.0), ("M".to_string(), 1.0)]),
            unmapped_code: None,
        };
        Remapper::new(&tables, &BTreeMap::new())
    }

    fn macros() -> BTreeMap<String, f64> {
        BTreeMap::from([("Var_TD3".to_string(), -0.4), ("IBR_Var".to_string(), 0.1)])
    }

    #[test]
    fn bureau_variables_remap_demographics_and_regions() {
        let mut record = FeatureRecord::new();
        record.insert("tipo_trabajo", "Empleado");
        record.insert("genero", "F");
        record.insert("edad_al_contratar", 35.0);
        record.insert("p6", 640.0);
        record.insert("departamento_exp", FieldValue::Missing);
        record.insert("dpto_nac", "Antioquia");
        record.insert("departamento_actual", "Valle del Cauca");
        record.insert("constitucion_department_retailer", "Sin registro");

        bureau_client_variables(&mut record, &remapper(), &macros());

        assert_eq!(record.number("tipo_trabajo_cliente"), 1.0);
        assert!(!record.contains("tipo_trabajo"));
        assert_eq!(record.number("genero_cliente"), 0.0);
        assert_eq!(record.number("edad_cliente"), 35.0);
        assert!(!record.contains("edad_al_contratar"));
        assert_eq!(record.number("puntaje_p6"), 640.0);
        assert_eq!(record.number("region_exp"), 2.0);
        assert_eq!(record.number("region_nac"), 2.0);
        assert_eq!(record.number("region_res"), 3.0);
        assert!(record.number("region_ret").is_nan());
        assert_eq!(record.number("Var_TD3"), -0.4);
    }

    #[test]
    fn expedition_region_defaults_without_bureau_department() {
        let mut record = FeatureRecord::new();
        record.insert("dpto_nac", "Antioquia");

        bureau_client_variables(&mut record, &remapper(), &BTreeMap::new());

        assert_eq!(record.number("region_exp"), -1.0);
        assert_eq!(record.number("edad_cliente"), 0.0);
    }

    #[test]
    fn bogota_is_resolved_from_the_city() {
        let mut record = FeatureRecord::new();
        record.insert("departamento_exp", "CUNDINAMARCA");
        record.insert("ciudad_exp", "BOGOTA D.C.");

        bureau_client_variables(&mut record, &remapper(), &BTreeMap::new());

        assert_eq!(record.number("region_exp"), 1.0);
    }

    #[test]
    fn backup_variables_rename_and_default_residence() {
        let mut record = FeatureRecord::new();
        record.insert("departamento_actual", "Amazonas");
        record.insert("dpto_nac", "Antioquia");
        record.insert("genero", "M");
        record.insert("numero_hijos", 2.0);
        record.insert("tarjeta_credito", 1.0);
        record.insert("tipo_trabajo", "Empleado");
        record.insert("edad_al_contratar", 41.0);

        backup_client_variables(&mut record, &remapper(), &macros());

        assert_eq!(record.number("region_res"), 6.0);
        assert_eq!(record.number("region_nac"), 2.0);
        assert_eq!(record.number("genero_cliente"), 1.0);
        assert_eq!(record.number("numero_hijos_cliente"), 2.0);
        assert_eq!(record.number("tiene_tarjeta_credito"), 1.0);
        assert_eq!(record.number("tipo_trabajo_cliente"), 1.0);
        assert_eq!(record.number("Edad"), 41.0);
        assert_eq!(record.number("IBR_Var"), 0.1);
    }

    #[test]
    fn behavior_letters_map_with_default_one() {
        let mut record = FeatureRecord::new();
        record.insert("comportamiento_1", "N");
        record.insert("comportamiento_2", "Z");
        record.insert("trimestre_1_moraMaxima", "M 30");
        record.insert("trimestre_2_moraMaxima", "M 0");
        record.insert("trimestre_3_moraMaxima", "60");
        let columns: Vec<String> = (1..=3).map(|i| format!("comportamiento_{i}")).collect();
        let map = BTreeMap::from([("N".to_string(), 0.0), ("1".to_string(), 2.0)]);

        remap_behavior(&mut record, &columns, &map);

        assert_eq!(record.number("comportamiento_1"), 0.0);
        assert_eq!(record.number("comportamiento_2"), 1.0);
        assert_eq!(record.number("comportamiento_3"), 1.0);
        assert_eq!(record.number("trimestre_1_moraMaxima"), 30.0);
        assert_eq!(record.number("trimestre_2_moraMaxima"), 0.0);
        assert_eq!(record.number("trimestre_3_moraMaxima"), 60.0);
    }
}

//! Derived bureau features, applied in a fixed order right after extraction.

use super::BureauFlavor;
use crate::workflows::features::normalizer::parse_datetime;
use crate::workflows::features::stats::{
    count_present, days_between, months_between, ols_slope, safe_div, sum_present,
};
use crate::workflows::features::{FeatureRecord, FieldValue};
use chrono::{Months, NaiveDateTime};
use tracing::debug;

const GOOD_STATE_CODES: [f64; 2] = [1.0, 3.0];
const ACTIVE_STATE_CODES: [f64; 2] = [1.0, 2.0];
const DEBT_CAPACITY_SHARE: f64 = 0.4;

pub(crate) fn apply(
    record: &mut FeatureRecord,
    flavor: BureauFlavor,
    competitor_nits: &[u64],
    inquiries: usize,
) {
    income_ratios(record, flavor);
    record.remove_matching(is_installment_column);

    portfolio_quality(record, flavor, competitor_nits);
    record.remove_matching(|key| key.contains("Cartera") && key.ends_with("codigo"));

    debt_capacity(record);

    if inquiries > 0 {
        inquiry_recency(record, flavor);
    }
}

fn values_where<F>(record: &FeatureRecord, predicate: F) -> Vec<f64>
where
    F: Fn(&str) -> bool,
{
    let keys = record.keys_matching(predicate);
    record.numbers(&keys)
}

fn is_installment_column(key: &str) -> bool {
    key.contains("Sector")
        && (key.ends_with("cuota") || key.contains("totalCuotas") || key.contains("cuotasCanceladas"))
}

/// `x == 0 → 0`, otherwise `numerator / x`; missing stays missing.
fn zero_guarded(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Relative change with the convention that two zeros mean "no change".
fn relative_change(from: f64, to: f64) -> f64 {
    if from == 0.0 && to == 0.0 {
        0.0
    } else {
        safe_div(to - from, from)
    }
}

fn income_ratios(record: &mut FeatureRecord, flavor: BureauFlavor) {
    let regular = flavor == BureauFlavor::Regular;

    if regular {
        let advance = safe_div(
            record.number("cartera_saldo_actual"),
            record.number("cartera_valorInicial_activa"),
        );
        record.set_number("Avance_global_cartera", advance);
    }

    let installments = values_where(record, |key| key.starts_with("Sector") && key.ends_with("cuota"));
    let mut average = safe_div(sum_present(&installments), count_present(&installments) as f64);
    if regular && average.is_nan() {
        average = 0.0;
    }
    record.set_number("promedio_cuota", average);

    let quota = sum_present(&values_where(record, |k| k.contains("Sector") && k.ends_with("cuota")));
    let total = sum_present(&values_where(record, |k| k.contains("Sector") && k.contains("totalCuotas")));
    let paid = sum_present(&values_where(record, |k| {
        k.contains("Sector") && k.contains("cuotasCanceladas")
    }));
    record.set_number("amortizacion_cartera", safe_div(paid * quota, total * quota));

    let real_sector = |values: Vec<f64>| -> Vec<f64> {
        values
            .into_iter()
            .map(|value| if value == 0.0 || value == -1.0 { f64::NAN } else { value })
            .collect()
    };
    let real_paid = real_sector(values_where(record, |k| {
        k.contains("Sector3") && k.ends_with("cuotasCanceladas")
    }));
    let real_total = real_sector(values_where(record, |k| {
        k.contains("Sector3") && k.contains("totalCuotas")
    }));
    record.set_number(
        "ratio_cartera_real",
        safe_div(sum_present(&real_paid), sum_present(&real_total)),
    );

    let telcos: Vec<f64> = values_where(record, |k| k.contains("Sector4") && k.ends_with("cuota"))
        .into_iter()
        .filter(|value| *value != 0.0)
        .collect();
    let telcos_ratio = safe_div(sum_present(&telcos), count_present(&telcos) as f64).abs();
    record.set_number("ratio_cartera_telcos", telcos_ratio);

    if !regular {
        return;
    }

    let active = record.number("agr_prinp_creditoVigentes");
    let negative_ratio = if active == 0.0 || active.is_nan() {
        0.0
    } else {
        record.number("agr_prinp_creditosActualesNegativos") / active
    };
    record.set_number("ratio_creditos_Neg", negative_ratio);

    let three_months = |prefix: &str| -> f64 {
        (1..=3)
            .map(|month| record.number(&format!("{prefix}_{month}")))
            .sum()
    };
    let overdue = three_months("saldoTotalMora");
    let balance = three_months("saldoTotal");
    record.set_number("ratio_mora_saldo_3m", zero_guarded(overdue, balance));

    let current = zero_guarded(
        record.number("trimestre_1_cuota"),
        record.number("trimestre_1_saldo"),
    );
    let previous = zero_guarded(
        record.number("trimestre_2_cuota"),
        record.number("trimestre_2_saldo"),
    );
    record.set_number(
        "ratio_cuota_saldo_6m",
        zero_guarded(current - previous, previous),
    );

    let usage_keys: Vec<String> = (1..=3)
        .map(|quarter| format!("trimestre_{quarter}_porcentajeUso"))
        .collect();
    let usage_slope = if usage_keys.iter().all(|key| record.contains(key)) {
        let usage = record.numbers(&usage_keys);
        if usage.iter().any(|value| value.is_nan()) {
            f64::NAN
        } else {
            ols_slope(&usage)
        }
    } else {
        0.0
    };
    record.set_number("VarPctUso", usage_slope);

    if record.contains("fecha_max_vencimiento") {
        let periods = match (
            record.datetime("fecha_max_vencimiento"),
            record.datetime("fechaConsulta"),
        ) {
            (Some(due), Some(consulted)) => months_between(due, consulted),
            _ => f64::NAN,
        };
        record.set_number("Periodos_max_vencimiento", periods);
    }

    let first_usage = record.number("trimestre_1_porcentajeUso");
    record.set_number(
        "porcentajeUso_1al2",
        relative_change(first_usage, record.number("trimestre_2_porcentajeUso")),
    );
    record.set_number(
        "porcentajeUso_1al3",
        relative_change(first_usage, record.number("trimestre_3_porcentajeUso")),
    );
}

fn portfolio_quality(record: &mut FeatureRecord, flavor: BureauFlavor, competitor_nits: &[u64]) {
    let totals = values_where(record, |k| k.contains("total_cantidad"));
    let good = values_where(record, |k| {
        (k.contains("Activa_") || k.contains("_Al dia_")) && k.contains("cantidad")
    });

    let holds_savings = record.text("total_tipo_1") == Some("AHO");
    let (savings_total, savings_positive) = if holds_savings {
        (
            record.number("total_cantidad_1"),
            record.get("AHO_Activa_cantidad_1").map_or(0.0, FieldValue::as_f64),
        )
    } else {
        (0.0, 0.0)
    };
    record.set_number("portafolio_total_ahorros", savings_total);
    record.set_number("portafolio_positivas_ahorros", savings_positive);

    let total = sum_present(&totals);
    let current = sum_present(&good);
    let overdue = total - current;
    record.set_number("portafolio_totales_diferentes", count_present(&totals) as f64);
    record.set_number("portafolio_aldia_diferentes", count_present(&good) as f64);
    record.set_number("portafolio_totales", total);
    record.set_number("portafolio_aldia", current);
    record.set_number("portafolio_mora", overdue);

    let non_savings = total - savings_total;
    match flavor {
        BureauFlavor::Regular => {
            let negative = safe_div(overdue, non_savings);
            record.set_number(
                "portafolio_num_can_n",
                if negative.is_nan() { 0.0 } else { negative },
            );
            record.set_number(
                "portafolio_num_can_p",
                safe_div(current - savings_positive, non_savings),
            );
        }
        BureauFlavor::NoCreditLife => {
            record.set_number(
                "portafolio_num_can_n",
                safe_div(overdue - (savings_total - savings_positive), non_savings),
            );
            record.set_number(
                "portafolio_num_can_p",
                safe_div(current + savings_positive, non_savings),
            );
        }
    }

    let nits = values_where(record, |k| k.contains("nitSuscriptor"));
    let competitors = nits
        .iter()
        .filter(|nit| competitor_nits.iter().any(|known| **nit == *known as f64))
        .count();
    record.set_number("Consultas_competencia_72h", competitors as f64);

    let states = values_where(record, |k| k.contains("Cartera") && k.ends_with("codigo"));
    let valid = count_present(&states) as f64;
    let good_states = states.iter().filter(|c| GOOD_STATE_CODES.contains(c)).count() as f64;
    let active_states = states.iter().filter(|c| ACTIVE_STATE_CODES.contains(c)).count() as f64;
    record.set_number("buenas_carteras", good_states);
    record.set_number("activos", active_states);
    record.set_number("carteras_activas_pp", safe_div(active_states, valid));
    record.set_number("carteras_buenas_pp", safe_div(good_states, valid));

    let quarter_overdue: Vec<f64> = (1..=3)
        .map(|quarter| {
            let marker = format!("trim_{quarter}_saldoMora");
            sum_present(&values_where(record, |k| k.contains(&marker)))
        })
        .collect();
    for (index, value) in quarter_overdue.iter().enumerate() {
        record.set_number(format!("Telcos_trim{}", index + 1), *value);
    }
    let drift = ((quarter_overdue[1] - quarter_overdue[0]) + (quarter_overdue[2] - quarter_overdue[1])) / 2.0;
    record.set_number("variacion_mora_telcos", drift);

    record.set_number(
        "productos_saldo_total",
        record.number("tdc_saldo_actual") + record.number("cartera_saldo_actual"),
    );
    record.set_number(
        "productos_mora_total",
        record.number("tdc_saldo_mora") + record.number("cartera_saldo_mora"),
    );

    let consulted = record.datetime("fechaConsulta");
    let latest_opening = [
        "tdc_fechaApertura_reciente",
        "cartera_fechaApertura_reciente",
        "ahorros_fechaApertura_reciente",
    ]
    .iter()
    .filter_map(|key| record.datetime(key))
    .max();
    match latest_opening {
        Some(opened) => record.insert("fechaApertura_max", opened.format("%Y-%m-%d").to_string()),
        None => record.insert("fechaApertura_max", FieldValue::Missing),
    }
    let months_open = match (consulted, latest_opening) {
        (Some(consulted), Some(opened)) => (days_between(consulted, opened) / 30.0).floor(),
        _ => f64::NAN,
    };
    record.set_number("Meses_apertura", months_open);

    let mut sector_means = Vec::with_capacity(3);
    for sector in ["COM", "CTC", "CDC"] {
        let marker = format!("{sector}_trim");
        let values = values_where(record, |k| k.contains(&marker));
        let mean = safe_div(sum_present(&values), count_present(&values) as f64);
        record.set_number(format!("Telcos_mora_trimestre_{sector}"), mean);
        sector_means.push(mean);
    }
    record.set_number(
        "Telcos_mora_trimestre",
        safe_div(sum_present(&sector_means), count_present(&sector_means) as f64),
    );

    record.set_number(
        "saldo_prom_mora_prod",
        safe_div(
            record.number("agr_saldos_saldoTotalEnMora"),
            record.number("agr_prinp_creditoVigentes"),
        ),
    );
    record.set_number(
        "ratio_cuota_saldo",
        safe_div(
            record.number("agr_saldos_cuotaMensual"),
            record.number("agr_saldos_saldoTotal"),
        ),
    );

    if flavor == BureauFlavor::NoCreditLife {
        let since_last_product = days_since(record, consulted, "cartera_fechaApertura_reciente");
        record.set_number("Dias_ultimo_producto", since_last_product);
    }
}

fn days_since(record: &FeatureRecord, consulted: Option<NaiveDateTime>, key: &str) -> f64 {
    match (consulted, record.datetime(key)) {
        (Some(consulted), Some(earlier)) => days_between(consulted, earlier),
        _ => f64::NAN,
    }
}

fn debt_capacity(record: &mut FeatureRecord) {
    let quanto = record.number("quanto");
    let capacity = quanto - quanto * DEBT_CAPACITY_SHARE - record.number("agr_saldos_cuotaMensual");
    record.set_number("capacidad_endeudamiento", capacity);

    let ratio = if quanto > 0.0 { capacity / quanto } else { f64::NAN };
    record.set_number("ratio_endeudamiento", ratio);
}

fn inquiry_recency(record: &mut FeatureRecord, flavor: BureauFlavor) {
    let consulted = record.datetime("fechaConsulta");
    let period = record
        .text("fechaConsulta")
        .and_then(|raw| raw.get(..10))
        .and_then(parse_datetime);

    let date_keys = record.keys_matching(|k| k.starts_with("Consulta_") && k.ends_with("_fecha"));
    let dates: Vec<NaiveDateTime> = date_keys
        .iter()
        .filter_map(|key| record.datetime(key))
        .collect();

    let latest = dates.iter().max().copied();
    match latest {
        Some(latest) => record.insert("max_fecha_consulta", latest.format("%Y-%m-%d").to_string()),
        None => record.insert("max_fecha_consulta", FieldValue::Missing),
    }
    let since_last_inquiry = match (consulted, latest) {
        (Some(consulted), Some(latest)) => days_between(consulted, latest),
        _ => f64::NAN,
    };
    record.set_number("Dias_ultimaconsul", since_last_inquiry);

    if flavor == BureauFlavor::Regular {
        let since_last_product = days_since(record, consulted, "cartera_fechaApertura_reciente");
        record.set_number("Dias_ultimo_producto", since_last_product);
    }

    record.set_number("Consultas_entidad", dates.len() as f64);

    let financial = values_where(record, |k| k.starts_with("Consulta_SFI") && k.ends_with("cantidad"));
    record.set_number("Consultas_SFI", sum_present(&financial));

    let last_month = period
        .and_then(|period| period.checked_sub_months(Months::new(1)))
        .map_or(0, |cutoff| dates.iter().filter(|date| **date > cutoff).count());
    record.set_number("Consultas_ult_mes", last_month as f64);

    debug!(
        inquiries = dates.len(),
        last_month, "bureau inquiry recency computed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entries: &[(&str, FieldValue)]) -> FeatureRecord {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn installment_columns_feed_averages_and_are_dropped() {
        let mut rec = record(&[
            ("Sector1_1_cuota", FieldValue::Number(100.0)),
            ("Sector1_1_totalCuotas", FieldValue::Number(10.0)),
            ("Sector1_1_cuotasCanceladas", FieldValue::Number(5.0)),
            ("Sector3_1_cuota", FieldValue::Number(300.0)),
            ("Sector3_1_totalCuotas", FieldValue::Number(-1.0)),
            ("Sector3_1_cuotasCanceladas", FieldValue::Number(0.0)),
            ("Sector4_1_cuota", FieldValue::Number(0.0)),
            ("Sector4_2_cuota", FieldValue::Number(-40.0)),
        ]);

        apply(&mut rec, BureauFlavor::Regular, &[], 0);

        assert!((rec.number("promedio_cuota") - 90.0).abs() < 1e-9);
        assert!((rec.number("amortizacion_cartera") - (5.0 / 9.0)).abs() < 1e-9);
        assert!(rec.get("ratio_cartera_real").expect("set").is_missing());
        assert_eq!(rec.number("ratio_cartera_telcos"), 40.0);
        assert!(rec.keys_matching(|k| k.starts_with("Sector")).is_empty());
    }

    #[test]
    fn average_installment_fill_depends_on_flavor() {
        let mut regular = FeatureRecord::new();
        let mut ncl = FeatureRecord::new();

        apply(&mut regular, BureauFlavor::Regular, &[], 0);
        apply(&mut ncl, BureauFlavor::NoCreditLife, &[], 0);

        assert_eq!(regular.number("promedio_cuota"), 0.0);
        assert!(ncl.number("promedio_cuota").is_nan());
        assert!(!ncl.contains("ratio_creditos_Neg"));
        assert_eq!(regular.number("ratio_creditos_Neg"), 0.0);
        assert_eq!(regular.number("VarPctUso"), 0.0);
    }

    #[test]
    fn portfolio_ratios_exclude_savings_accounts() {
        let entries = [
            ("total_tipo_1", FieldValue::from("AHO")),
            ("total_cantidad_1", FieldValue::Number(2.0)),
            ("AHO_Activa_cantidad_1", FieldValue::Number(1.0)),
            ("total_tipo_2", FieldValue::from("CAB")),
            ("total_cantidad_2", FieldValue::Number(6.0)),
            ("CAB_Al dia_cantidad_1", FieldValue::Number(4.0)),
        ];
        let mut regular = record(&entries);
        let mut ncl = record(&entries);

        apply(&mut regular, BureauFlavor::Regular, &[], 0);
        apply(&mut ncl, BureauFlavor::NoCreditLife, &[], 0);

        assert_eq!(regular.number("portafolio_totales"), 8.0);
        assert_eq!(regular.number("portafolio_aldia"), 5.0);
        assert_eq!(regular.number("portafolio_mora"), 3.0);
        assert_eq!(regular.number("portafolio_num_can_n"), 0.5);
        assert!((regular.number("portafolio_num_can_p") - 4.0 / 6.0).abs() < 1e-9);
        assert!((ncl.number("portafolio_num_can_n") - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(ncl.number("portafolio_num_can_p"), 1.0);
    }

    #[test]
    fn account_states_are_counted_against_allow_lists() {
        let mut rec = record(&[
            ("Cartera_1_1_codigo", FieldValue::Number(1.0)),
            ("Cartera_1_2_codigo", FieldValue::Number(2.0)),
            ("Cartera_2_1_codigo", FieldValue::Number(3.0)),
            ("Cartera_2_2_codigo", FieldValue::Missing),
        ]);

        apply(&mut rec, BureauFlavor::Regular, &[], 0);

        assert_eq!(rec.number("buenas_carteras"), 2.0);
        assert_eq!(rec.number("activos"), 2.0);
        assert!((rec.number("carteras_buenas_pp") - 2.0 / 3.0).abs() < 1e-9);
        assert!(!rec.contains("Cartera_1_1_codigo"));
    }

    #[test]
    fn debt_capacity_requires_positive_quanto() {
        let mut rec = record(&[
            ("quanto", FieldValue::Number(1_000.0)),
            ("agr_saldos_cuotaMensual", FieldValue::Number(200.0)),
        ]);
        apply(&mut rec, BureauFlavor::Regular, &[], 0);
        assert_eq!(rec.number("capacidad_endeudamiento"), 400.0);
        assert_eq!(rec.number("ratio_endeudamiento"), 0.4);

        let mut empty = FeatureRecord::new();
        apply(&mut empty, BureauFlavor::Regular, &[], 0);
        assert!(empty.number("ratio_endeudamiento").is_nan());
    }

    #[test]
    fn inquiry_recency_counts_recent_and_competitor_inquiries() {
        let mut rec = record(&[
            ("fechaConsulta", FieldValue::from("2024-05-10T09:00:00")),
            ("cartera_fechaApertura_reciente", FieldValue::from("2024-03-01")),
            ("Consulta_SFI_1_cantidad", FieldValue::Number(2.0)),
            ("Consulta_SFI_1_fecha", FieldValue::from("2024-05-01")),
            ("Consulta_SFI_1_nitSuscriptor", FieldValue::Number(901344787.0)),
            ("Consulta_TEL_1_cantidad", FieldValue::Number(1.0)),
            ("Consulta_TEL_1_fecha", FieldValue::from("2024-03-20")),
            ("Consulta_TEL_1_nitSuscriptor", FieldValue::Number(800.0)),
        ]);

        apply(&mut rec, BureauFlavor::Regular, &[901344787], 2);

        assert_eq!(rec.number("Consultas_competencia_72h"), 1.0);
        assert_eq!(rec.number("Dias_ultimaconsul"), 9.0);
        assert_eq!(rec.number("Dias_ultimo_producto"), 70.0);
        assert_eq!(rec.number("Consultas_entidad"), 2.0);
        assert_eq!(rec.number("Consultas_SFI"), 2.0);
        assert_eq!(rec.number("Consultas_ult_mes"), 1.0);
    }
}

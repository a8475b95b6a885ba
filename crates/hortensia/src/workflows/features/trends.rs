//! Time-series summaries over the bureau's quarterly and monthly balance columns.

use super::stats::{
    days_between, first_argmax, first_argmin, max_present, mean_present, min_present, ols_slope,
    safe_div, sample_std,
};
use super::{FeatureRecord, FieldValue};
use super::normalizer::parse_datetime;

const MONTHS: usize = 12;
const ROLLING_WINDOW: usize = 3;

/// `saldos_tri_tendencia`: slope over the three quarterly balances (absent quarters count as 0).
pub fn quarterly_balance_trend(record: &mut FeatureRecord) {
    let keys: Vec<String> = (1..=3).map(|q| format!("trimestre_{q}_saldo")).collect();
    for key in &keys {
        record.insert_if_absent(key, FieldValue::Number(0.0));
    }
    let slope = ols_slope(&record.numbers(&keys));
    record.set_number("saldos_tri_tendencia", slope);
}

/// Twelve-month summaries for each `{column}_1..{column}_12` family.
///
/// Missing months are read as 0 and written back, so every family is complete afterwards.
pub fn monthly_series_features(record: &mut FeatureRecord, columns: &[String]) {
    for column in columns {
        let keys: Vec<String> = (1..=MONTHS).map(|month| format!("{column}_{month}")).collect();
        let values: Vec<f64> = keys
            .iter()
            .map(|key| {
                let value = record.number(key);
                if value.is_nan() {
                    0.0
                } else {
                    value
                }
            })
            .collect();
        for (key, value) in keys.iter().zip(&values) {
            record.set_number(key.as_str(), *value);
        }

        let max = max_present(&values);
        let min = min_present(&values);
        record.set_number(format!("{column}_mean"), mean_present(&values));
        record.set_number(format!("{column}_std"), sample_std(&values));
        record.set_number(format!("{column}_max"), max);
        record.set_number(format!("{column}_min"), min);
        record.set_number(format!("{column}_tendencia"), ols_slope(&values));
        record.set_number(format!("{column}_range"), max - min);
        record.set_number(
            format!("{column}cambio_1al12"),
            values[MONTHS - 1] - values[0],
        );
        record.set_number(
            format!("{column}_mes_saldo_max"),
            first_argmax(&values).map_or(f64::NAN, |index| (index + 1) as f64),
        );
        record.set_number(
            format!("{column}_mes_saldo_min"),
            first_argmin(&values).map_or(f64::NAN, |index| (index + 1) as f64),
        );

        for month in 1..MONTHS {
            let change = safe_div(values[month] - values[month - 1], values[month - 1]);
            record.set_number(format!("var_pct_{}", keys[month]), change);
        }

        for start in (0..MONTHS).step_by(ROLLING_WINDOW) {
            let window = &values[start..(start + ROLLING_WINDOW).min(MONTHS)];
            record.set_number(format!("mean_m_{}", keys[start]), mean_present(window));
        }
    }
}

/// Replace `agr_prinp_antiguedadDesde` with its age in days at consultation time.
pub fn bureau_age_days(record: &mut FeatureRecord) {
    let consulted = record.datetime("fechaConsulta");
    let since = record
        .text("agr_prinp_antiguedadDesde")
        .and_then(parse_datetime);

    let days = match (consulted, since) {
        (Some(consulted), Some(since)) => days_between(consulted, since),
        _ => f64::NAN,
    };
    record.set_number("agr_prinp_antiguedadDesde", days);
}

//! Row-wise numeric helpers with missing-value semantics.
//!
//! NaN is the missing-value sentinel. Sums skip it (an empty sum is 0), means and counts only
//! look at present values, and every division goes through [`safe_div`].

use chrono::{Datelike, NaiveDateTime};

/// `numerator / denominator`, NaN when the denominator is zero or either side is missing.
pub(crate) fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || numerator.is_nan() || denominator.is_nan() {
        return f64::NAN;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        f64::NAN
    }
}

pub(crate) fn sum_present(values: &[f64]) -> f64 {
    values.iter().filter(|value| !value.is_nan()).sum()
}

pub(crate) fn count_present(values: &[f64]) -> usize {
    values.iter().filter(|value| !value.is_nan()).count()
}

pub(crate) fn mean_present(values: &[f64]) -> f64 {
    safe_div(sum_present(values), count_present(values) as f64)
}

/// Sample standard deviation (n - 1) over the present values.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() < 2 {
        return f64::NAN;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    let variance = present
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (present.len() - 1) as f64;
    variance.sqrt()
}

pub(crate) fn max_present(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .fold(f64::NAN, f64::max)
}

pub(crate) fn min_present(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .fold(f64::NAN, f64::min)
}

/// Zero-based position of the first maximum among present values.
pub(crate) fn first_argmax(values: &[f64]) -> Option<usize> {
    let max = max_present(values);
    if max.is_nan() {
        return None;
    }
    values.iter().position(|value| *value == max)
}

pub(crate) fn first_argmin(values: &[f64]) -> Option<usize> {
    let min = min_present(values);
    if min.is_nan() {
        return None;
    }
    values.iter().position(|value| *value == min)
}

/// Ordinary least squares slope of `values` against their positions.
///
/// Missing points are skipped; with fewer than two points the slope is NaN.
pub(crate) fn ols_slope(values: &[f64]) -> f64 {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter(|(_, value)| !value.is_nan())
        .map(|(index, value)| (index as f64, *value))
        .collect();

    if points.len() < 2 {
        return f64::NAN;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let covariance: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let variance: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();

    safe_div(covariance, variance)
}

/// Whole days from `earlier` to `later`, floored like a calendar difference.
pub(crate) fn days_between(later: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    let seconds = later.signed_duration_since(earlier).num_seconds();
    seconds.div_euclid(86_400) as f64
}

/// Calendar month offset of `target` relative to `reference`.
pub(crate) fn months_between(target: NaiveDateTime, reference: NaiveDateTime) -> f64 {
    let years = target.year() - reference.year();
    let months = target.month() as i32 - reference.month() as i32;
    f64::from(years * 12 + months)
}

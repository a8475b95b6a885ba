use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Lower-cased, trimmed label with inner whitespace collapsed.
pub(crate) fn normalize_label(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

/// Lower-cased label with every space removed, used for blacklist comparisons.
pub(crate) fn compact_label(value: &str) -> String {
    value.to_lowercase().replace(' ', "")
}

/// Best-effort numeric parse; blanks and non-finite spellings are rejected.
pub(crate) fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}

/// Bureau amounts only count when they look like an unsigned decimal ("123" or "12.5").
pub(crate) fn is_plain_decimal(value: &str) -> bool {
    let mut seen_dot = false;
    let mut digits = 0usize;
    for ch in value.chars() {
        match ch {
            '0'..='9' => digits += 1,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    digits > 0
}

pub(crate) fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

/// Strict `YYYY-MM-DD` date, as used for credit account opening dates.
pub(crate) fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() != 10 || trimmed.matches('-').count() != 2 {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

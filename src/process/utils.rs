use crate::error::{Error, Result};

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Parse a numeric cell. Blank cells and `sentinel` are missing values.
pub fn parse_optional_f64(column: &str, raw: Option<&str>, sentinel: &str) -> Result<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let cleaned = clean_str(raw);
    if cleaned.is_empty() || cleaned == sentinel {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|source| Error::NumericCast {
            column: column.to_string(),
            value: raw.to_string(),
            source,
        })
}

/// Median of the values; `None` when empty. Reorders `values`.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

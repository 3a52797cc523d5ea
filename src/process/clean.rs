// src/process/clean.rs
use std::sync::Arc;

use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use tracing::{debug, info};

use crate::config::{SchoolColumns, SchoolField};
use crate::error::{Error, Result};
use crate::process::raw_table::RawTable;
use crate::process::utils::{clean_str, parse_optional_f64};

/// Arrow schema of the cleaned school table.
pub fn school_schema() -> Schema {
    Schema::new(vec![
        Field::new(SchoolField::SchoolId.name(), DataType::Utf8, false),
        Field::new(SchoolField::EnrollmentIndex.name(), DataType::Float64, true),
        Field::new(SchoolField::StandardizedScore.name(), DataType::Float64, true),
        Field::new(SchoolField::OutcomeIndex.name(), DataType::Float64, true),
    ])
}

/// Select the four mapped columns of the school sheet, drop rows without a
/// school code, null out the sentinel and reformat the code into the join key.
#[tracing::instrument(level = "info", skip_all, fields(rows = raw.rows.len()))]
pub fn clean_school_table(raw: &RawTable, cols: &SchoolColumns) -> Result<RecordBatch> {
    let mut positions = [0usize; 4];
    for (slot, field) in positions.iter_mut().zip(SchoolField::ALL) {
        let column = cols.column_for(field).ok_or_else(|| {
            Error::Config(format!("no sheet column is mapped to `{}`", field.name()))
        })?;
        *slot = raw.column_index(column).ok_or_else(|| {
            Error::Parse(format!(
                "column {} (for `{}`) not found in the school sheet",
                column,
                field.name()
            ))
        })?;
        debug!(field = field.name(), %column, position = *slot, "mapped column");
    }
    let [key_pos, value_positions @ ..] = positions;

    let mut ids = StringBuilder::new();
    let mut values: Vec<Float64Builder> = (0..3).map(|_| Float64Builder::new()).collect();
    let mut dropped = 0usize;

    for row in 0..raw.rows.len() {
        let key = match raw.cell(row, key_pos).map(clean_str) {
            Some(k) if !k.is_empty() => k,
            _ => {
                dropped += 1;
                continue;
            }
        };
        ids.append_value(strip_key_suffix(key, cols.key_suffix_len)?);

        for ((builder, pos), field) in values
            .iter_mut()
            .zip(value_positions)
            .zip(&SchoolField::ALL[1..])
        {
            let v = parse_optional_f64(field.name(), raw.cell(row, pos), &cols.sentinel)?;
            builder.append_option(v);
        }
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(4);
    columns.push(Arc::new(ids.finish()));
    columns.extend(values.iter_mut().map(|b| Arc::new(b.finish()) as ArrayRef));

    let batch = RecordBatch::try_new(Arc::new(school_schema()), columns)?;
    info!(kept = batch.num_rows(), dropped, "school table cleaned");
    Ok(batch)
}

/// Remove the trailing `suffix_len` characters of a school code. Codes
/// shorter than the suffix are rejected.
pub fn strip_key_suffix(key: &str, suffix_len: usize) -> Result<&str> {
    let n = key.chars().count();
    if n < suffix_len {
        return Err(Error::Parse(format!(
            "school code `{}` is shorter than its {}-character suffix",
            key, suffix_len
        )));
    }
    let cut = key
        .char_indices()
        .nth(n - suffix_len)
        .map(|(i, _)| i)
        .unwrap_or(key.len());
    Ok(&key[..cut])
}

// src/process/impute.rs
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::process::convert::{as_float64, as_utf8};
use crate::process::utils::median;

/// Position of `name` in the merged table.
pub(crate) fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch.schema().index_of(name).map_err(|_| Error::JoinKey {
        table: "merged",
        column: name.to_string(),
    })
}

fn replace_column(
    batch: &RecordBatch,
    idx: usize,
    data_type: DataType,
    array: ArrayRef,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(schema.field(idx).name(), data_type, true);
    let mut columns = batch.columns().to_vec();
    columns[idx] = array;
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}

/// Cast `column` to `Float64` and fill its nulls with the median of the
/// non-null values.
pub fn fill_median(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let idx = column_index(batch, column)?;
    let values = as_float64(column, batch.column(idx))?;

    let mut present: Vec<f64> = values.iter().flatten().collect();
    let fill = median(&mut present).ok_or_else(|| Error::Imputation {
        column: column.to_string(),
        reason: "no non-null values to take a median from".into(),
    })?;

    let filled: Float64Array = values.iter().map(|v| Some(v.unwrap_or(fill))).collect();
    info!(column, fill, imputed = values.null_count(), "median fill");
    replace_column(batch, idx, DataType::Float64, Arc::new(filled))
}

/// Order category labels numerically when both are numbers, as codes like
/// `9` and `10` are, and as text otherwise.
fn label_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// Most frequent value; ties go to the smallest value.
pub fn mode<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values.into_iter().flatten() {
        *counts.entry(v).or_default() += 1;
    }
    let top = counts.values().copied().max()?;
    counts
        .into_iter()
        .filter(|&(_, n)| n == top)
        .map(|(v, _)| v)
        .min_by(|a, b| label_order(a, b))
}

/// Fill nulls of a categorical column with its mode.
pub fn fill_mode(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let idx = column_index(batch, column)?;
    let values = as_utf8(column, batch.column(idx))?;

    let fill = mode(values.iter())
        .ok_or_else(|| Error::Imputation {
            column: column.to_string(),
            reason: "no non-null values to take a mode from".into(),
        })?
        .to_string();

    let filled: StringArray = values
        .iter()
        .map(|v| Some(v.unwrap_or(fill.as_str())))
        .collect();
    info!(column, fill = %fill, imputed = values.null_count(), "mode fill");
    replace_column(batch, idx, DataType::Utf8, Arc::new(filled))
}

/// Fill nulls of `column` with the median of the same `group_by` value.
/// Rows with a null group form their own group.
pub fn fill_grouped_median(
    batch: &RecordBatch,
    column: &str,
    group_by: &str,
) -> Result<RecordBatch> {
    let idx = column_index(batch, column)?;
    let values = as_float64(column, batch.column(idx))?;
    let groups = as_utf8(group_by, batch.column(column_index(batch, group_by)?))?;

    let mut by_group: HashMap<Option<&str>, Vec<f64>> = HashMap::new();
    for (g, v) in groups.iter().zip(values.iter()) {
        let entry = by_group.entry(g).or_default();
        if let Some(v) = v {
            entry.push(v);
        }
    }
    let medians: HashMap<Option<&str>, Option<f64>> = by_group
        .into_iter()
        .map(|(g, mut vs)| (g, median(&mut vs)))
        .collect();
    debug!(column, group_by, groups = medians.len(), "group medians computed");

    let mut filled = Vec::with_capacity(values.len());
    for (g, v) in groups.iter().zip(values.iter()) {
        match v {
            Some(v) => filled.push(Some(v)),
            None => {
                let m = medians.get(&g).copied().flatten().ok_or_else(|| Error::Imputation {
                    column: column.to_string(),
                    reason: format!(
                        "group {}={} has no non-null values",
                        group_by,
                        g.unwrap_or("<null>")
                    ),
                })?;
                filled.push(Some(m));
            }
        }
    }

    info!(column, group_by, imputed = values.null_count(), "grouped median fill");
    replace_column(
        batch,
        idx,
        DataType::Float64,
        Arc::new(Float64Array::from(filled)),
    )
}

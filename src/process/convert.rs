use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, Float64Array, Float64Builder, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};

use crate::error::{Error, Result};
use crate::process::utils::clean_str;

/// Read any column as `Float64`. Text cells are parsed; unparsable text fails.
pub fn as_float64(column: &str, arr: &ArrayRef) -> Result<Float64Array> {
    match arr.data_type() {
        DataType::Float64 => Ok(arr
            .as_any()
            .downcast_ref::<Float64Array>()
            .cloned()
            .ok_or_else(|| Error::Parse(format!("column `{}` is not Float64", column)))?),
        DataType::Utf8 => {
            let sarr = arr
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Parse(format!("column `{}` is not Utf8", column)))?;
            let mut b = Float64Builder::with_capacity(sarr.len());
            for opt in sarr.iter() {
                match opt.map(clean_str) {
                    None => b.append_null(),
                    Some(s) if s.is_empty() || s.eq_ignore_ascii_case("nan") => b.append_null(),
                    Some(s) => {
                        let v = s.parse::<f64>().map_err(|source| Error::NumericCast {
                            column: column.to_string(),
                            value: s.to_string(),
                            source,
                        })?;
                        b.append_value(v);
                    }
                }
            }
            Ok(b.finish())
        }
        _ => {
            let out = cast(arr, &DataType::Float64)?;
            Ok(out
                .as_any()
                .downcast_ref::<Float64Array>()
                .cloned()
                .ok_or_else(|| Error::Parse(format!("column `{}` is not numeric", column)))?)
        }
    }
}

/// Read any column as text.
pub fn as_utf8(column: &str, arr: &ArrayRef) -> Result<StringArray> {
    let out = match arr.data_type() {
        DataType::Utf8 => arr.clone(),
        _ => cast(arr, &DataType::Utf8)?,
    };
    out.as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| Error::Parse(format!("column `{}` cannot be read as text", column)))
}

/// Final typing of the merged table: `numeric` columns become `Float64`,
/// every other column becomes `Utf8`.
pub fn coerce_numeric(batch: &RecordBatch, numeric: &[&str]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut out: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (fld, arr) in schema.fields().iter().zip(batch.columns()) {
        let name = fld.name();
        if numeric.contains(&name.as_str()) {
            out.push(Arc::new(as_float64(name, arr)?));
            fields.push(Field::new(name, DataType::Float64, true));
        } else {
            out.push(Arc::new(as_utf8(name, arr)?));
            fields.push(Field::new(name, DataType::Utf8, true));
        }
    }

    for name in numeric {
        if schema.index_of(name).is_err() {
            return Err(Error::JoinKey {
                table: "merged",
                column: name.to_string(),
            });
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), out).map_err(Into::into)
}

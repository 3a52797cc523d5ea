// src/process/merge.rs
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, UInt32Array},
    compute::{take, take_record_batch},
    datatypes::Schema,
    record_batch::RecordBatch,
};
use tracing::{info, warn};

use crate::config::{MergeConfig, SchoolField, StudentColumns};
use crate::error::{Error, Result};
use crate::process::convert::{as_utf8, coerce_numeric};
use crate::process::impute::{fill_grouped_median, fill_median, fill_mode};

/// Join the student table with the cleaned school table, drop the
/// high-missingness columns, impute what is left and type the result.
#[tracing::instrument(
    level = "info",
    skip_all,
    fields(students = students.num_rows(), schools = schools.num_rows())
)]
pub fn merge_and_impute(
    students: &RecordBatch,
    schools: &RecordBatch,
    cols: &StudentColumns,
    cfg: &MergeConfig,
) -> Result<RecordBatch> {
    for name in cols.required() {
        require(students, "student", name)?;
    }

    let joined = left_join(students, &cols.school_id, schools, SchoolField::SchoolId.name())?;
    let mut merged = drop_columns(&joined, &cfg.drop_after_join)?;

    if let Some(threshold) = cfg.missing_threshold {
        let enrollment = SchoolField::EnrollmentIndex.name();
        let mut protected: Vec<&str> = cols.required().to_vec();
        protected.push(enrollment);
        merged = drop_sparse_columns(&merged, threshold, &protected)?;
    }

    let merged = fill_median(&merged, &cols.age)?;
    let merged = fill_mode(&merged, &cols.marital_status)?;
    let merged = fill_mode(&merged, &cols.school_type)?;
    let merged = fill_grouped_median(
        &merged,
        SchoolField::EnrollmentIndex.name(),
        &cols.state_of_residence,
    )?;

    let numeric = [
        cols.age.as_str(),
        cols.total_score.as_str(),
        SchoolField::EnrollmentIndex.name(),
        cols.survey_response.as_str(),
    ];
    let out = coerce_numeric(&merged, &numeric)?;
    info!(rows = out.num_rows(), columns = out.num_columns(), "merged dataset ready");
    Ok(out)
}

fn require(batch: &RecordBatch, table: &'static str, column: &str) -> Result<usize> {
    batch.schema().index_of(column).map_err(|_| Error::JoinKey {
        table,
        column: column.to_string(),
    })
}

/// Stable ascending sort on a text key, nulls last. Rows with equal keys keep
/// their input order.
fn sort_by_key(batch: &RecordBatch, key_idx: usize, name: &str) -> Result<RecordBatch> {
    let keys = as_utf8(name, batch.column(key_idx))?;
    let mut order: Vec<u32> = (0..keys.len() as u32).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        match (keys.is_valid(a), keys.is_valid(b)) {
            (true, true) => keys.value(a).cmp(keys.value(b)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        }
    });
    take_record_batch(batch, &UInt32Array::from(order)).map_err(Into::into)
}

/// Left join on `left_key = right_key`. Every left row is kept, repeated once
/// per matching right row; unmatched rows get nulls on the right side. Both
/// key columns are removed from the output.
pub fn left_join(
    left: &RecordBatch,
    left_key: &str,
    right: &RecordBatch,
    right_key: &str,
) -> Result<RecordBatch> {
    let lk = require(left, "student", left_key)?;
    let rk = require(right, "school", right_key)?;

    let left = sort_by_key(left, lk, left_key)?;
    let right = sort_by_key(right, rk, right_key)?;
    let left_keys = as_utf8(left_key, left.column(lk))?;
    let right_keys = as_utf8(right_key, right.column(rk))?;

    let mut index: HashMap<&str, Vec<u32>> = HashMap::new();
    for (j, key) in right_keys.iter().enumerate() {
        if let Some(key) = key {
            index.entry(key).or_default().push(j as u32);
        }
    }

    let mut left_rows: Vec<u32> = Vec::with_capacity(left.num_rows());
    let mut right_rows: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
    let mut unmatched = 0usize;
    for (i, key) in left_keys.iter().enumerate() {
        match key.and_then(|k| index.get(k)) {
            Some(matches) => {
                for &j in matches {
                    left_rows.push(i as u32);
                    right_rows.push(Some(j));
                }
            }
            None => {
                unmatched += 1;
                left_rows.push(i as u32);
                right_rows.push(None);
            }
        }
    }
    let left_rows = UInt32Array::from(left_rows);
    let right_rows = UInt32Array::from(right_rows);

    let left_schema = left.schema();
    let right_schema = right.schema();
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    for (i, fld) in left_schema.fields().iter().enumerate() {
        if i == lk {
            continue;
        }
        columns.push(take(left.column(i).as_ref(), &left_rows, None)?);
        fields.push(fld.as_ref().clone());
    }
    for (j, fld) in right_schema.fields().iter().enumerate() {
        if j == rk {
            continue;
        }
        if left_schema.index_of(fld.name()).is_ok() {
            return Err(Error::Parse(format!(
                "column `{}` exists in both the student and the school table",
                fld.name()
            )));
        }
        columns.push(take(right.column(j).as_ref(), &right_rows, None)?);
        fields.push(fld.as_ref().clone().with_nullable(true));
    }

    info!(
        rows = left_rows.len(),
        unmatched, "left join on {} = {}", left_key, right_key
    );
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}

/// Remove the named columns; each must exist.
pub fn drop_columns(batch: &RecordBatch, names: &[String]) -> Result<RecordBatch> {
    let mut keep: Vec<usize> = (0..batch.num_columns()).collect();
    for name in names {
        let idx = require(batch, "merged", name)?;
        keep.retain(|&i| i != idx);
    }
    batch.project(&keep).map_err(Into::into)
}

/// Remove columns (other than `protected`) whose null fraction is above
/// `threshold`.
pub fn drop_sparse_columns(
    batch: &RecordBatch,
    threshold: f64,
    protected: &[&str],
) -> Result<RecordBatch> {
    if batch.num_rows() == 0 {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let mut keep = Vec::with_capacity(batch.num_columns());
    for (i, fld) in schema.fields().iter().enumerate() {
        let missing = batch.column(i).null_count() as f64 / batch.num_rows() as f64;
        if missing > threshold && !protected.contains(&fld.name().as_str()) {
            warn!(column = %fld.name(), missing, threshold, "dropping sparse column");
            continue;
        }
        keep.push(i);
    }
    batch.project(&keep).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::students::read_students;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field};

    fn schools() -> RecordBatch {
        let schema = crate::process::clean::school_schema();
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["300", "100", "200"])),
                Arc::new(Float64Array::from(vec![Some(0.5), Some(0.9), None])),
                Arc::new(Float64Array::from(vec![Some(5.0), Some(4.0), None])),
                Arc::new(Float64Array::from(vec![Some(4.5), None, None])),
            ],
        )
        .unwrap()
    }

    fn students() -> RecordBatch {
        let csv = "\
CO_ESCOLA,NU_IDADE,TP_ESTADO_CIVIL,TP_ENSINO,SG_UF_RESIDENCIA,NU_NOTA_TOT,Q005,TP_COR_RACA
200,18,0,1,SP,500.0,3,1
100,,1,,SP,610.5,4,2
999,17,,1,RJ,480.0,2,1
300,30,1,2,RJ,550.0,5,3
200,19,0,1,RJ,520.0,3,
";
        read_students(csv.as_bytes(), ',').unwrap()
    }

    fn f64_col<'a>(b: &'a RecordBatch, name: &str) -> &'a Float64Array {
        b.column(b.schema().index_of(name).unwrap())
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    fn str_col<'a>(b: &'a RecordBatch, name: &str) -> &'a StringArray {
        b.column(b.schema().index_of(name).unwrap())
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn left_join_keeps_every_student_in_key_order() -> anyhow::Result<()> {
        let out = left_join(&students(), "CO_ESCOLA", &schools(), "school_id")?;
        assert_eq!(out.num_rows(), 5);
        assert!(out.schema().index_of("CO_ESCOLA").is_err());
        assert!(out.schema().index_of("school_id").is_err());

        // sorted keys: 100, 200, 200, 300, 999
        let idx = f64_col(&out, "enrollment_index");
        assert_eq!(idx.value(0), 0.9);
        assert!(idx.is_null(1));
        assert_eq!(idx.value(3), 0.5);
        assert!(idx.is_null(4), "unmatched key");
        let ages = str_col(&out, "NU_IDADE");
        assert_eq!(ages.value(4), "17");
        Ok(())
    }

    #[test]
    fn equal_keys_keep_their_input_order() -> anyhow::Result<()> {
        let schema = Schema::new(vec![
            Field::new("CO_ESCOLA", DataType::Utf8, true),
            Field::new("NU_IDADE", DataType::Utf8, true),
        ]);
        let mut keys = Vec::new();
        let mut ages = Vec::new();
        for i in 0..200 {
            keys.push(match i % 4 {
                0 => Some("200"),
                1 => None,
                2 => Some("100"),
                _ => Some("200"),
            });
            ages.push(Some(i.to_string()));
        }
        let b = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(keys)),
                Arc::new(StringArray::from(ages)),
            ],
        )?;

        let out = sort_by_key(&b, 0, "CO_ESCOLA")?;
        let sorted_keys = str_col(&out, "CO_ESCOLA");
        let sorted_ages = str_col(&out, "NU_IDADE");
        let mut last: Vec<(Option<&str>, usize)> = Vec::new();
        for row in 0..out.num_rows() {
            let key = sorted_keys.is_valid(row).then(|| sorted_keys.value(row));
            let age: usize = sorted_ages.value(row).parse()?;
            if let Some((prev_key, prev_age)) = last.last() {
                if *prev_key == key {
                    assert!(*prev_age < age, "rows of key {:?} reordered", key);
                }
            }
            last.push((key, age));
        }
        assert_eq!(sorted_keys.value(0), "100");
        assert_eq!(sorted_keys.value(50), "200");
        assert_eq!(sorted_keys.null_count(), 50);
        assert!(sorted_keys.is_null(199));
        Ok(())
    }

    #[test]
    fn merged_table_has_no_gaps_in_imputed_columns() -> anyhow::Result<()> {
        let cols = StudentColumns::default();
        let out = merge_and_impute(&students(), &schools(), &cols, &MergeConfig::default())?;

        assert_eq!(out.num_rows(), 5);
        for dropped in ["standardized_score", "outcome_index", "CO_ESCOLA", "school_id"] {
            assert!(out.schema().index_of(dropped).is_err(), "{} kept", dropped);
        }
        for name in ["NU_IDADE", "NU_NOTA_TOT", "enrollment_index", "Q005"] {
            let f = out.schema().field_with_name(name)?.clone();
            assert_eq!(f.data_type(), &DataType::Float64, "{}", name);
        }
        for name in ["NU_IDADE", "TP_ESTADO_CIVIL", "TP_ENSINO", "enrollment_index"] {
            assert_eq!(out.column(out.schema().index_of(name)?).null_count(), 0, "{}", name);
        }

        // ages 18,19,17,30 -> median 18.5 for the student of school 100
        assert_eq!(f64_col(&out, "NU_IDADE").value(0), 18.5);
        // marital status 0,1,1,0 -> tie resolves to "0"
        assert_eq!(str_col(&out, "TP_ESTADO_CIVIL").value(4), "0");
        // school 200 has no index: SP group median (0.9) and RJ group median (0.5)
        let idx = f64_col(&out, "enrollment_index");
        assert_eq!(idx.value(1), 0.9);
        assert_eq!(idx.value(2), 0.5);
        // uncategorised extra column stays text with its null
        assert_eq!(str_col(&out, "TP_COR_RACA").null_count(), 1);
        Ok(())
    }

    #[test]
    fn missing_required_column_is_a_join_key_error() {
        let cols = StudentColumns {
            survey_response: "Q006".into(),
            ..StudentColumns::default()
        };
        let err = merge_and_impute(&students(), &schools(), &cols, &MergeConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::JoinKey { table: "student", ref column } if column == "Q006"));
    }

    #[test]
    fn sparse_columns_dropped_when_threshold_set() -> anyhow::Result<()> {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("b", DataType::Utf8, true),
        ]);
        let b = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec![None, None, Some("x")])),
                Arc::new(StringArray::from(vec![None, None, Some("y")])),
            ],
        )?;
        let out = drop_sparse_columns(&b, 0.5, &["b"])?;
        assert_eq!(out.num_columns(), 1);
        assert_eq!(out.schema().field(0).name(), "b");
        Ok(())
    }
}

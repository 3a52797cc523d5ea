// src/process/mod.rs
//! Table preparation: the school sheet cleaner, the student loader and the
//! join/imputation step that produces the analysis dataset.

pub mod clean;
pub mod convert;
pub mod impute;
pub mod merge;
pub mod raw_table;
pub mod students;
pub mod utils;

pub use clean::{clean_school_table, school_schema};
pub use merge::merge_and_impute;
pub use raw_table::RawTable;
pub use students::{load_students_csv, read_students};

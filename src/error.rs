// src/error.rs

use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the pipeline stages can raise. Wrapping variants keep the
/// original error as their `source`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("download of {url} failed")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("archive entry `{entry}` could not be read")]
    Archive {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("spreadsheet `{entry}` could not be parsed")]
    Sheet {
        entry: String,
        #[source]
        source: calamine::XlsxError,
    },

    #[error("malformed input: {0}")]
    Parse(String),

    #[error("required column `{column}` is missing from the {table} table")]
    JoinKey { table: &'static str, column: String },

    #[error("cannot impute `{column}`: {reason}")]
    Imputation { column: String, reason: String },

    #[error("value `{value}` in column `{column}` is not a number")]
    NumericCast {
        column: String,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("column `{column}` has {groups} group(s); a rank test needs at least 2")]
    UnsupportedGroupCount { column: String, groups: usize },

    #[error("{method} cannot run on `{column}`")]
    Sample {
        column: String,
        method: &'static str,
        #[source]
        source: crate::analysis::SampleError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// The pipeline step that was running when a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Clean,
    Merge,
    Normality,
    GroupComparison,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "downloading the IDEB spreadsheet",
            Stage::Clean => "preparing the IDEB table",
            Stage::Merge => "building the merged dataset",
            Stage::Normality => "running the normality tests",
            Stage::GroupComparison => "running the group comparison tests",
            Stage::Output => "writing pipeline outputs",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure: which step broke and why.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl PipelineError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

/// Attach a [`Stage`] to a library result.
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}

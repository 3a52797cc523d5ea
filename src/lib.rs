// src/lib.rs
//! Joins INEP's IDEB school indicators with ENEM student records, imputes the
//! gaps and runs normality and rank tests over the result.

pub mod analysis;
pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod process;

pub use analysis::AnalysisReport;
pub use config::PipelineConfig;
pub use error::{Error, PipelineError, Result, Stage};
pub use pipeline::{Pipeline, PipelineOutput};

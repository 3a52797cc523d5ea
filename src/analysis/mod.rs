// src/analysis/mod.rs
//! Hypothesis tests over the merged dataset: a normality sweep over numeric
//! columns and rank tests comparing a target across categorical groups.

pub mod nonparam;
pub mod normality;
pub mod rank;
pub mod report;

use serde::Serialize;
use thiserror::Error;

pub use nonparam::{compare_all_groups, compare_groups, GroupComparison, GroupVerdict, RankTest};
pub use normality::{normality_sweep, NormalityMethod, NormalityRow, NormalityVerdict, TestVerdict};
pub use report::AnalysisReport;

/// Statistic and p-value of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

/// Why a sample cannot be tested.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("needs at least {min} observations, got {n}")]
    TooSmall { min: usize, n: usize },
    #[error("all observations are identical")]
    Constant,
}

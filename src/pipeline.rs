// src/pipeline.rs
//! Stage-by-stage driver: fetch → clean → merge/impute → analyze → outputs.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use reqwest::Client;
use tracing::info;

use crate::analysis::{compare_all_groups, normality_sweep, AnalysisReport};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage, StageContext};
use crate::fetch::fetch_school_sheet;
use crate::output::{write_parquet, write_report};
use crate::process::{clean_school_table, load_students_csv, merge_and_impute, RawTable};

/// Tables and verdicts of one complete run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Cleaned school table (join key plus three indicators).
    pub schools: RecordBatch,
    /// Student table joined with the schools and imputed.
    pub merged: RecordBatch,
    pub report: AnalysisReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Download the school sheet, then run every synchronous stage.
    pub async fn run(
        &self,
        client: &Client,
        students: &RecordBatch,
    ) -> Result<PipelineOutput, PipelineError> {
        let raw = fetch_school_sheet(client, &self.config.fetch)
            .await
            .stage(Stage::Fetch)?;
        self.prepare(&raw, students)
    }

    /// Load the student CSV named by `path` using the configured delimiter.
    pub fn load_students(&self, path: &Path) -> Result<RecordBatch, PipelineError> {
        load_students_csv(path, self.config.students.delimiter).stage(Stage::Merge)
    }

    /// Clean an already fetched sheet, merge it with `students` and analyze
    /// the result.
    pub fn prepare(
        &self,
        raw: &RawTable,
        students: &RecordBatch,
    ) -> Result<PipelineOutput, PipelineError> {
        let schools = clean_school_table(raw, &self.config.school).stage(Stage::Clean)?;
        let merged = merge_and_impute(
            students,
            &schools,
            &self.config.students,
            &self.config.merge,
        )
        .stage(Stage::Merge)?;
        let report = self.analyze(&merged)?;
        Ok(PipelineOutput {
            schools,
            merged,
            report,
        })
    }

    pub fn analyze(&self, merged: &RecordBatch) -> Result<AnalysisReport, PipelineError> {
        let cfg = &self.config.analysis;
        let normality = normality_sweep(merged, cfg.alpha).stage(Stage::Normality)?;
        let comparisons = compare_all_groups(merged, &cfg.target, &cfg.group_columns, cfg.alpha)
            .stage(Stage::GroupComparison)?;
        Ok(AnalysisReport {
            alpha: cfg.alpha,
            normality,
            comparisons,
        })
    }

    /// Write whichever outputs are configured.
    pub fn write_outputs(&self, out: &PipelineOutput) -> Result<(), PipelineError> {
        let cfg = &self.config.output;
        if let Some(path) = &cfg.merged_parquet {
            write_parquet(&out.merged, path).stage(Stage::Output)?;
        }
        if let Some(path) = &cfg.report_json {
            write_report(&out.report, path).stage(Stage::Output)?;
        }
        if cfg.merged_parquet.is_none() && cfg.report_json.is_none() {
            info!("no output paths configured; nothing written");
        }
        Ok(())
    }
}

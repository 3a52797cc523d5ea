// src/output.rs
use std::{fs, fs::File, path::Path};

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::analysis::AnalysisReport;
use crate::error::Result;

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Write the merged dataset as a single Snappy-compressed Parquet file.
#[tracing::instrument(level = "info", skip(batch), fields(rows = batch.num_rows()))]
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    create_parent(path)?;
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    info!(path = %path.display(), "merged dataset written");
    Ok(())
}

/// Write the analysis report as pretty-printed JSON.
pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    create_parent(path)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    info!(path = %path.display(), "report written");
    Ok(())
}

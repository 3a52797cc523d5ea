use anyhow::{Context, Result};
use ideb_enem::{Pipeline, PipelineConfig};
use reqwest::Client;
use std::{env, path::PathBuf};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const CONFIG_ENV: &str = "IDEB_ENEM_CONFIG";

fn usage() -> String {
    format!(
        "usage: ideb_enem <students.csv> [config.yaml]\n  (config may also be given via {})",
        CONFIG_ENV
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) arguments & config ───────────────────────────────────────
    let mut args = env::args_os().skip(1);
    let students_path = PathBuf::from(args.next().with_context(usage)?);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    let config = match &config_path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    info!(
        students = %students_path.display(),
        config = ?config_path,
        "startup"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let start = Instant::now();
    let students = pipeline
        .load_students(&students_path)
        .with_context(|| format!("reading {}", students_path.display()))?;
    let client = Client::new();
    let out = pipeline.run(&client, &students).await?;
    pipeline.write_outputs(&out)?;

    info!(
        schools = out.schools.num_rows(),
        merged = out.merged.num_rows(),
        elapsed = ?start.elapsed(),
        "pipeline finished"
    );
    println!("{}", out.report);
    Ok(())
}

//! Result export: day results to CSV, JSON or Parquet, and per-day
//! telemetry to Parquet.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use fleet_core::telemetry_export::{write_metrics_parquet, write_segments_parquet};

use crate::metrics::DayResult;
use crate::runner::DayRun;

#[path = "export/columnar.rs"]
mod columnar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Csv,
    Json,
    Parquet,
}

impl ResultFormat {
    pub const ALL: [ResultFormat; 3] = [ResultFormat::Csv, ResultFormat::Json, ResultFormat::Parquet];

    /// Format named by the file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "csv" => Some(ResultFormat::Csv),
            "json" => Some(ResultFormat::Json),
            "parquet" => Some(ResultFormat::Parquet),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ResultFormat::Csv => "csv",
            ResultFormat::Json => "json",
            ResultFormat::Parquet => "parquet",
        }
    }
}

/// Writes one record per day. Missing parent directories are created; an
/// empty result set is an error.
pub fn export_results(
    results: &[DayResult],
    path: impl AsRef<Path>,
    format: ResultFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if results.is_empty() {
        return Err("no day results to export".into());
    }
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let out = BufWriter::new(File::create(path)?);
    match format {
        ResultFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for result in results {
                writer.serialize(result)?;
            }
            writer.flush()?;
        }
        ResultFormat::Json => serde_json::to_writer_pretty(out, results)?,
        ResultFormat::Parquet => columnar::write_results(results, out)?,
    }
    log::info!("wrote {} day results to {}", results.len(), path.display());
    Ok(())
}

/// Writes `{plan}_metrics.parquet` (when frames were kept) and
/// `{plan}_segments.parquet` into `dir`.
pub fn export_day_telemetry(
    run: &DayRun,
    dir: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    if !run.frames.is_empty() {
        write_metrics_parquet(
            dir.join(format!("{}_metrics.parquet", run.result.plan)),
            &run.frames,
        )?;
    }
    write_segments_parquet(
        dir.join(format!("{}_segments.parquet", run.result.plan)),
        &run.segments,
    )
}

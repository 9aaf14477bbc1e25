//! # towebp
//!
//! Batch conversion of PNG, JPEG and related raster formats to WebP.
//!
//! The [`BatchConverter`] discovers files, converts them on a bounded worker pool,
//! deletes originals only after a confirmed write, and folds every per-file
//! [`ConversionOutcome`] into a [`BatchSummary`]. Encoding itself is delegated to
//! the `image` and `webp` crates behind the [`Codec`] trait.

pub mod config;
pub mod converter;
pub mod core;
pub mod error;
pub mod paths;
pub mod profiles;
pub mod progress;
pub mod space;
pub mod stats;
pub mod task;
pub mod utils;

// Re-export commonly used types
pub use config::{BatchOptions, ConversionSettings, SUPPORTED_EXTENSIONS};
pub use converter::{Codec, CodecError, WebpCodec};
pub use crate::core::{BatchConverter, BatchResult, StopHandle};
pub use error::{ConfigError, ConversionError, ConversionWarning};
pub use paths::PathResolver;
pub use profiles::{Profile, ProfileStore};
pub use progress::{NoOpProgressReporter, ProgressReporter};
pub use space::SpaceChecker;
pub use stats::{BatchSummary, Completion};
pub use task::{ConversionOutcome, ConversionRequest, ConversionTask, OutcomeStatus};
pub use utils::format_duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main conversion report structure
#[derive(Debug, Serialize, Clone)]
pub struct ConversionReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub total_files: u64,
    pub succeeded_files: u64,
    pub failed_files: u64,
    pub skipped_files: u64,
    pub stopped: bool,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub files_per_second: f64,
    pub thread_count: usize,
    pub quality: u8,
    pub lossless: bool,
    pub files: Vec<FileRecord>,
}

/// One row of a conversion report
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FileRecord {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: &'static str,
    pub error_kind: Option<&'static str>,
    pub message: Option<String>,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl From<&ConversionOutcome> for FileRecord {
    fn from(outcome: &ConversionOutcome) -> Self {
        let (status, error_kind, message) = match &outcome.status {
            OutcomeStatus::Converted => ("converted", None, None),
            OutcomeStatus::Failed(err) => ("failed", Some(err.kind()), Some(err.to_string())),
            OutcomeStatus::Skipped => ("skipped", None, None),
        };
        let message = message.or_else(|| {
            (!outcome.warnings.is_empty()).then(|| {
                outcome
                    .warnings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        });

        Self {
            input: outcome.input.clone(),
            output: outcome.output.clone(),
            status,
            error_kind,
            message,
            bytes_before: outcome.bytes_before,
            bytes_after: outcome.bytes_after,
        }
    }
}

impl ConversionReport {
    pub fn new(result: &BatchResult, settings: &ConversionSettings) -> Self {
        let summary = &result.summary;
        let seconds = result.duration.as_secs_f64();
        let finished = summary.succeeded + summary.failed;

        Self {
            start_time: result.start_time,
            end_time: result.end_time,
            duration: result.duration,
            total_files: summary.total,
            succeeded_files: summary.succeeded,
            failed_files: summary.failed,
            skipped_files: summary.skipped,
            stopped: summary.stopped,
            original_size: summary.bytes_before,
            compressed_size: summary.bytes_after,
            compression_ratio: summary.compression_ratio(),
            files_per_second: if seconds > 0.0 { finished as f64 / seconds } else { 0.0 },
            thread_count: result.thread_count,
            quality: settings.quality,
            lossless: settings.lossless,
            files: result.outcomes.iter().map(FileRecord::from).collect(),
        }
    }
}

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReportFormat {
    Json,
    Csv,
}

/// Write a conversion report to `path` in the specified format
pub fn generate_report(report: &ConversionReport, format: ReportFormat, path: &Path) -> Result<()> {
    let written = match format {
        ReportFormat::Json => generate_json_report(report, path),
        ReportFormat::Csv => generate_csv_report(report, path),
    };
    written.with_context(|| format!("Failed to write report: {}", path.display()))?;
    log::info!("Report saved to: {}", path.display());
    Ok(())
}

fn generate_json_report(report: &ConversionReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// One row per file; the batch totals are derivable from the rows
fn generate_csv_report(report: &ConversionReport, path: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct Row<'a> {
        input: String,
        output: String,
        status: &'a str,
        error_kind: &'a str,
        message: &'a str,
        bytes_before: u64,
        bytes_after: u64,
    }

    let mut writer = csv::Writer::from_path(path)?;
    for file in &report.files {
        writer.serialize(Row {
            input: file.input.display().to_string(),
            output: file
                .output
                .as_ref()
                .map(|output| output.display().to_string())
                .unwrap_or_default(),
            status: file.status,
            error_kind: file.error_kind.unwrap_or_default(),
            message: file.message.as_deref().unwrap_or_default(),
            bytes_before: file.bytes_before,
            bytes_after: file.bytes_after,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> BatchResult {
        let outcomes = vec![
            ConversionOutcome {
                input: PathBuf::from("in/a.png"),
                output: Some(PathBuf::from("in/a.webp")),
                status: OutcomeStatus::Converted,
                bytes_before: 2000,
                bytes_after: 500,
                warnings: vec![ConversionWarning::TimestampCopy {
                    path: PathBuf::from("in/a.webp"),
                    message: "read-only".to_string(),
                }],
            },
            ConversionOutcome::failed(
                PathBuf::from("in/c.png"),
                ConversionError::CorruptImage("bad, very bad".to_string()),
            ),
        ];
        let now = Utc::now();
        BatchResult {
            summary: BatchSummary {
                total: 2,
                succeeded: 1,
                failed: 1,
                skipped: 0,
                bytes_before: 2000,
                bytes_after: 500,
                stopped: false,
            },
            outcomes,
            start_time: now,
            end_time: now,
            duration: Duration::from_secs(2),
            thread_count: 4,
        }
    }

    #[test]
    fn test_report_collects_file_records() {
        let report = ConversionReport::new(&sample_result(), &ConversionSettings::default());
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.compression_ratio, 0.25);
        assert_eq!(report.files_per_second, 1.0);
        assert_eq!(report.files[0].status, "converted");
        assert!(report.files[0].message.as_deref().unwrap().contains("read-only"));
        assert_eq!(report.files[1].error_kind, Some("corrupt_image"));
    }

    #[test]
    fn test_json_and_csv_reports_are_written() {
        let temp_dir = tempfile::tempdir().unwrap();
        let report = ConversionReport::new(&sample_result(), &ConversionSettings::default());

        let json_path = temp_dir.path().join("report.json");
        generate_report(&report, ReportFormat::Json, &json_path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["failed_files"], 1);
        assert_eq!(json["files"][1]["status"], "failed");

        let csv_path = temp_dir.path().join("report.csv");
        generate_report(&report, ReportFormat::Csv, &csv_path).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][2], "failed");
        assert!(rows[1][4].contains("bad, very bad"));
    }
}

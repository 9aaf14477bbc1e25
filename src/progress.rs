use std::path::Path;

use crate::error::{ConversionError, ConversionWarning};
use crate::stats::BatchSummary;

/// Trait for reporting conversion progress
/// This allows different front ends to implement their own progress display.
///
/// All calls are made from the thread that drives the batch, in order.
pub trait ProgressReporter: Send + Sync {
    /// Set the total number of files to be processed
    fn set_total_files(&self, total: usize);

    /// Update current progress; `processed` never decreases and ends at `total`
    fn update_progress(&self, processed: usize, total: usize);

    /// Report that conversion has started
    fn start_conversion(&self) {}

    /// Report that conversion has finished
    fn finish_conversion(&self, _summary: &BatchSummary) {}

    /// Report an error for a specific file
    fn report_error(&self, _file_path: &Path, _error: &ConversionError) {}

    /// Report successful conversion of a file
    fn report_success(
        &self,
        _file_path: &Path,
        _output_path: &Path,
        _original_size: u64,
        _compressed_size: u64,
    ) {
    }

    /// Report a file that was not converted, with the reason
    fn report_skipped(&self, _file_path: &Path, _reason: &str) {}

    /// Report a non-fatal problem
    fn report_warning(&self, _warning: &ConversionWarning) {}
}

/// A no-op progress reporter for when progress reporting is not needed
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn set_total_files(&self, _total: usize) {}
    fn update_progress(&self, _processed: usize, _total: usize) {}
}

/// Console-based progress reporter using indicatif
#[cfg(feature = "cli")]
pub struct ConsoleProgressReporter {
    progress_bar: indicatif::ProgressBar,
    verbose: bool,
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(feature = "cli")]
impl ConsoleProgressReporter {
    /// `verbose` also prints one line per converted file
    pub fn new(verbose: bool) -> Self {
        let progress_bar = indicatif::ProgressBar::new(0);

        let template =
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(template) {
            progress_bar.set_style(style.progress_chars("#>-"));
        }

        Self {
            progress_bar,
            verbose,
        }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for ConsoleProgressReporter {
    fn set_total_files(&self, total: usize) {
        self.progress_bar.set_length(total as u64);
    }

    fn update_progress(&self, processed: usize, _total: usize) {
        self.progress_bar.set_position(processed as u64);
    }

    fn start_conversion(&self) {
        self.progress_bar.set_message("Converting images...");
    }

    fn finish_conversion(&self, summary: &BatchSummary) {
        use crate::stats::Completion;

        let message = match summary.completion() {
            Completion::AllSucceeded => "Conversion completed!",
            Completion::SomeFailed => "Conversion completed with errors",
            Completion::StoppedEarly => "Conversion stopped",
        };
        self.progress_bar.finish_with_message(message);
    }

    fn report_error(&self, file_path: &Path, error: &ConversionError) {
        self.progress_bar
            .println(format!("❌ Failed to convert {}: {error}", file_path.display()));
    }

    fn report_success(
        &self,
        file_path: &Path,
        output_path: &Path,
        original_size: u64,
        compressed_size: u64,
    ) {
        if !self.verbose {
            return;
        }

        self.progress_bar.println(format!(
            "✅ {} -> {} ({}, {:.1}% reduction)",
            file_path.display(),
            output_path.display(),
            humansize::format_size(compressed_size, humansize::DECIMAL),
            crate::utils::reduction_percent(original_size, compressed_size)
        ));
    }

    fn report_skipped(&self, file_path: &Path, reason: &str) {
        if self.verbose {
            self.progress_bar
                .println(format!("⏭️ Skipped {}: {reason}", file_path.display()));
        }
    }

    fn report_warning(&self, warning: &ConversionWarning) {
        self.progress_bar.println(format!("⚠️ {warning}"));
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::{
    config::{BatchOptions, ConversionSettings, is_supported_extension},
    converter::{Codec, WebpCodec},
    error::{ConfigError, ConversionError, ConversionWarning},
    paths::PathResolver,
    progress::{NoOpProgressReporter, ProgressReporter},
    space::SpaceChecker,
    stats::{BatchStats, BatchSummary},
    task::{ConversionOutcome, ConversionRequest, ConversionTask, OutcomeStatus},
};

/// Cooperative stop flag shared between a running batch and whoever wants to stop it
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Stop dispatching new files; files already being converted still finish
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a finished batch produced
#[derive(Debug)]
pub struct BatchResult {
    pub summary: BatchSummary,
    /// One outcome per discovered file, in completion order
    pub outcomes: Vec<ConversionOutcome>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub thread_count: usize,
}

/// Batch engine: discovers files, converts them on a bounded worker pool and
/// folds the outcomes into a summary
pub struct BatchConverter {
    settings: Arc<ConversionSettings>,
    options: BatchOptions,
    codec: Arc<dyn Codec>,
    space: SpaceChecker,
    stop: StopHandle,
}

impl BatchConverter {
    /// Create a new engine; `settings` are fixed for every run of this engine
    pub fn new(settings: ConversionSettings, options: BatchOptions) -> Self {
        let space = if options.check_space {
            SpaceChecker::new(options.min_free_space_mb)
        } else {
            SpaceChecker::disabled()
        };

        Self {
            settings: Arc::new(settings),
            options,
            codec: Arc::new(WebpCodec::new()),
            space,
            stop: StopHandle::default(),
        }
    }

    /// Replace the image codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the disk space checker
    pub fn with_space_checker(mut self, space: SpaceChecker) -> Self {
        self.space = space;
        self
    }

    /// Handle that stops this engine's runs from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Run the complete conversion process
    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchResult> {
        self.run_with_progress(inputs, None)
    }

    /// Run the conversion process with progress reporting
    pub fn run_with_progress(
        &self,
        inputs: &[PathBuf],
        progress_reporter: Option<Box<dyn ProgressReporter>>,
    ) -> Result<BatchResult> {
        let start_time = Instant::now();
        let start_time_utc = Utc::now();
        let reporter = progress_reporter.unwrap_or_else(|| Box::new(NoOpProgressReporter));

        self.settings.validate()?;
        let (output_dir, output_file) = self.output_layout(inputs)?;

        let requests = self.discover(inputs, output_file.as_deref(), reporter.as_ref());
        let total = requests.len();
        let stats = BatchStats::new(total as u64);
        let thread_count = self.options.get_thread_count().min(total.max(1));

        reporter.set_total_files(total);
        reporter.start_conversion();
        log::info!(
            "Converting {} file(s) with {} worker(s), quality {}{}",
            total,
            thread_count,
            self.settings.quality,
            if self.settings.lossless { ", lossless" } else { "" }
        );

        let stopped = if total == 0 {
            log::warn!("No supported image files found");
            reporter.update_progress(0, 0);
            false
        } else {
            let task = ConversionTask::new(
                Arc::clone(&self.codec),
                PathResolver::from_settings(output_dir, &self.settings),
                self.space.clone(),
                Arc::clone(&self.settings),
            );
            self.dispatch(requests, task, thread_count, &stats, reporter.as_ref())?
        };

        let summary = stats.summary(stopped);
        reporter.finish_conversion(&summary);
        log::info!(
            "Conversion complete. Successful: {}, Failed: {}, Skipped: {}",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );

        Ok(BatchResult {
            summary,
            outcomes: stats.take_outcomes(),
            start_time: start_time_utc,
            end_time: Utc::now(),
            duration: start_time.elapsed(),
            thread_count,
        })
    }

    /// Split the output option into an output directory or an explicit output file
    fn output_layout(
        &self,
        inputs: &[PathBuf],
    ) -> Result<(Option<PathBuf>, Option<PathBuf>), ConfigError> {
        match self.options.output_file() {
            Some(file) if inputs.len() == 1 && !inputs[0].is_dir() => {
                Ok((None, Some(file.to_path_buf())))
            }
            Some(file) => Err(ConfigError::OutputFileForMultipleInputs(file.to_path_buf())),
            None => Ok((self.options.output.clone(), None)),
        }
    }

    /// Turn the user's inputs into conversion requests
    fn discover(
        &self,
        inputs: &[PathBuf],
        output_file: Option<&Path>,
        reporter: &dyn ProgressReporter,
    ) -> Vec<ConversionRequest> {
        let mut seen = HashSet::new();
        let mut requests = Vec::new();
        let mut push = |request: ConversionRequest| {
            if seen.insert(request.input.clone()) {
                requests.push(request);
            } else {
                log::debug!("Ignoring duplicate input {}", request.input.display());
            }
        };

        for input in inputs {
            if input.is_dir() {
                for path in self.scan_directory(input, reporter) {
                    push(ConversionRequest::new(path, input.clone()));
                }
                continue;
            }

            if !is_supported_extension(input) {
                if input.exists() {
                    log::info!("Skipping unsupported file: {}", input.display());
                    reporter.report_skipped(input, "unsupported file type");
                } else {
                    log::warn!("Input path does not exist: {}", input.display());
                }
                continue;
            }

            // Missing files are still queued so their outcome reports the problem
            let root = input.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut request = ConversionRequest::new(input.clone(), root);
            if let Some(output) = output_file {
                request = request.with_output(output.to_path_buf());
            }
            push(request);
        }

        requests
    }

    /// Supported files under `dir`, sorted by name within each directory
    fn scan_directory(&self, dir: &Path, reporter: &dyn ProgressReporter) -> Vec<PathBuf> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read directory entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                if !self.options.recursive {
                    log::debug!("Skipping subdirectory (not recursive): {}", path.display());
                }
                continue;
            }

            if !path.is_file() {
                continue;
            }

            if is_supported_extension(path) {
                files.push(path.to_path_buf());
            } else {
                log::info!("Skipping unsupported file: {}", path.display());
                reporter.report_skipped(path, "unsupported file type");
            }
        }

        files
    }

    /// Feed requests to the pool, never more than `workers` at a time, and fold
    /// outcomes as they arrive. Returns whether the batch was stopped early.
    fn dispatch(
        &self,
        requests: Vec<ConversionRequest>,
        task: ConversionTask,
        workers: usize,
        stats: &BatchStats,
        reporter: &dyn ProgressReporter,
    ) -> Result<bool> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("towebp-worker-{index}"))
            .build()
            .context("Failed to build worker pool")?;
        let (sender, receiver) = crossbeam_channel::unbounded();

        let mut pending = requests.into_iter();
        let mut in_flight = 0usize;
        let mut stop_seen = false;

        loop {
            while in_flight < workers && !stop_seen {
                if self.stop.is_stop_requested() {
                    log::info!("Stop requested, waiting for {} running conversion(s)", in_flight);
                    stop_seen = true;
                    break;
                }
                let Some(request) = pending.next() else {
                    break;
                };

                let task = task.clone();
                let sender = sender.clone();
                pool.spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.convert(&request)))
                        .unwrap_or_else(|_| {
                            ConversionOutcome::failed(
                                request.input.clone(),
                                ConversionError::Encode("image codec panicked".to_string()),
                            )
                        });
                    // The receiver outlives every in-flight task
                    let _ = sender.send(outcome);
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let outcome = receiver
                .recv()
                .context("Worker pool stopped before reporting all outcomes")?;
            in_flight -= 1;
            self.finish_outcome(outcome, stats, reporter);
        }

        let mut stopped = false;
        for request in pending {
            stopped = true;
            self.finish_outcome(ConversionOutcome::skipped(request.input), stats, reporter);
        }

        Ok(stopped)
    }

    /// Post-conversion actions, reporting and aggregation for one outcome
    fn finish_outcome(
        &self,
        mut outcome: ConversionOutcome,
        stats: &BatchStats,
        reporter: &dyn ProgressReporter,
    ) {
        match &outcome.status {
            OutcomeStatus::Converted => {
                if !self.settings.preserve_originals {
                    if let Some(warning) = delete_original(&outcome.input) {
                        outcome.warnings.push(warning);
                    }
                }
                if let Some(output) = &outcome.output {
                    reporter.report_success(
                        &outcome.input,
                        output,
                        outcome.bytes_before,
                        outcome.bytes_after,
                    );
                }
            }
            OutcomeStatus::Failed(err) => {
                log::error!("Failed to convert {}: {}", outcome.input.display(), err);
                reporter.report_error(&outcome.input, err);
            }
            OutcomeStatus::Skipped => {
                reporter.report_skipped(&outcome.input, "batch stopped");
            }
        }

        for warning in &outcome.warnings {
            reporter.report_warning(warning);
        }

        let processed = stats.record(outcome);
        reporter.update_progress(processed as usize, stats.total() as usize);
    }
}

fn delete_original(input: &Path) -> Option<ConversionWarning> {
    match std::fs::remove_file(input) {
        Ok(()) => {
            log::debug!("Deleted original: {}", input.display());
            None
        }
        Err(e) => {
            log::warn!("Failed to delete original {}: {}", input.display(), e);
            Some(ConversionWarning::Deletion {
                path: input.to_path_buf(),
                message: e.to_string(),
            })
        }
    }
}

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::task::{ConversionOutcome, OutcomeStatus};

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    AllSucceeded,
    SomeFailed,
    StoppedEarly,
}

/// Aggregate result of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub stopped: bool,
}

impl BatchSummary {
    pub fn completion(&self) -> Completion {
        if self.stopped {
            Completion::StoppedEarly
        } else if self.failed > 0 {
            Completion::SomeFailed
        } else {
            Completion::AllSucceeded
        }
    }

    /// Compressed size as a fraction of the original size of converted files
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_before > 0 {
            self.bytes_after as f64 / self.bytes_before as f64
        } else {
            0.0
        }
    }

    pub fn space_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Running tallies for one batch.
///
/// Counters are atomics so readers on other threads (a progress display) see
/// consistent values; outcomes are collected append-only.
#[derive(Debug, Default)]
pub struct BatchStats {
    total: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    bytes_before: AtomicU64,
    bytes_after: AtomicU64,
    outcomes: Mutex<Vec<ConversionOutcome>>,
}

impl BatchStats {
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            ..Default::default()
        }
    }

    /// Fold one outcome in and return the new processed count
    pub fn record(&self, outcome: ConversionOutcome) -> u64 {
        match &outcome.status {
            OutcomeStatus::Converted => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.bytes_before.fetch_add(outcome.bytes_before, Ordering::Relaxed);
                self.bytes_after.fetch_add(outcome.bytes_after, Ordering::Relaxed);
            }
            OutcomeStatus::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            OutcomeStatus::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn summary(&self, stopped: bool) -> BatchSummary {
        BatchSummary {
            total: self.total(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes_before: self.bytes_before.load(Ordering::Relaxed),
            bytes_after: self.bytes_after.load(Ordering::Relaxed),
            stopped,
        }
    }

    /// Take the collected outcomes, leaving the list empty
    pub fn take_outcomes(&self) -> Vec<ConversionOutcome> {
        self.outcomes
            .lock()
            .map(|mut outcomes| std::mem::take(&mut *outcomes))
            .unwrap_or_default()
    }
}

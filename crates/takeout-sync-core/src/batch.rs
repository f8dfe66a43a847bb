//! Fan files out to a worker pool and fold their results into one report.
//!
//! Workers only produce [`FileResult`]s. The statistics and the failure registry
//! are owned by the single aggregation loop, so every result is merged exactly
//! once without any locking.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::pipeline::{process_file, PipelineContext};
use crate::report::describe_changes;
use crate::result::{ErrorKind, FileError, FileResult};
use crate::ThrottledProgress;

/// Upper bound for the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub files_processed: u64,
    pub files_updated: u64,
    pub files_skipped: u64,
    pub gps_updates_skipped: u64,
    pub errors: u64,
}

impl BatchStatistics {
    fn record(&mut self, result: &FileResult) {
        self.files_processed += 1;
        if result.gps_zero_skipped {
            self.gps_updates_skipped += 1;
        }
        if !result.success {
            self.errors += 1;
        } else if result.changes.is_empty() {
            self.files_skipped += 1;
        } else {
            self.files_updated += 1;
        }
    }
}

/// Failed paths grouped by error kind, iterated in taxonomy order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRegistry {
    by_kind: BTreeMap<ErrorKind, Vec<PathBuf>>,
}

impl FailureRegistry {
    pub fn record(&mut self, kind: ErrorKind, path: PathBuf) {
        self.by_kind.entry(kind).or_default().push(path);
    }

    pub fn files(&self, kind: ErrorKind) -> &[PathBuf] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty categories only.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, &[PathBuf])> {
        self.by_kind.iter().map(|(kind, files)| (*kind, files.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub files_found: u64,
    pub stats: BatchStatistics,
    pub failures: FailureRegistry,
    pub preview: bool,
    /// Cancellation was requested; files not yet started were never processed.
    pub cancelled: bool,
}

/// Twice the available parallelism, capped at [`MAX_DEFAULT_WORKERS`].
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores * 2).min(MAX_DEFAULT_WORKERS)
}

/// Process `files` on `workers` threads and aggregate the results.
///
/// Once `cancel` fires, files not yet started are skipped and the report covers
/// only what completed.
pub fn run_batch(
    files: &[PathBuf],
    ctx: &PipelineContext,
    workers: usize,
    cancel: Option<&CancellationToken>,
    progress: &ThrottledProgress,
) -> anyhow::Result<BatchReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("sync-worker-{}", i))
        .build()?;

    let total = files.len() as u64;
    let mut stats = BatchStatistics::default();
    let mut failures = FailureRegistry::default();
    let (tx, rx) = mpsc::channel::<FileResult>();

    std::thread::scope(|s| {
        s.spawn(move || {
            pool.install(|| {
                files.par_iter().for_each_with(tx, |tx, path| {
                    if cancel.map_or(false, CancellationToken::is_cancelled) {
                        return;
                    }
                    // The receiver only goes away if the aggregation loop panicked.
                    let _ = tx.send(process_guarded(path, ctx));
                });
            });
        });

        for (done, result) in rx.iter().enumerate() {
            merge(&mut stats, &mut failures, &result, ctx.preview);
            progress.report("sync", done as u64, total, &result.file_name());
        }
    });

    Ok(BatchReport {
        files_found: total,
        stats,
        failures,
        preview: ctx.preview,
        cancelled: cancel.map_or(false, CancellationToken::is_cancelled),
    })
}

fn merge(stats: &mut BatchStatistics, failures: &mut FailureRegistry, result: &FileResult, preview: bool) {
    stats.record(result);

    match &result.error {
        Some(error) => {
            failures.record(error.kind, result.path.clone());
            log::debug!("✗ {}: {}", result.file_name(), error.message);
        }
        None if result.changes.is_empty() => {
            log::debug!("✓ {} - no changes needed", result.file_name());
        }
        None => {
            for line in describe_changes(result, preview) {
                log::info!("{}", line);
            }
        }
    }
}

fn process_guarded(path: &Path, ctx: &PipelineContext) -> FileResult {
    match panic::catch_unwind(AssertUnwindSafe(|| process_file(path, ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            log::error!("Error processing {}: {}", path.display(), message);
            FileResult::failed(
                path,
                FileError::new(ErrorKind::ProcessingError, format!("Processing error: {}", message)),
            )
        }
    }
}

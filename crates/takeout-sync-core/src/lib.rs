pub mod apply;
pub mod batch;
pub mod cancel;
pub mod embedded;
pub mod filetimes;
pub mod media;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod result;
pub mod sidecar;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub use apply::Backends;
pub use batch::{default_workers, BatchReport, BatchStatistics, FailureRegistry};
pub use cancel::CancellationToken;
pub use embedded::{ExifBackend, FfmpegBackend};
pub use result::{ErrorKind, FileError, FileResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Directory tree holding media files and their sidecars.
    pub root: PathBuf,
    /// Report what would change without touching any file.
    #[serde(default)]
    pub preview: bool,
    /// Worker threads; `None` picks [`default_workers`].
    #[serde(default)]
    pub workers: Option<usize>,
}

impl SyncOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            preview: false,
            workers: None,
        }
    }
}

/// How a caller steers a running sync from another thread.
#[derive(Debug, Clone, Default)]
pub struct SyncControl {
    /// Checked before each file starts. Files already in flight always finish.
    pub cancel_token: Option<CancellationToken>,
}

impl SyncControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Receives `(stage, files_done, files_total, file_name)` after each merged result.
/// The callback may borrow from the caller for `'a`.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Minimum spacing between two forwarded progress updates.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Forwards at most one update per [`PROGRESS_INTERVAL`]; the last file always gets through.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(None),
        }
    }

    /// `done` counts from zero, so `done + 1 == total` is the last file.
    pub fn report(&self, stage: &str, done: u64, total: u64, file_name: &str) {
        if done + 1 < total {
            let mut last = self.last_emit.lock().unwrap();
            if last.map_or(false, |at| at.elapsed() < PROGRESS_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        (self.inner)(stage, done, total, file_name);
    }
}

/// Synchronize every media file under `options.root` using the EXIF and ffmpeg backends.
pub fn sync(
    options: &SyncOptions,
    control: &SyncControl,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<BatchReport> {
    let image = ExifBackend;
    let video = FfmpegBackend::default();
    sync_with_backends(
        options,
        control,
        Backends {
            image: &image,
            video: &video,
        },
        progress_callback,
    )
}

/// Like [`sync`], with caller-supplied metadata backends.
pub fn sync_with_backends(
    options: &SyncOptions,
    control: &SyncControl,
    backends: Backends,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<BatchReport> {
    if !options.root.is_dir() {
        bail!("Path is not a directory: {}", options.root.display());
    }
    let root = options
        .root
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", options.root.display()))?;

    let files = media::find_media_files(&root);
    let workers = options.workers.unwrap_or_else(default_workers);
    if files.is_empty() {
        log::warn!("No media files found in {}", root.display());
    } else {
        log::info!("Processing {} files with {} threads...", files.len(), workers);
    }
    if options.preview {
        log::info!("Preview mode: no files will be modified");
    }

    let birth_time = filetimes::BirthTimeSupport::probe(&root);
    let ctx = pipeline::PipelineContext {
        preview: options.preview,
        birth_time,
        backends,
    };

    let tp = ThrottledProgress::new(progress_callback);
    batch::run_batch(&files, &ctx, workers, control.cancel_token.as_ref(), &tp)
}

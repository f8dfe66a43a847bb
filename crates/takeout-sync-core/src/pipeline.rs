//! One file, start to finish: find its sidecar, read both sides, reconcile, apply.
//!
//! Stages run strictly in order and every stage can end the run. Each early exit
//! maps to exactly one [`ErrorKind`]; nothing escapes as a panic or a raw error.

use std::path::Path;

use crate::apply::{apply, video_tags_for, Backends};
use crate::embedded::video::find_creation_time;
use crate::embedded::MetadataError;
use crate::filetimes::{read_file_times, BirthTimeSupport};
use crate::media::MediaKind;
use crate::reconcile::reconcile;
use crate::record::ObservedState;
use crate::result::{ErrorKind, FileError, FileResult};
use crate::sidecar::{find_sidecar, load_sidecar};

/// Everything a worker needs besides the path. Shared read-only across workers.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    /// Report required changes without applying them.
    pub preview: bool,
    pub birth_time: BirthTimeSupport,
    pub backends: Backends<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Classify,
    SidecarLookup,
    SidecarLoad,
    ObservedExtract,
    Apply,
}

pub fn process_file(path: &Path, ctx: &PipelineContext) -> FileResult {
    let mut result = FileResult::new(path);
    match run(path, ctx, &mut result) {
        Ok(()) => result.success = true,
        Err((stage, error)) => {
            log::debug!("{} stopped at {:?}: {}", path.display(), stage, error);
            result.error = Some(error);
        }
    }
    result
}

fn run(path: &Path, ctx: &PipelineContext, result: &mut FileResult) -> Result<(), (Stage, FileError)> {
    let kind = MediaKind::from_path(path).ok_or_else(|| {
        (
            Stage::Classify,
            FileError::new(ErrorKind::ProcessingError, "Unsupported file type"),
        )
    })?;

    let sidecar = find_sidecar(path).ok_or_else(|| {
        (
            Stage::SidecarLookup,
            FileError::new(ErrorKind::NoMetadata, "No metadata file found"),
        )
    })?;

    let authoritative = load_sidecar(&sidecar).map_err(|e| {
        (
            Stage::SidecarLoad,
            FileError::new(ErrorKind::InvalidMetadata, format!("Failed to load metadata: {}", e)),
        )
    })?;

    let observed = observe(path, kind, ctx).map_err(|e| (Stage::ObservedExtract, e))?;

    let plan = reconcile(&authoritative, &observed);
    result.changes = plan.changes.clone();
    result.gps_zero_skipped = plan.gps_zero_skipped;

    if ctx.preview || plan.changes.is_empty() {
        return Ok(());
    }

    let video_tags = video_tags_for(&authoritative, &observed);
    apply(path, kind, &plan, &video_tags, &ctx.backends).map_err(|e| {
        (
            Stage::Apply,
            FileError::new(ErrorKind::ExifWriteError, e.to_string()),
        )
    })?;
    Ok(())
}

fn observe(path: &Path, kind: MediaKind, ctx: &PipelineContext) -> Result<ObservedState, FileError> {
    let read_error = |e: MetadataError| FileError::new(ErrorKind::ExifReadError, format!("Failed to read metadata: {}", e));

    let (embedded_time, embedded_location) = match kind {
        MediaKind::Image(format) => {
            let embedded = ctx.backends.image.read(path, format).map_err(read_error)?;
            (embedded.time, embedded.location)
        }
        // Container location is never read back.
        MediaKind::Video => {
            let tags = ctx.backends.video.read_tags(path).map_err(read_error)?;
            (find_creation_time(&tags), None)
        }
    };

    let file_times = read_file_times(path, ctx.birth_time).map_err(|e| {
        FileError::new(
            ErrorKind::ProcessingError,
            format!("Failed to read file times: {}", e),
        )
    })?;

    Ok(ObservedState {
        kind,
        embedded_time,
        embedded_location,
        file_times,
    })
}

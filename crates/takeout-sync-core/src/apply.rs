use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;

use crate::embedded::video::{creation_time_tag, location_tag};
use crate::embedded::{ImageBackend, MetadataError, VideoBackend, VideoTags};
use crate::filetimes::set_file_times;
use crate::media::MediaKind;
use crate::reconcile::Reconciliation;
use crate::record::{AuthoritativeRecord, ObservedState};

/// The collaborators that mutate embedded metadata.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub image: &'a dyn ImageBackend,
    pub video: &'a dyn VideoBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    ImageDateTime,
    ImageGps,
    VideoRewrite,
    FileTimestamps,
}

impl std::fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ApplyStep::ImageDateTime => "EXIF datetime update",
            ApplyStep::ImageGps => "EXIF GPS update",
            ApplyStep::VideoRewrite => "video metadata update",
            ApplyStep::FileTimestamps => "file timestamp update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct ApplyError {
    pub step: ApplyStep,
    #[source]
    pub source: MetadataError,
}

impl ApplyError {
    fn at(step: ApplyStep) -> impl FnOnce(MetadataError) -> ApplyError {
        move |source| ApplyError { step, source }
    }
}

/// Tags for a combined video rewrite. Creation time prefers the taken time, then
/// what the container already says, then the upload time.
pub fn video_tags_for(authoritative: &AuthoritativeRecord, observed: &ObservedState) -> VideoTags {
    VideoTags {
        creation_time: authoritative
            .taken_at
            .or(observed.embedded_time)
            .or(authoritative.created_at)
            .and_then(creation_time_tag),
        location: authoritative.location.point().map(location_tag),
    }
}

/// Apply a reconciliation's changes to one file, in order: embedded datetime, embedded GPS (images)
/// or one combined rewrite (videos), then filesystem timestamps.
///
/// The first failing step aborts the rest; earlier steps are not rolled back.
/// An embedded rewrite with no timestamp change scheduled puts the previous
/// modify/access times back so the file does not look out of sync next run.
pub fn apply(
    path: &Path,
    kind: MediaKind,
    plan: &Reconciliation,
    video_tags: &VideoTags,
    backends: &Backends,
) -> Result<Vec<ApplyStep>, ApplyError> {
    let datetime = plan.datetime_target();
    let gps = plan.gps_target();
    let file_times = plan.file_time_targets();

    let original_times = if file_times.is_none() && (datetime.is_some() || gps.is_some()) {
        Some(current_file_times(path).map_err(|e| ApplyError::at(ApplyStep::FileTimestamps)(e.into()))?)
    } else {
        None
    };

    let mut done = Vec::with_capacity(3);
    match kind {
        MediaKind::Image(format) => {
            if let Some(value) = datetime {
                backends
                    .image
                    .write_datetime(path, format, value)
                    .map_err(ApplyError::at(ApplyStep::ImageDateTime))?;
                done.push(ApplyStep::ImageDateTime);
            }
            if let Some(point) = gps {
                backends
                    .image
                    .write_gps(path, format, point)
                    .map_err(ApplyError::at(ApplyStep::ImageGps))?;
                done.push(ApplyStep::ImageGps);
            }
        }
        MediaKind::Video => {
            if datetime.is_some() || gps.is_some() {
                rewrite_video(path, video_tags, backends.video)
                    .map_err(ApplyError::at(ApplyStep::VideoRewrite))?;
                done.push(ApplyStep::VideoRewrite);
            }
        }
    }

    if let Some(targets) = file_times {
        set_file_times(path, &targets).map_err(|e| ApplyError::at(ApplyStep::FileTimestamps)(e.into()))?;
        done.push(ApplyStep::FileTimestamps);
    } else if let Some((atime, mtime)) = original_times {
        if !done.is_empty() {
            filetime::set_file_times(path, atime, mtime)
                .map_err(|e| ApplyError::at(ApplyStep::FileTimestamps)(e.into()))?;
        }
    }

    Ok(done)
}

/// `clip.mp4` -> `clip.temp.mp4` in the same directory.
pub fn temp_video_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{}.temp.{}", stem, ext.to_string_lossy()),
        None => format!("{}.temp", stem),
    };
    path.with_file_name(name)
}

/// Remux into a temporary sibling, then swap it in. On failure the temporary
/// file is removed and the original stays untouched.
fn rewrite_video(path: &Path, tags: &VideoTags, backend: &dyn VideoBackend) -> Result<(), MetadataError> {
    let temp = temp_video_path(path);
    let result = backend
        .remux(path, &temp, tags)
        .and_then(|_| fs::rename(&temp, path).map_err(MetadataError::from));
    if result.is_err() && temp.exists() {
        if let Err(e) = fs::remove_file(&temp) {
            log::warn!("Could not remove {}: {}", temp.display(), e);
        }
    }
    result
}

fn current_file_times(path: &Path) -> io::Result<(FileTime, FileTime)> {
    let meta = fs::metadata(path)?;
    Ok((
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filetimes::{read_file_times, BirthTimeSupport};
    use crate::media::ImageFormat;
    use crate::record::{local_from_unix, GeoPoint, RequiredChange, SidecarLocation};
    use crate::testing::{set_mtime, write_media, FakeImageBackend, FakeVideoBackend};
    use tempfile::tempdir;

    const TAKEN: i64 = 1_600_000_000;

    #[test]
    fn test_temp_video_path() {
        assert_eq!(
            temp_video_path(Path::new("/x/clip.mp4")),
            PathBuf::from("/x/clip.temp.mp4")
        );
        assert_eq!(
            temp_video_path(Path::new("/x/VID 1.MOV")),
            PathBuf::from("/x/VID 1.temp.MOV")
        );
    }

    #[test]
    fn test_video_creation_time_fallbacks() {
        let dir = tempdir().unwrap();
        let clip = write_media(dir.path(), "clip.mp4");
        let mut observed = ObservedState {
            kind: MediaKind::Video,
            embedded_time: local_from_unix(TAKEN + 10),
            embedded_location: None,
            file_times: read_file_times(&clip, BirthTimeSupport::ChangeTimeProxy).unwrap(),
        };
        let mut auth = AuthoritativeRecord {
            title: None,
            taken_at: local_from_unix(TAKEN),
            created_at: local_from_unix(TAKEN + 20),
            location: SidecarLocation::At(GeoPoint::new(1.5, -2.25)),
        };

        let tags = video_tags_for(&auth, &observed);
        assert_eq!(tags.creation_time, local_from_unix(TAKEN).and_then(creation_time_tag));
        assert_eq!(tags.location.as_deref(), Some("+1.500000-2.250000/"));

        auth.taken_at = None;
        let tags = video_tags_for(&auth, &observed);
        assert_eq!(tags.creation_time, local_from_unix(TAKEN + 10).and_then(creation_time_tag));

        observed.embedded_time = None;
        let tags = video_tags_for(&auth, &observed);
        assert_eq!(tags.creation_time, local_from_unix(TAKEN + 20).and_then(creation_time_tag));

        auth.created_at = None;
        auth.location = SidecarLocation::ZeroSentinel;
        assert_eq!(video_tags_for(&auth, &observed), VideoTags::default());
    }

    #[test]
    fn test_embedded_rewrite_keeps_file_times_when_none_scheduled() {
        let dir = tempdir().unwrap();
        let photo = write_media(dir.path(), "a.jpg");
        set_mtime(&photo, TAKEN);
        let (image, video) = (FakeImageBackend::default(), FakeVideoBackend::default());
        let backends = Backends { image: &image, video: &video };
        let plan = Reconciliation {
            changes: vec![RequiredChange::Gps {
                from: None,
                to: GeoPoint::new(10.0, 20.0),
            }],
            gps_zero_skipped: false,
        };

        let done = apply(
            &photo,
            MediaKind::Image(ImageFormat::Jpeg),
            &plan,
            &VideoTags::default(),
            &backends,
        )
        .unwrap();
        assert_eq!(done, vec![ApplyStep::ImageGps]);
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&photo).unwrap());
        assert_eq!(mtime.unix_seconds(), TAKEN);
    }

    #[test]
    fn test_error_names_failing_step() {
        let dir = tempdir().unwrap();
        let photo = write_media(dir.path(), "a.jpg");
        let (image, video) = (FakeImageBackend::default(), FakeVideoBackend::default());
        image.fail_writes_for(&photo);
        let plan = Reconciliation {
            changes: vec![RequiredChange::DateTime {
                from: None,
                to: local_from_unix(TAKEN).unwrap(),
            }],
            gps_zero_skipped: false,
        };

        let err = apply(
            &photo,
            MediaKind::Image(ImageFormat::Jpeg),
            &plan,
            &VideoTags::default(),
            &Backends { image: &image, video: &video },
        )
        .unwrap_err();
        assert_eq!(err.step, ApplyStep::ImageDateTime);
        assert!(err.to_string().starts_with("EXIF datetime update failed"));
    }
}

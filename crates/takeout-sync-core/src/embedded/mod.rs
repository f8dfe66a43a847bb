//! Metadata stored inside the media files themselves.
//!
//! The reconciler never touches containers directly; it goes through these two
//! backends so the pipeline can run against in-memory fakes in tests.

pub mod image;
pub mod video;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::media::ImageFormat;
use crate::record::GeoPoint;

pub use image::ExifBackend;
pub use video::FfmpegBackend;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("container error: {0}")]
    Container(#[from] img_parts::Error),

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },
}

/// Timestamp and location found in an image's EXIF block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmbeddedImage {
    pub time: Option<NaiveDateTime>,
    pub location: Option<GeoPoint>,
}

/// Tags for a combined video metadata rewrite, already formatted for the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoTags {
    /// `YYYY-MM-DDTHH:MM:SS.000000Z`
    pub creation_time: Option<String>,
    /// `+DD.DDDDDD+DDD.DDDDDD/`
    pub location: Option<String>,
}

pub trait ImageBackend: Send + Sync {
    /// A container without an EXIF block reads as empty; only unreadable or corrupt files are errors.
    fn read(&self, path: &Path, format: ImageFormat) -> Result<EmbeddedImage, MetadataError>;

    /// Rewrite original, digitized and modify date tags in place.
    fn write_datetime(
        &self,
        path: &Path,
        format: ImageFormat,
        value: NaiveDateTime,
    ) -> Result<(), MetadataError>;

    fn write_gps(&self, path: &Path, format: ImageFormat, point: GeoPoint)
        -> Result<(), MetadataError>;
}

pub trait VideoBackend: Send + Sync {
    /// Container tags first, then each stream's tags.
    fn read_tags(&self, path: &Path) -> Result<Vec<BTreeMap<String, String>>, MetadataError>;

    /// Stream-copy `src` into the new file `dst` with `tags` applied. Never touches `src`.
    fn remux(&self, src: &Path, dst: &Path, tags: &VideoTags) -> Result<(), MetadataError>;
}

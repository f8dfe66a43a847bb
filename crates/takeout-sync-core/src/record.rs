//! Value sets compared by the reconciler.
//!
//! All timestamps are naive local wall-clock times: that is what EXIF stores, so
//! sidecar epochs and filesystem times are converted into the same clock before
//! they are compared.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::filetimes::FileTimes;
use crate::media::MediaKind;

/// A coordinate in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Location as recorded in a sidecar. Takeout writes (0.0, 0.0) when no location
/// was recorded, which must never be mistaken for a real coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SidecarLocation {
    #[default]
    Absent,
    ZeroSentinel,
    At(GeoPoint),
}

impl SidecarLocation {
    /// Both halves must be present; a lone latitude or longitude counts as absent.
    pub fn from_pair(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat == 0.0 && lon == 0.0 => SidecarLocation::ZeroSentinel,
            (Some(lat), Some(lon)) => SidecarLocation::At(GeoPoint::new(lat, lon)),
            _ => SidecarLocation::Absent,
        }
    }

    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            SidecarLocation::At(p) => Some(*p),
            _ => None,
        }
    }
}

/// Authoritative values from a sidecar JSON record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthoritativeRecord {
    pub title: Option<String>,
    /// "Photo taken" moment.
    pub taken_at: Option<NaiveDateTime>,
    /// Upload time; only ever a fallback.
    pub created_at: Option<NaiveDateTime>,
    pub location: SidecarLocation,
}

impl AuthoritativeRecord {
    /// Filesystem modify-time target: taken time, falling back to creation time.
    pub fn modify_time_target(&self) -> Option<NaiveDateTime> {
        self.taken_at.or(self.created_at)
    }

    /// Filesystem access-time target: creation time, falling back to taken time.
    pub fn access_time_target(&self) -> Option<NaiveDateTime> {
        self.created_at.or(self.taken_at)
    }
}

/// What the media file currently says about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    pub kind: MediaKind,
    pub embedded_time: Option<NaiveDateTime>,
    /// Always `None` for videos; location is not read back from video containers.
    pub embedded_location: Option<GeoPoint>,
    pub file_times: FileTimes,
}

/// Targets for the filesystem timestamp rewrite. The two may legitimately differ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileTimeTargets {
    pub modified: NaiveDateTime,
    pub accessed: NaiveDateTime,
}

/// One field that needs to change, with the observed and target values for reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum RequiredChange {
    DateTime {
        from: Option<NaiveDateTime>,
        to: NaiveDateTime,
    },
    FileTimestamps {
        from: FileTimes,
        to: FileTimeTargets,
    },
    Gps {
        from: Option<GeoPoint>,
        to: GeoPoint,
    },
}

impl RequiredChange {
    pub fn label(&self) -> &'static str {
        match self {
            RequiredChange::DateTime { .. } => "datetime",
            RequiredChange::FileTimestamps { .. } => "file_timestamps",
            RequiredChange::Gps { .. } => "gps",
        }
    }
}

/// Convert Unix seconds into local wall-clock time.
pub fn local_from_unix(secs: i64) -> Option<NaiveDateTime> {
    let utc = DateTime::from_timestamp(secs, 0)?;
    Some(utc.with_timezone(&Local).naive_local())
}

/// Convert local wall-clock time back to Unix seconds.
/// Ambiguous times (DST fold) resolve to the earlier instant; times inside a DST gap have no answer.
pub fn unix_from_local(local: NaiveDateTime) -> Option<i64> {
    local
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.timestamp())
}

//! Decide, field by field, what has to change for a file to agree with its sidecar.
//!
//! The tolerances are fixed: re-running over a partially processed batch relies on
//! already-synced files falling inside them.

use chrono::NaiveDateTime;

use crate::media::MediaKind;
use crate::record::{AuthoritativeRecord, FileTimeTargets, GeoPoint, ObservedState, RequiredChange, SidecarLocation};

/// Largest accepted difference between an observed and an authoritative time.
pub const TIME_TOLERANCE_SECS: i64 = 60;

/// Largest accepted per-axis difference in degrees (about 11 m of latitude).
pub const GPS_TOLERANCE_DEG: f64 = 0.0001;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Always in datetime, file timestamps, gps order.
    pub changes: Vec<RequiredChange>,
    /// The sidecar carried the (0, 0) "no location" sentinel.
    pub gps_zero_skipped: bool,
}

impl Reconciliation {
    pub fn datetime_target(&self) -> Option<NaiveDateTime> {
        self.changes.iter().find_map(|c| match c {
            RequiredChange::DateTime { to, .. } => Some(*to),
            _ => None,
        })
    }

    pub fn gps_target(&self) -> Option<GeoPoint> {
        self.changes.iter().find_map(|c| match c {
            RequiredChange::Gps { to, .. } => Some(*to),
            _ => None,
        })
    }

    pub fn file_time_targets(&self) -> Option<FileTimeTargets> {
        self.changes.iter().find_map(|c| match c {
            RequiredChange::FileTimestamps { to, .. } => Some(*to),
            _ => None,
        })
    }
}

/// Compare authoritative against observed values. Every check runs regardless of
/// the others' outcome.
///
/// Formats with nowhere to store embedded metadata (BMP) only ever get the
/// filesystem timestamp change.
pub fn reconcile(authoritative: &AuthoritativeRecord, observed: &ObservedState) -> Reconciliation {
    let mut changes = Vec::with_capacity(3);
    let embeds = match observed.kind {
        MediaKind::Image(format) => format.carries_exif(),
        MediaKind::Video => true,
    };

    if let Some(taken_at) = authoritative.taken_at.filter(|_| embeds) {
        let in_sync = observed
            .embedded_time
            .map_or(false, |current| within_time_tolerance(current, taken_at));
        if !in_sync {
            changes.push(RequiredChange::DateTime {
                from: observed.embedded_time,
                to: taken_at,
            });
        }
    }

    if let (Some(modified), Some(accessed)) = (
        authoritative.modify_time_target(),
        authoritative.access_time_target(),
    ) {
        if !within_time_tolerance(observed.file_times.modified, modified) {
            changes.push(RequiredChange::FileTimestamps {
                from: observed.file_times,
                to: FileTimeTargets { modified, accessed },
            });
        }
    }

    let mut gps_zero_skipped = false;
    match authoritative.location {
        SidecarLocation::At(_) if !embeds => {}
        SidecarLocation::At(target) => {
            let in_sync = observed
                .embedded_location
                .map_or(false, |current| within_gps_tolerance(current, target));
            if !in_sync {
                changes.push(RequiredChange::Gps {
                    from: observed.embedded_location,
                    to: target,
                });
            }
        }
        SidecarLocation::ZeroSentinel => gps_zero_skipped = true,
        SidecarLocation::Absent => {}
    }

    Reconciliation {
        changes,
        gps_zero_skipped,
    }
}

fn within_time_tolerance(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    (a - b).num_milliseconds().abs() <= TIME_TOLERANCE_SECS * 1000
}

fn within_gps_tolerance(a: GeoPoint, b: GeoPoint) -> bool {
    (a.latitude - b.latitude).abs() <= GPS_TOLERANCE_DEG
        && (a.longitude - b.longitude).abs() <= GPS_TOLERANCE_DEG
}

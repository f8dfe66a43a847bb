use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use filetime::FileTime;
use serde::{Deserialize, Serialize};

use crate::record::{unix_from_local, FileTimeTargets};

/// Whether the platform reports a true creation (birth) time.
///
/// Probed once per run. Without birth time the inode change time stands in, which
/// is *not* a creation time; it is only ever shown, never used as a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BirthTimeSupport {
    Native,
    ChangeTimeProxy,
}

impl BirthTimeSupport {
    pub fn probe(path: &Path) -> Self {
        match fs::metadata(path).and_then(|m| m.created()) {
            Ok(_) => BirthTimeSupport::Native,
            Err(e) => {
                log::debug!("Birth time unavailable ({}), using change time instead", e);
                BirthTimeSupport::ChangeTimeProxy
            }
        }
    }
}

/// Filesystem timestamps of one file, in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileTimes {
    pub modified: NaiveDateTime,
    pub accessed: NaiveDateTime,
    pub created: NaiveDateTime,
    /// Where `created` actually came from; a native probe can still fall back per file.
    pub created_source: BirthTimeSupport,
}

pub fn read_file_times(path: &Path, support: BirthTimeSupport) -> io::Result<FileTimes> {
    let meta = fs::metadata(path)?;
    let modified = to_local(FileTime::from_last_modification_time(&meta))?;
    let accessed = to_local(FileTime::from_last_access_time(&meta))?;

    let birth = match support {
        BirthTimeSupport::Native => FileTime::from_creation_time(&meta),
        BirthTimeSupport::ChangeTimeProxy => None,
    };
    let (created, created_source) = match birth {
        Some(ft) => (to_local(ft)?, BirthTimeSupport::Native),
        None => (to_local(change_time(&meta))?, BirthTimeSupport::ChangeTimeProxy),
    };

    Ok(FileTimes {
        modified,
        accessed,
        created,
        created_source,
    })
}

/// Set modify and access time. Sub-second precision is dropped.
pub fn set_file_times(path: &Path, targets: &FileTimeTargets) -> io::Result<()> {
    let mtime = to_filetime(targets.modified)?;
    let atime = to_filetime(targets.accessed)?;
    filetime::set_file_times(path, atime, mtime)
}

fn to_local(ft: FileTime) -> io::Result<NaiveDateTime> {
    DateTime::from_timestamp(ft.unix_seconds(), ft.nanoseconds())
        .map(|utc| utc.with_timezone(&Local).naive_local())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "file time out of range"))
}

fn to_filetime(local: NaiveDateTime) -> io::Result<FileTime> {
    let secs = unix_from_local(local).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not exist in the local time zone", local),
        )
    })?;
    Ok(FileTime::from_unix_time(secs, 0))
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> FileTime {
    use std::os::unix::fs::MetadataExt;
    FileTime::from_unix_time(meta.ctime(), meta.ctime_nsec() as u32)
}

#[cfg(not(unix))]
fn change_time(meta: &Metadata) -> FileTime {
    FileTime::from_last_modification_time(meta)
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::record::{local_from_unix, AuthoritativeRecord, SidecarLocation};

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarJson {
    title: Option<String>,
    photo_taken_time: Option<TimeField>,
    creation_time: Option<TimeField>,
    geo_data: Option<GeoData>,
}

#[derive(Debug, Deserialize)]
struct TimeField {
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeoData {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Find the sidecar for `media`: a `.json` entry in the same directory whose name
/// starts with the media file's full name. Candidates are tried in name order and
/// the first one that looks like a Takeout record wins.
pub fn find_sidecar(media: &Path) -> Option<PathBuf> {
    let dir = media.parent()?;
    let media_name: String = media.file_name()?.to_string_lossy().nfc().collect();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list {}: {}", dir.display(), e);
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
        })
        .filter(|path| {
            path.file_name().map_or(false, |name| {
                let name: String = name.to_string_lossy().nfc().collect();
                name.starts_with(&media_name)
            })
        })
        .collect();
    candidates.sort();

    candidates.into_iter().find(|path| is_valid_sidecar(path))
}

/// Structural check: a JSON object with a taken or creation time and a title.
pub fn is_valid_sidecar(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    let Ok(data) = serde_json::from_slice::<Value>(&bytes) else {
        return false;
    };
    (data.get("photoTakenTime").is_some() || data.get("creationTime").is_some())
        && data.get("title").is_some()
}

pub fn load_sidecar(path: &Path) -> Result<AuthoritativeRecord, SidecarError> {
    let bytes = fs::read(path).map_err(|source| SidecarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_sidecar(&bytes).map_err(|source| SidecarError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse Takeout JSON into an authoritative record.
pub fn parse_sidecar(json_bytes: &[u8]) -> Result<AuthoritativeRecord, serde_json::Error> {
    let data: SidecarJson = serde_json::from_slice(json_bytes)?;

    let location = match data.geo_data {
        Some(geo) => SidecarLocation::from_pair(geo.latitude, geo.longitude),
        None => SidecarLocation::Absent,
    };

    Ok(AuthoritativeRecord {
        title: data.title,
        taken_at: data.photo_taken_time.as_ref().and_then(parse_timestamp),
        created_at: data.creation_time.as_ref().and_then(parse_timestamp),
        location,
    })
}

/// Takeout encodes epochs as strings; plain integers are accepted too.
fn parse_timestamp(field: &TimeField) -> Option<chrono::NaiveDateTime> {
    let epoch = match field.timestamp.as_ref()? {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    match epoch {
        Some(epoch) => local_from_unix(epoch),
        None => {
            log::debug!("Ignoring unparsable sidecar timestamp: {:?}", field.timestamp);
            None
        }
    }
}

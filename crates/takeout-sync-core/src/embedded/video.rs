use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{MetadataError, VideoBackend, VideoTags};
use crate::record::GeoPoint;

/// Tag names that may hold a video's creation time, in lookup order.
const CREATION_TIME_KEYS: [&str; 4] = ["creation_time", "date", "DATE", "Creation Time"];

/// Shells out to `ffprobe` for reading and `ffmpeg` for stream-copy rewrites.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegBackend {
    pub fn with_binaries(ffprobe: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Probe {
    format: Option<ProbeSection>,
    #[serde(default)]
    streams: Vec<ProbeSection>,
}

#[derive(Debug, Deserialize)]
struct ProbeSection {
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

impl ProbeSection {
    fn string_tags(self) -> BTreeMap<String, String> {
        self.tags
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect()
    }
}

impl VideoBackend for FfmpegBackend {
    fn read_tags(&self, path: &Path) -> Result<Vec<BTreeMap<String, String>>, MetadataError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output();
        let output = check_output("ffprobe", output)?;

        let probe: Probe = serde_json::from_slice(&output.stdout).map_err(|e| MetadataError::Tool {
            tool: "ffprobe",
            message: format!("unexpected output: {}", e),
        })?;

        let mut sections = Vec::with_capacity(probe.streams.len() + 1);
        if let Some(format) = probe.format {
            sections.push(format.string_tags());
        }
        sections.extend(probe.streams.into_iter().map(ProbeSection::string_tags));
        Ok(sections)
    }

    fn remux(&self, src: &Path, dst: &Path, tags: &VideoTags) -> Result<(), MetadataError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-i"])
            .arg(src)
            .args(["-map", "0", "-c", "copy"]);
        if let Some(ref creation_time) = tags.creation_time {
            cmd.arg("-metadata").arg(format!("creation_time={}", creation_time));
        }
        if let Some(ref location) = tags.location {
            cmd.arg("-metadata").arg(format!("location={}", location));
            cmd.arg("-metadata").arg(format!("location-eng={}", location));
        }
        cmd.arg(dst);

        check_output("ffmpeg", cmd.output())?;
        Ok(())
    }
}

fn check_output(tool: &'static str, output: std::io::Result<Output>) -> Result<Output, MetadataError> {
    let output = output.map_err(|e| MetadataError::Tool {
        tool,
        message: e.to_string(),
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => output.status.to_string(),
            s => s.to_string(),
        };
        return Err(MetadataError::Tool { tool, message });
    }
    Ok(output)
}

/// The first creation-time tag found wins, even when it does not parse.
pub fn find_creation_time(sections: &[BTreeMap<String, String>]) -> Option<NaiveDateTime> {
    let raw = sections
        .iter()
        .find_map(|tags| CREATION_TIME_KEYS.iter().find_map(|key| tags.get(*key)))?;
    let parsed = parse_video_time(raw);
    if parsed.is_none() {
        log::debug!("Unparsable video creation time: {:?}", raw);
    }
    parsed
}

/// Parse a container timestamp into local wall-clock time.
/// Zoned values (RFC 3339, trailing ` UTC`) are converted; naive values are taken as local.
pub fn parse_video_time(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Some(utc) = s.strip_suffix("UTC") {
        let naive = parse_naive(utc.trim_end())?;
        return Some(naive.and_utc().with_timezone(&Local).naive_local());
    }
    parse_naive(s)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Container creation time is UTC; convert the local target before formatting.
pub fn creation_time_tag(local: NaiveDateTime) -> Option<String> {
    let utc = local.and_local_timezone(Local).earliest()?.with_timezone(&Utc);
    Some(utc.format("%Y-%m-%dT%H:%M:%S.000000Z").to_string())
}

/// ISO 6709 style `+lat+lon/` as understood by QuickTime-family muxers.
pub fn location_tag(point: GeoPoint) -> String {
    format!("{:+.6}{:+.6}/", point.latitude, point.longitude)
}

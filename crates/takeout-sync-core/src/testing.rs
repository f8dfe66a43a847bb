//! In-memory backends and fixture helpers for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use filetime::FileTime;

use crate::cancel::CancellationToken;
use crate::embedded::{EmbeddedImage, ImageBackend, MetadataError, VideoBackend, VideoTags};
use crate::media::ImageFormat;
use crate::record::GeoPoint;

pub fn write_media(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"media bytes").unwrap();
    path
}

pub fn write_sidecar(dir: &Path, name: &str, json: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, json).unwrap();
    path
}

pub fn set_mtime(path: &Path, unix_secs: i64) {
    let ft = FileTime::from_unix_time(unix_secs, 0);
    filetime::set_file_times(path, ft, ft).unwrap();
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// EXIF state kept per path. Writes never touch the file on disk.
#[derive(Default)]
pub struct FakeImageBackend {
    state: Mutex<HashMap<PathBuf, EmbeddedImage>>,
    calls: Mutex<Vec<String>>,
    fail_reads: Mutex<HashSet<PathBuf>>,
    fail_writes: Mutex<HashSet<PathBuf>>,
    panic_on: Mutex<HashSet<PathBuf>>,
    cancel_on_read: Mutex<Option<CancellationToken>>,
}

impl FakeImageBackend {
    pub fn set(&self, path: &Path, embedded: EmbeddedImage) {
        self.state.lock().unwrap().insert(path.to_path_buf(), embedded);
    }

    pub fn get(&self, path: &Path) -> EmbeddedImage {
        self.state.lock().unwrap().get(path).copied().unwrap_or_default()
    }

    /// Write calls as `"<datetime|gps> <file name>"`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_reads_for(&self, path: &Path) {
        self.fail_reads.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn fail_writes_for(&self, path: &Path) {
        self.fail_writes.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn panic_on(&self, path: &Path) {
        self.panic_on.lock().unwrap().insert(path.to_path_buf());
    }

    /// The first `read` fires `token`, whichever file it is for.
    pub fn cancel_on_first_read(&self, token: CancellationToken) {
        *self.cancel_on_read.lock().unwrap() = Some(token);
    }

    fn write(&self, path: &Path, what: &str, edit: impl FnOnce(&mut EmbeddedImage)) -> Result<(), MetadataError> {
        self.calls.lock().unwrap().push(format!("{} {}", what, name_of(path)));
        if self.fail_writes.lock().unwrap().contains(path) {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        let mut state = self.state.lock().unwrap();
        edit(state.entry(path.to_path_buf()).or_default());
        Ok(())
    }
}

impl ImageBackend for FakeImageBackend {
    fn read(&self, path: &Path, _format: ImageFormat) -> Result<EmbeddedImage, MetadataError> {
        if self.panic_on.lock().unwrap().contains(path) {
            panic!("decoder blew up on {}", path.display());
        }
        if let Some(token) = self.cancel_on_read.lock().unwrap().take() {
            token.cancel();
        }
        if self.fail_reads.lock().unwrap().contains(path) {
            return Err(MetadataError::Exif(exif::Error::InvalidFormat("corrupt")));
        }
        Ok(self.get(path))
    }

    fn write_datetime(&self, path: &Path, _format: ImageFormat, value: NaiveDateTime) -> Result<(), MetadataError> {
        self.write(path, "datetime", |e| e.time = Some(value))
    }

    fn write_gps(&self, path: &Path, _format: ImageFormat, point: GeoPoint) -> Result<(), MetadataError> {
        self.write(path, "gps", |e| e.location = Some(point))
    }
}

/// Container tags kept per path. `remux` copies the file and records the tags
/// under the source path, which is where the rewritten file ends up.
#[derive(Default)]
pub struct FakeVideoBackend {
    tags: Mutex<HashMap<PathBuf, BTreeMap<String, String>>>,
    remuxes: Mutex<Vec<(PathBuf, PathBuf, VideoTags)>>,
    fail_remux: bool,
}

impl FakeVideoBackend {
    /// Every remux leaves a partial output behind and then fails.
    pub fn failing() -> Self {
        Self {
            fail_remux: true,
            ..Self::default()
        }
    }

    pub fn remuxes(&self) -> Vec<(PathBuf, PathBuf, VideoTags)> {
        self.remuxes.lock().unwrap().clone()
    }
}

impl VideoBackend for FakeVideoBackend {
    fn read_tags(&self, path: &Path) -> Result<Vec<BTreeMap<String, String>>, MetadataError> {
        let tags = self.tags.lock().unwrap().get(path).cloned().unwrap_or_default();
        Ok(vec![tags])
    }

    fn remux(&self, src: &Path, dst: &Path, tags: &VideoTags) -> Result<(), MetadataError> {
        self.remuxes
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dst.to_path_buf(), tags.clone()));
        if self.fail_remux {
            fs::write(dst, b"partial")?;
            return Err(MetadataError::Tool {
                tool: "ffmpeg",
                message: "muxer error".to_string(),
            });
        }
        fs::copy(src, dst)?;
        let mut recorded = BTreeMap::new();
        if let Some(ref creation_time) = tags.creation_time {
            recorded.insert("creation_time".to_string(), creation_time.clone());
        }
        if let Some(ref location) = tags.location {
            recorded.insert("location".to_string(), location.clone());
        }
        self.tags.lock().unwrap().insert(src.to_path_buf(), recorded);
        Ok(())
    }
}

pub const TIFF_PIXELS: [u8; 4] = [0, 64, 128, 255];

fn push_segment(bytes: &mut Vec<u8>, marker: u8, contents: &[u8]) {
    bytes.extend_from_slice(&[0xFF, marker]);
    bytes.extend_from_slice(&(contents.len() as u16 + 2).to_be_bytes());
    bytes.extend_from_slice(contents);
}

/// A structurally complete baseline JPEG with no EXIF block. The scan data is not decodable.
pub fn tiny_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    push_segment(&mut bytes, 0xE0, b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
    let mut dqt = vec![0u8];
    dqt.extend_from_slice(&[1u8; 64]);
    push_segment(&mut bytes, 0xDB, &dqt);
    push_segment(&mut bytes, 0xC0, &[8, 0, 4, 0, 4, 1, 1, 0x11, 0]);
    let mut dht = vec![0u8, 1];
    dht.extend_from_slice(&[0u8; 15]);
    dht.push(0);
    push_segment(&mut bytes, 0xC4, &dht);
    push_segment(&mut bytes, 0xDA, &[1, 1, 0x00, 0, 63, 0]);
    bytes.extend_from_slice(&[0x00, 0x00, 0xFF, 0xD9]);
    bytes
}

/// A 1x1 greyscale PNG with no EXIF chunk.
pub fn tiny_png() -> Vec<u8> {
    use img_parts::png::PngChunk;
    use img_parts::Bytes;

    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    let chunks = [
        (*b"IHDR", vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]),
        (*b"IDAT", vec![0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01]),
        (*b"IEND", Vec::new()),
    ];
    for (kind, contents) in chunks {
        bytes.extend_from_slice(&PngChunk::new(kind, Bytes::from(contents)).encoder().bytes());
    }
    bytes
}

/// A 2x2 greyscale, little-endian TIFF holding [`TIFF_PIXELS`] in one strip.
pub fn tiny_tiff() -> Vec<u8> {
    use exif::{Field, In, Tag, Value};

    let short = |tag: Tag, value: u16| Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![value]),
    };
    let fields = [
        short(Tag::ImageWidth, 2),
        short(Tag::ImageLength, 2),
        short(Tag::BitsPerSample, 8),
        short(Tag::Compression, 1),
        short(Tag::PhotometricInterpretation, 1),
        short(Tag::RowsPerStrip, 2),
        Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"Scanner".to_vec()]),
        },
    ];
    let strips: [&[u8]; 1] = [&TIFF_PIXELS];

    let mut writer = exif::experimental::Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    writer.set_strips(&strips, In::PRIMARY);
    let mut buf = std::io::Cursor::new(Vec::new());
    writer.write(&mut buf, true).unwrap();
    buf.into_inner()
}

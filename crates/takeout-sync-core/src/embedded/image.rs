use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use exif::{Context, Exif, Field, In, Rational, Reader, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};

use super::{EmbeddedImage, ImageBackend, MetadataError};
use crate::media::ImageFormat;
use crate::record::GeoPoint;

/// Read order for the embedded timestamp. All three are written together.
const DATETIME_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

const GPS_TAGS: [Tag; 5] = [
    Tag::GPSVersionID,
    Tag::GPSLatitudeRef,
    Tag::GPSLatitude,
    Tag::GPSLongitudeRef,
    Tag::GPSLongitude,
];

/// Offsets and pointers the writer recomputes itself.
const DROPPED_TAGS: [Tag; 9] = [
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
];

/// `SubIFDs` (330). Its offsets point into the old layout.
const SUB_IFDS: Tag = Tag(Context::Tiff, 330);

/// EXIF through `kamadak-exif` for reading and encoding, `img-parts` for splicing
/// the block back into JPEG and PNG containers. TIFF files are rebuilt by the
/// EXIF writer around their original strips. Pixel data is never re-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifBackend;

impl ImageBackend for ExifBackend {
    fn read(&self, path: &Path, format: ImageFormat) -> Result<EmbeddedImage, MetadataError> {
        if !format.carries_exif() {
            return Ok(EmbeddedImage::default());
        }
        let file = File::open(path)?;
        let exif = match Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(EmbeddedImage::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(EmbeddedImage {
            time: exif_datetime(&exif),
            location: exif_location(&exif),
        })
    }

    fn write_datetime(
        &self,
        path: &Path,
        format: ImageFormat,
        value: NaiveDateTime,
    ) -> Result<(), MetadataError> {
        rewrite_exif(path, format, |fields| set_datetime(fields, value))
    }

    fn write_gps(
        &self,
        path: &Path,
        format: ImageFormat,
        point: GeoPoint,
    ) -> Result<(), MetadataError> {
        rewrite_exif(path, format, |fields| set_gps(fields, point))
    }
}

/// Extract the first parsable timestamp.
/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn exif_datetime(exif: &Exif) -> Option<NaiveDateTime> {
    DATETIME_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match field.value {
            Value::Ascii(ref parts) => {
                let raw = std::str::from_utf8(parts.first()?).ok()?;
                parse_exif_datetime(raw.trim_end_matches('\0'))
            }
            _ => parse_exif_datetime(&field.display_value().to_string()),
        }
    })
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    let date = chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d").ok()?;
    date.and_hms_opt(0, 0, 0)
}

pub fn exif_location(exif: &Exif) -> Option<GeoPoint> {
    let mut latitude = dms_field(exif, Tag::GPSLatitude)?;
    let mut longitude = dms_field(exif, Tag::GPSLongitude)?;
    if reference_is(exif, Tag::GPSLatitudeRef, b'S') {
        latitude = -latitude;
    }
    if reference_is(exif, Tag::GPSLongitudeRef, b'W') {
        longitude = -longitude;
    }
    Some(GeoPoint::new(latitude, longitude))
}

fn dms_field(exif: &Exif, tag: Tag) -> Option<f64> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(ref parts) if parts.len() == 3 => dms_to_decimal(parts),
        _ => None,
    }
}

fn reference_is(exif: &Exif, tag: Tag, expected: u8) -> bool {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|field| match field.value {
            Value::Ascii(ref parts) => parts.first().and_then(|s| s.first().copied()),
            _ => None,
        })
        .map_or(false, |c| c.eq_ignore_ascii_case(&expected))
}

/// Degrees, minutes, seconds rationals to unsigned decimal degrees.
pub fn dms_to_decimal(parts: &[Rational]) -> Option<f64> {
    if parts.len() != 3 || parts.iter().any(|r| r.denom == 0) {
        return None;
    }
    Some(parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0)
}

/// Unsigned decimal degrees to degrees/minutes/seconds, seconds in thousandths.
/// The sign is carried separately by the hemisphere reference tag.
pub fn decimal_to_dms(decimal: f64) -> [Rational; 3] {
    let abs = decimal.abs();
    let degrees = abs.trunc();
    let minutes_float = (abs - degrees) * 60.0;
    let minutes = minutes_float.trunc();
    let seconds = (minutes_float - minutes) * 60.0;
    [
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        Rational { num: (seconds * 1000.0) as u32, denom: 1000 },
    ]
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

fn set_datetime(fields: &mut Vec<Field>, value: NaiveDateTime) {
    let text = value.format("%Y:%m:%d %H:%M:%S").to_string();
    fields.retain(|f| !DATETIME_TAGS.contains(&f.tag));
    for tag in DATETIME_TAGS {
        fields.push(ascii(tag, &text));
    }
}

fn set_gps(fields: &mut Vec<Field>, point: GeoPoint) {
    fields.retain(|f| !GPS_TAGS.contains(&f.tag));
    fields.push(Field {
        tag: Tag::GPSVersionID,
        ifd_num: In::PRIMARY,
        value: Value::Byte(vec![2, 2, 0, 0]),
    });
    fields.push(ascii(Tag::GPSLatitudeRef, if point.latitude >= 0.0 { "N" } else { "S" }));
    fields.push(Field {
        tag: Tag::GPSLatitude,
        ifd_num: In::PRIMARY,
        value: Value::Rational(decimal_to_dms(point.latitude).to_vec()),
    });
    fields.push(ascii(Tag::GPSLongitudeRef, if point.longitude >= 0.0 { "E" } else { "W" }));
    fields.push(Field {
        tag: Tag::GPSLongitude,
        ifd_num: In::PRIMARY,
        value: Value::Rational(decimal_to_dms(point.longitude).to_vec()),
    });
}

/// Primary-IFD fields of the existing block, minus what the writer lays out itself.
/// The thumbnail IFD is not carried over.
fn existing_fields(bytes: &[u8]) -> Result<Vec<Field>, MetadataError> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Ok(primary_fields(&exif)),
        Err(exif::Error::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Fields of unknown type cannot be re-encoded and are dropped.
fn primary_fields(exif: &Exif) -> Vec<Field> {
    exif.fields()
        .filter(|f| f.ifd_num == In::PRIMARY && !DROPPED_TAGS.contains(&f.tag))
        .filter(|f| !matches!(f.value, Value::Unknown(..)))
        .map(|f| Field {
            tag: f.tag,
            ifd_num: f.ifd_num,
            value: f.value.clone(),
        })
        .collect()
}

/// Serialize fields as a big-endian TIFF structure, the payload of an EXIF block.
pub fn encode_fields(fields: &[Field]) -> Result<Vec<u8>, MetadataError> {
    let mut writer = exif::experimental::Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

fn rewrite_exif<F>(path: &Path, format: ImageFormat, edit: F) -> Result<(), MetadataError>
where
    F: FnOnce(&mut Vec<Field>),
{
    let bytes = fs::read(path)?;
    let output = match format {
        ImageFormat::Jpeg => {
            let exif_bytes = edited_block(&bytes, edit)?;
            let mut jpeg = Jpeg::from_bytes(bytes.into())?;
            jpeg.set_exif(Some(exif_bytes));
            jpeg.encoder().bytes().to_vec()
        }
        ImageFormat::Png => {
            let exif_bytes = edited_block(&bytes, edit)?;
            let mut png = Png::from_bytes(bytes.into())?;
            png.set_exif(Some(exif_bytes));
            png.encoder().bytes().to_vec()
        }
        ImageFormat::Tiff => rewrite_tiff(&bytes, edit)?,
        ImageFormat::Bmp => {
            return Err(MetadataError::Unsupported("writing EXIF to BMP files".to_string()));
        }
    };

    replace_contents(path, &output)
}

fn edited_block<F>(bytes: &[u8], edit: F) -> Result<Bytes, MetadataError>
where
    F: FnOnce(&mut Vec<Field>),
{
    let mut fields = existing_fields(bytes)?;
    edit(&mut fields);
    Ok(Bytes::from(encode_fields(&fields)?))
}

/// A TIFF file is its own EXIF structure, so the whole file is re-laid out around
/// the existing image data. Byte order is kept. Files with more than one IFD or
/// with sub-IFDs are refused rather than truncated.
fn rewrite_tiff<F>(bytes: &[u8], edit: F) -> Result<Vec<u8>, MetadataError>
where
    F: FnOnce(&mut Vec<Field>),
{
    let exif = Reader::new().read_raw(bytes.to_vec())?;
    if exif.fields().any(|f| f.ifd_num != In::PRIMARY || f.tag == SUB_IFDS) {
        return Err(MetadataError::Unsupported("rewriting multi-image TIFF files".to_string()));
    }

    let tiled = exif.get_field(Tag::TileOffsets, In::PRIMARY).is_some();
    let chunks = if tiled {
        image_chunks(&exif, bytes, Tag::TileOffsets, Tag::TileByteCounts)?
    } else {
        image_chunks(&exif, bytes, Tag::StripOffsets, Tag::StripByteCounts)?
    };

    let mut fields = primary_fields(&exif);
    edit(&mut fields);

    let mut writer = exif::experimental::Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    if tiled {
        writer.set_tiles(&chunks, In::PRIMARY);
    } else {
        writer.set_strips(&chunks, In::PRIMARY);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, exif.little_endian())?;
    Ok(buf.into_inner())
}

/// Slices of `bytes` named by an offsets/byte-counts tag pair.
fn image_chunks<'a>(
    exif: &Exif,
    bytes: &'a [u8],
    offsets_tag: Tag,
    counts_tag: Tag,
) -> Result<Vec<&'a [u8]>, MetadataError> {
    let invalid = || MetadataError::Exif(exif::Error::InvalidFormat("TIFF image data offsets are inconsistent"));
    let uints = |tag: Tag| -> Option<Vec<u32>> {
        Some(exif.get_field(tag, In::PRIMARY)?.value.iter_uint()?.collect())
    };
    let offsets = uints(offsets_tag).ok_or_else(invalid)?;
    let counts = uints(counts_tag).ok_or_else(invalid)?;
    if offsets.len() != counts.len() {
        return Err(invalid());
    }
    offsets
        .iter()
        .zip(&counts)
        .map(|(&offset, &count)| {
            let start = offset as usize;
            bytes.get(start..start.checked_add(count as usize)?)
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)
}

/// Write to a sibling temp file first, then rename over the original.
fn replace_contents(path: &Path, contents: &[u8]) -> Result<(), MetadataError> {
    let temp_path = temp_sibling(path);
    let permissions = fs::metadata(path)?.permissions();
    let written = fs::write(&temp_path, contents)
        .and_then(|_| fs::set_permissions(&temp_path, permissions))
        .and_then(|_| fs::rename(&temp_path, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".exif-tmp");
    path.with_file_name(name)
}

use crate::metadata::{CaptureInfo, MetadataError, MetadataReader};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF-backed metadata collaborator for JPEG files.
///
/// Capture time is read from `DateTimeOriginal` only. Rewriting lives in
/// `exif_writer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadata;

impl MetadataReader for ExifMetadata {
    fn read_capture_info(&self, path: &Path) -> Result<CaptureInfo, MetadataError> {
        read_exif_capture_info(path)
    }
}

pub fn read_exif_capture_info(path: &Path) -> Result<CaptureInfo, MetadataError> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .map_err(|err| match err {
            exif::Error::NotFound(_) => MetadataError::NoExif,
            exif::Error::Io(io) => MetadataError::Io(io),
            other => MetadataError::Corrupt(other.to_string()),
        })?;

    let raw = ascii_field(&exif, Tag::DateTimeOriginal).ok_or(MetadataError::MissingCaptureTime)?;
    let captured =
        parse_date(&raw).ok_or_else(|| MetadataError::InvalidCaptureTime(raw.clone()))?;

    Ok(CaptureInfo {
        captured,
        camera_make: normalize(ascii_field(&exif, Tag::Make)),
        camera_model: normalize(ascii_field(&exif, Tag::Model)),
    })
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Returns the first ASCII component of `tag`, or `None` when the tag is absent.
/// A present-but-empty tag yields `Some("")`.
fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref parts) => {
            let first = parts.first().map(Vec::as_slice).unwrap_or_default();
            Some(
                String::from_utf8_lossy(first)
                    .trim_matches(char::from(0))
                    .to_string(),
            )
        }
        _ => Some(field.display_value().to_string()),
    }
}

pub(crate) fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let normalized = input.trim();

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    candidates
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(normalized, fmt).ok())
}

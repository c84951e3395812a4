//! Fixtures shared by the unit tests.

use crate::metadata::{CaptureInfo, MetadataError, MetadataReader, MetadataWriter};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn dt(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("valid test datetime")
}

/// In-memory metadata keyed by file name, so tests do not depend on tempdir paths.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    by_name: HashMap<String, CaptureInfo>,
}

impl StaticMetadata {
    pub fn with(mut self, name: &str, captured: &str, camera: Option<(&str, &str)>) -> Self {
        let mut info = CaptureInfo::new(dt(captured));
        if let Some((make, model)) = camera {
            info.camera_make = Some(make.to_string());
            info.camera_model = Some(model.to_string());
        }
        self.by_name.insert(name.to_string(), info);
        self
    }
}

impl MetadataReader for StaticMetadata {
    fn read_capture_info(&self, path: &Path) -> Result<CaptureInfo, MetadataError> {
        let name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        self.by_name
            .get(&name)
            .cloned()
            .ok_or(MetadataError::MissingCaptureTime)
    }
}

/// Records every rewrite instead of touching the file; fails for listed names.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub writes: Mutex<Vec<(PathBuf, NaiveDateTime)>>,
    pub failing: Vec<String>,
}

impl MetadataWriter for RecordingWriter {
    fn write_capture_time(&self, path: &Path, time: NaiveDateTime) -> Result<(), MetadataError> {
        let name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(MetadataError::NoWritableTimestamp);
        }
        self.writes
            .lock()
            .expect("writer lock")
            .push((path.to_path_buf(), time));
        Ok(())
    }
}

pub struct ExifFixture {
    pub datetime: Option<&'static str>,
    pub original: Option<&'static str>,
    pub digitized: Option<&'static str>,
    pub make: Option<&'static str>,
    pub model: Option<&'static str>,
}

impl Default for ExifFixture {
    fn default() -> Self {
        Self {
            datetime: Some("2023:01:01 10:00:00"),
            original: Some("2023:01:01 10:00:00"),
            digitized: Some("2023:01:01 10:00:00"),
            make: None,
            model: None,
        }
    }
}

type Entry = (u16, u16, u32, Vec<u8>);

fn ascii(tag: u16, value: &str) -> Entry {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    (tag, 2, bytes.len() as u32, bytes)
}

/// Lays out one little-endian IFD at `start` (relative to the TIFF header) with
/// out-of-line values appended right after it.
fn ifd(start: usize, entries: &[Entry]) -> Vec<u8> {
    let table_len = 2 + entries.len() * 12 + 4;
    let mut out = Vec::new();
    let mut data = Vec::new();
    out.extend((entries.len() as u16).to_le_bytes());
    for (tag, kind, count, value) in entries {
        out.extend(tag.to_le_bytes());
        out.extend(kind.to_le_bytes());
        out.extend(count.to_le_bytes());
        if value.len() <= 4 {
            let mut inline = value.clone();
            inline.resize(4, 0);
            out.extend(inline);
        } else {
            let offset = (start + table_len + data.len()) as u32;
            out.extend(offset.to_le_bytes());
            data.extend(value);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    out.extend(0u32.to_le_bytes());
    out.extend(data);
    out
}

/// Minimal JPEG: SOI, one APP1 Exif segment, EOI.
pub fn jpeg_with_exif(fixture: &ExifFixture) -> Vec<u8> {
    let mut primary = Vec::new();
    if let Some(make) = fixture.make {
        primary.push(ascii(0x010F, make));
    }
    if let Some(model) = fixture.model {
        primary.push(ascii(0x0110, model));
    }
    if let Some(datetime) = fixture.datetime {
        primary.push(ascii(0x0132, datetime));
    }

    let mut exif_entries = Vec::new();
    if let Some(original) = fixture.original {
        exif_entries.push(ascii(0x9003, original));
    }
    if let Some(digitized) = fixture.digitized {
        exif_entries.push(ascii(0x9004, digitized));
    }

    let ifd0_start = 8usize;
    let mut with_pointer = primary.clone();
    with_pointer.push((0x8769, 4, 1, 0u32.to_le_bytes().to_vec()));
    let exif_start = ifd0_start + ifd(ifd0_start, &with_pointer).len();
    with_pointer.pop();
    with_pointer.push((0x8769, 4, 1, (exif_start as u32).to_le_bytes().to_vec()));

    let mut tiff = Vec::new();
    tiff.extend(b"II");
    tiff.extend(42u16.to_le_bytes());
    tiff.extend((ifd0_start as u32).to_le_bytes());
    tiff.extend(ifd(ifd0_start, &with_pointer));
    tiff.extend(ifd(exif_start, &exif_entries));

    let mut segment = b"Exif\0\0".to_vec();
    segment.extend(tiff);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend(((segment.len() + 2) as u16).to_be_bytes());
    jpeg.extend(segment);
    jpeg.extend([0xFF, 0xD9]);
    jpeg
}

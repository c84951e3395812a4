use crate::exif_reader::ExifMetadata;
use crate::metadata::{MetadataError, MetadataWriter};
use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const TAG_DATETIME: u16 = 0x0132;
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;
const TAG_DATETIME_DIGITIZED: u16 = 0x9004;
const TAG_EXIF_IFD_POINTER: u16 = 0x8769;

const ASCII_TYPE: u16 = 2;
/// "YYYY:MM:DD HH:MM:SS" plus the NUL terminator.
const DATETIME_LEN: usize = 20;

impl MetadataWriter for ExifMetadata {
    fn write_capture_time(&self, path: &Path, time: NaiveDateTime) -> Result<(), MetadataError> {
        write_exif_capture_time(path, time)
    }
}

/// Overwrites `DateTime`, `DateTimeOriginal` and `DateTimeDigitized` in place.
///
/// The fields are fixed-length, so the file is patched byte-for-byte rather than
/// re-encoded. Tags missing from the file are not added; at least one of the
/// three must be present.
pub fn write_exif_capture_time(path: &Path, time: NaiveDateTime) -> Result<(), MetadataError> {
    let mut data = fs::read(path)?;
    let formatted = time.format("%Y:%m:%d %H:%M:%S").to_string();
    if formatted.len() != DATETIME_LEN - 1 {
        return Err(MetadataError::InvalidCaptureTime(formatted));
    }

    let patched = patch_jpeg(&mut data, formatted.as_bytes())?;
    if patched == 0 {
        return Err(MetadataError::NoWritableTimestamp);
    }

    replace_file(path, &data)?;
    Ok(())
}

fn patch_jpeg(data: &mut [u8], value: &[u8]) -> Result<usize, MetadataError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(MetadataError::UnsupportedFormat);
    }

    let mut patched = 0usize;
    let mut pos = 2usize;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if marker == 0x00 || marker == 0xFF || (0xD0..=0xD7).contains(&marker) {
            pos += if marker == 0xFF { 1 } else { 2 };
            continue;
        }

        let seg_len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let seg_end = pos + 2 + seg_len;
        if seg_len < 2 || seg_end > data.len() {
            return Err(MetadataError::Corrupt(
                "JPEGセグメント長が不正です".to_string(),
            ));
        }

        let seg_start = pos + 4;
        if marker == 0xE1
            && seg_start + 6 <= seg_end
            && &data[seg_start..seg_start + 6] == b"Exif\0\0"
        {
            patched += patch_tiff(&mut data[seg_start + 6..seg_end], value)?;
        }

        pos = seg_end;
    }

    Ok(patched)
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16_at(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

/// Patches datetime fields inside a TIFF block; offsets are relative to its start.
fn patch_tiff(tiff: &mut [u8], value: &[u8]) -> Result<usize, MetadataError> {
    let order = match tiff.get(0..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        _ => return Err(MetadataError::Corrupt("TIFFのバイト順が不正です".to_string())),
    };
    if order.u16_at(tiff, 2) != Some(42) {
        return Err(MetadataError::Corrupt("TIFFヘッダが不正です".to_string()));
    }
    let ifd0 = order
        .u32_at(tiff, 4)
        .ok_or_else(|| MetadataError::Corrupt("IFD0が見つかりません".to_string()))?;

    let mut patched = 0usize;
    let mut exif_ifd = None;
    for entry in ifd_entries(tiff, order, ifd0 as usize) {
        match entry.tag {
            TAG_DATETIME => patched += patch_entry(tiff, &entry, value),
            TAG_EXIF_IFD_POINTER => exif_ifd = order.u32_at(tiff, entry.value_at),
            _ => {}
        }
    }

    if let Some(offset) = exif_ifd {
        for entry in ifd_entries(tiff, order, offset as usize) {
            if entry.tag == TAG_DATETIME_ORIGINAL || entry.tag == TAG_DATETIME_DIGITIZED {
                patched += patch_entry(tiff, &entry, value);
            }
        }
    }

    Ok(patched)
}

struct IfdEntry {
    tag: u16,
    kind: u16,
    count: u32,
    /// Absolute position of the 4-byte value/offset slot.
    value_at: usize,
    order: ByteOrder,
}

fn ifd_entries(tiff: &[u8], order: ByteOrder, ifd: usize) -> Vec<IfdEntry> {
    let Some(count) = order.u16_at(tiff, ifd) else {
        return Vec::new();
    };
    (0..usize::from(count))
        .map(|i| ifd + 2 + i * 12)
        .take_while(|entry| entry + 12 <= tiff.len())
        .filter_map(|entry| {
            Some(IfdEntry {
                tag: order.u16_at(tiff, entry)?,
                kind: order.u16_at(tiff, entry + 2)?,
                count: order.u32_at(tiff, entry + 4)?,
                value_at: entry + 8,
                order,
            })
        })
        .collect()
}

fn patch_entry(tiff: &mut [u8], entry: &IfdEntry, value: &[u8]) -> usize {
    if entry.kind != ASCII_TYPE || entry.count as usize != DATETIME_LEN {
        return 0;
    }
    let Some(offset) = entry.order.u32_at(tiff, entry.value_at) else {
        return 0;
    };
    let start = offset as usize;
    let Some(slot) = tiff.get_mut(start..start + DATETIME_LEN) else {
        return 0;
    };
    slot[..DATETIME_LEN - 1].copy_from_slice(value);
    slot[DATETIME_LEN - 1] = 0;
    1
}

fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    replace_file_with(path, |file| file.write_all(bytes))
}

/// Writes through a sibling temp file and renames it over `path`. The temp file
/// is removed whenever any step fails.
fn replace_file_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let temp = temp_path_for(path);
    let result = File::create(&temp)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "photo".to_string());
    path.with_file_name(format!(".{}.exif_tmp", file_name))
}

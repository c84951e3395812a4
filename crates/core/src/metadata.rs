use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// What the engine needs to know about a photo at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub captured: NaiveDateTime,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
}

impl CaptureInfo {
    pub fn new(captured: NaiveDateTime) -> Self {
        Self {
            captured,
            camera_make: None,
            camera_model: None,
        }
    }

    pub fn normalized_camera_make(&self) -> Option<&str> {
        normalized(self.camera_make.as_deref())
    }

    pub fn normalized_camera_model(&self) -> Option<&str> {
        normalized(self.camera_model.as_deref())
    }

    /// Make and model joined by a space; `None` when neither is present.
    pub fn camera_label(&self) -> Option<String> {
        match (self.normalized_camera_make(), self.normalized_camera_model()) {
            (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
            (Some(make), None) => Some(make.to_string()),
            (None, Some(model)) => Some(model.to_string()),
            (None, None) => None,
        }
    }
}

fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("ファイルを読めませんでした: {0}")]
    Io(#[from] std::io::Error),
    #[error("EXIF情報がありません")]
    NoExif,
    #[error("EXIFを解析できませんでした: {0}")]
    Corrupt(String),
    #[error("撮影日時 (DateTimeOriginal) がありません")]
    MissingCaptureTime,
    #[error("撮影日時を解釈できませんでした: {0:?}")]
    InvalidCaptureTime(String),
    #[error("書き換え可能なEXIF日時フィールドが見つかりません")]
    NoWritableTimestamp,
    #[error("JPEGファイルではありません")]
    UnsupportedFormat,
}

/// Reads capture time and camera identity from a photo file.
pub trait MetadataReader {
    fn read_capture_info(&self, path: &Path) -> Result<CaptureInfo, MetadataError>;
}

/// Rewrites the capture, original and digitized timestamps of a photo file.
pub trait MetadataWriter {
    fn write_capture_time(&self, path: &Path, time: NaiveDateTime) -> Result<(), MetadataError>;
}

use crate::metadata::CaptureInfo;
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const UNKNOWN_CAMERA: &str = "<Unknown camera>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup key for a record: its group plus its slot in that group's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub group: GroupId,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    path: PathBuf,
    captured: NaiveDateTime,
    time_shift: TimeDelta,
    camera: Option<String>,
    group: GroupId,
}

impl PhotoRecord {
    pub fn new(path: PathBuf, info: &CaptureInfo, group: GroupId) -> Self {
        Self {
            path,
            captured: info.captured,
            time_shift: TimeDelta::zero(),
            camera: info.camera_label(),
            group,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn captured(&self) -> NaiveDateTime {
        self.captured
    }

    pub fn time_shift(&self) -> TimeDelta {
        self.time_shift
    }

    /// Capture time plus the group's correction. Saturates at the chrono range.
    pub fn effective_time(&self) -> NaiveDateTime {
        self.captured
            .checked_add_signed(self.time_shift)
            .unwrap_or(if self.time_shift < TimeDelta::zero() {
                NaiveDateTime::MIN
            } else {
                NaiveDateTime::MAX
            })
    }

    pub fn camera(&self) -> Option<&str> {
        self.camera.as_deref()
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub(crate) fn set_time_shift(&mut self, shift: TimeDelta) {
        self.time_shift = shift;
    }
}

/// Photos added together (one folder or one selection), shifted as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    id: GroupId,
    index: usize,
    records: Vec<PhotoRecord>,
    time_shift: TimeDelta,
}

impl SourceGroup {
    /// `records` must be non-empty; `Session::add_source` guarantees it.
    pub(crate) fn new(id: GroupId, index: usize, mut records: Vec<PhotoRecord>) -> Self {
        debug_assert!(!records.is_empty());
        records.sort_by_key(PhotoRecord::effective_time);
        Self {
            id,
            index,
            records,
            time_shift: TimeDelta::zero(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// 1-based position among the session's groups.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn records(&self) -> &[PhotoRecord] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.path == path)
    }

    pub fn directory(&self) -> String {
        self.records[0]
            .path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    pub fn title(&self) -> String {
        format!("#{} {}", self.index, self.directory())
    }

    pub fn camera(&self) -> &str {
        self.records[0].camera().unwrap_or(UNKNOWN_CAMERA)
    }

    pub fn time_shift(&self) -> TimeDelta {
        self.time_shift
    }

    /// Applies `shift` to every record. Callers must rebuild the merged order.
    pub(crate) fn set_time_shift(&mut self, shift: TimeDelta) {
        self.time_shift = shift;
        for record in &mut self.records {
            record.set_time_shift(shift);
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("時刻補正の形式が不正です (例: +01:30, -1.02:00:00): {0}")]
pub struct TimeShiftError(pub String);

/// Parses `[+|-][D.]HH:MM[:SS]`.
pub fn parse_time_shift(input: &str) -> Result<TimeDelta, TimeShiftError> {
    let err = || TimeShiftError(input.to_string());
    let trimmed = input.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (days, clock) = match body.split_once('.') {
        Some((days, clock)) => (days.parse::<i64>().map_err(|_| err())?, clock),
        None => (0, body),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(err());
    }
    let mut parsed = [0i64; 3];
    for (slot, field) in parsed.iter_mut().zip(&fields) {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        *slot = field.parse().map_err(|_| err())?;
    }
    let [hours, minutes, seconds] = parsed;
    if minutes >= 60 || seconds >= 60 {
        return Err(err());
    }

    let total = days
        .checked_mul(86_400)
        .and_then(|v| v.checked_add(hours.checked_mul(3_600)?))
        .and_then(|v| v.checked_add(minutes * 60 + seconds))
        .ok_or_else(err)?;
    let total = if negative { -total } else { total };
    TimeDelta::try_seconds(total).ok_or_else(err)
}

/// Inverse of [`parse_time_shift`]; the day part is omitted when zero.
pub fn format_time_shift(shift: TimeDelta) -> String {
    let sign = if shift < TimeDelta::zero() { '-' } else { '+' };
    let total = shift.num_seconds().unsigned_abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{sign}{days}.{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    }
}

use crate::collect::{collect_photo_paths, CollectStats};
use crate::metadata::{MetadataError, MetadataReader};
use crate::photo::{GroupId, PhotoRecord, RecordId, SourceGroup};
use chrono::TimeDelta;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("入力の収集に失敗しました: {0:#}")]
    Collect(#[source] anyhow::Error),
    #[error("メタデータを読めませんでした: {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },
    #[error("存在しないグループです: {0}")]
    UnknownGroup(GroupId),
    #[error("存在しない写真です: {0:?}")]
    UnknownRecord(RecordId),
    #[error("移動先の位置が範囲外です: {index} (件数 {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Source groups plus the merged cross-group order used for naming.
///
/// Every structural change (group added or removed, shift changed) rebuilds
/// the merged order chronologically, discarding manual moves.
#[derive(Debug, Default)]
pub struct Session {
    groups: Vec<SourceGroup>,
    order: Vec<RecordId>,
    next_group_id: u32,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one group built from `inputs` (files and/or directories).
    ///
    /// Paths already held by any group are skipped. Returns `Ok(None)` when
    /// nothing new remains. If any file lacks a readable capture time the whole
    /// batch is rejected and the session is left untouched.
    pub fn add_source<R>(
        &mut self,
        inputs: &[PathBuf],
        reader: &R,
    ) -> Result<Option<GroupId>, SessionError>
    where
        R: MetadataReader + ?Sized,
    {
        let mut stats = CollectStats::default();
        let paths = collect_photo_paths(inputs, |path| self.contains(path), &mut stats)
            .map_err(SessionError::Collect)?;
        if paths.is_empty() {
            tracing::debug!(
                scanned = stats.scanned_files,
                duplicates = stats.skipped_duplicate,
                "no new photos in selection"
            );
            return Ok(None);
        }

        let id = GroupId(self.next_group_id + 1);
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let info = reader
                .read_capture_info(&path)
                .map_err(|source| SessionError::Metadata {
                    path: path.clone(),
                    source,
                })?;
            records.push(PhotoRecord::new(path, &info, id));
        }

        self.next_group_id = id.0;
        let group = SourceGroup::new(id, self.groups.len() + 1, records);
        tracing::info!(
            group = %id,
            photos = group.count(),
            skipped_duplicates = stats.skipped_duplicate,
            camera = group.camera(),
            "source group added"
        );
        self.groups.push(group);
        self.rebuild_order();
        Ok(Some(id))
    }

    pub fn remove_source(&mut self, id: GroupId) -> Result<SourceGroup, SessionError> {
        let position = self
            .groups
            .iter()
            .position(|g| g.id() == id)
            .ok_or(SessionError::UnknownGroup(id))?;
        let removed = self.groups.remove(position);
        for (i, group) in self.groups.iter_mut().enumerate() {
            group.set_index(i + 1);
        }
        tracing::info!(group = %id, photos = removed.count(), "source group removed");
        self.rebuild_order();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.rebuild_order();
    }

    /// Sets a group's time correction and re-sorts the merged order.
    pub fn set_time_shift(&mut self, id: GroupId, shift: TimeDelta) -> Result<(), SessionError> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id() == id)
            .ok_or(SessionError::UnknownGroup(id))?;
        group.set_time_shift(shift);
        tracing::debug!(group = %id, shift_seconds = shift.num_seconds(), "time shift applied");
        self.rebuild_order();
        Ok(())
    }

    /// Moves `record` to `new_index` in the merged order, keeping everything
    /// else in relative order. Lasts until the next structural change.
    pub fn move_to(&mut self, record: RecordId, new_index: usize) -> Result<(), SessionError> {
        let current = self
            .order
            .iter()
            .position(|id| *id == record)
            .ok_or(SessionError::UnknownRecord(record))?;
        if new_index >= self.order.len() {
            return Err(SessionError::IndexOutOfRange {
                index: new_index,
                len: self.order.len(),
            });
        }
        let id = self.order.remove(current);
        self.order.insert(new_index, id);
        Ok(())
    }

    pub fn groups(&self) -> &[SourceGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&SourceGroup> {
        self.groups.iter().find(|g| g.id() == id)
    }

    /// Group by 1-based display index.
    pub fn group_at(&self, index: usize) -> Option<&SourceGroup> {
        index.checked_sub(1).and_then(|i| self.groups.get(i))
    }

    pub fn record(&self, id: RecordId) -> Option<&PhotoRecord> {
        self.group(id.group)?.records().get(id.slot)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.groups.iter().any(|g| g.contains(path))
    }

    pub fn find(&self, path: &Path) -> Option<RecordId> {
        self.groups.iter().find_map(|g| {
            g.records()
                .iter()
                .position(|r| r.path() == path)
                .map(|slot| RecordId {
                    group: g.id(),
                    slot,
                })
        })
    }

    pub fn order_ids(&self) -> &[RecordId] {
        &self.order
    }

    /// Records in merged order.
    pub fn order(&self) -> impl Iterator<Item = (RecordId, &PhotoRecord)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.record(*id).map(|record| (*id, record)))
    }

    pub fn position(&self, record: RecordId) -> Option<usize> {
        self.order.iter().position(|id| *id == record)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn rebuild_order(&mut self) {
        let mut order: Vec<(RecordId, chrono::NaiveDateTime)> = self
            .groups
            .iter()
            .flat_map(|g| {
                g.records().iter().enumerate().map(move |(slot, r)| {
                    (
                        RecordId {
                            group: g.id(),
                            slot,
                        },
                        r.effective_time(),
                    )
                })
            })
            .collect();
        order.sort_by_key(|(_, time)| *time);
        self.order = order.into_iter().map(|(id, _)| id).collect();
    }
}

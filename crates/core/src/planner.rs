use crate::photo::RecordId;
use crate::session::Session;
use crate::template::{parse_template, render_name, TemplateError};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub template: String,
    pub target_dir: Option<PathBuf>,
    pub start_counter: Option<u32>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            template: crate::DEFAULT_TEMPLATE.to_string(),
            target_dir: None,
            start_counter: None,
        }
    }
}

/// Conflict signal for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// No name collision, but there is no target directory to check against.
    Unknown,
    Clear,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
    pub record: RecordId,
    pub source: PathBuf,
    pub old_name: String,
    /// Generated name; `\` and `/` separate sub-folders of the target.
    pub new_name: String,
    pub effective_time: NaiveDateTime,
    /// Timestamp to write into the copy; set only when the photo was shifted.
    pub rewrite_time: Option<NaiveDateTime>,
    pub conflict: Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePlan {
    pub target_dir: Option<PathBuf>,
    pub entries: Vec<RenameEntry>,
}

impl RenamePlan {
    /// True when any entry is not definitively clear, including when no
    /// target directory has been chosen.
    pub fn has_conflict(&self) -> bool {
        self.entries.iter().any(|e| e.conflict != Conflict::Clear)
    }

    pub fn conflict_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.conflict == Conflict::Conflict)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Projects the session's merged order (as currently arranged) into names.
///
/// Side-effect free: the only outside input is whether generated names already
/// exist under the target directory.
pub fn generate_plan(session: &Session, options: &PlanOptions) -> Result<RenamePlan, TemplateError> {
    let parts = parse_template(&options.template)?;
    let start = u64::from(options.start_counter.unwrap_or(1));

    let mut day_counters = HashMap::<NaiveDate, u64>::new();
    let mut global_counter = start;
    let mut first_by_name = HashMap::<String, usize>::new();
    let mut entries = Vec::<RenameEntry>::with_capacity(session.len());

    for (record_id, record) in session.order() {
        let time = record.effective_time();
        let day_counter = day_counters.entry(time.date()).or_insert(start);
        let new_name = render_name(
            &parts,
            time,
            counter_value(*day_counter)?,
            counter_value(global_counter)?,
        )?;
        *day_counter += 1;
        global_counter += 1;

        let mut conflict = Conflict::Unknown;
        let index = entries.len();
        if let Some(&first) = first_by_name.get(&new_name) {
            entries[first].conflict = Conflict::Conflict;
            conflict = Conflict::Conflict;
        } else {
            first_by_name.insert(new_name.clone(), index);
            if let Some(target_dir) = options.target_dir.as_deref() {
                conflict = if target_path(target_dir, &new_name).exists() {
                    Conflict::Conflict
                } else {
                    Conflict::Clear
                };
            }
        }

        entries.push(RenameEntry {
            record: record_id,
            source: record.path().to_path_buf(),
            old_name: record.file_name(),
            new_name,
            effective_time: time,
            rewrite_time: (record.time_shift() != TimeDelta::zero()).then_some(time),
            conflict,
        });
    }

    Ok(RenamePlan {
        target_dir: options.target_dir.clone(),
        entries,
    })
}

fn counter_value(counter: u64) -> Result<u32, TemplateError> {
    u32::try_from(counter).map_err(|_| TemplateError::CounterOverflow)
}

/// Joins a generated name onto the target directory, splitting sub-folders.
pub fn target_path(target_dir: &Path, new_name: &str) -> PathBuf {
    let mut path = target_dir.to_path_buf();
    for segment in new_name.split(['\\', '/']) {
        path.push(segment);
    }
    path
}

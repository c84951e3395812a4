use crate::metadata::MetadataWriter;
use crate::planner::{target_path, RenamePlan};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Cooperative cancellation request shared with a running execution.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total: usize,
    pub completed: usize,
    pub cancelled: bool,
    /// Copies whose timestamps could not be rewritten; the copies are kept.
    pub metadata_failures: Vec<MetadataFailure>,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("出力先フォルダが指定されていません")]
    MissingTargetDir,
    #[error("競合が解消されていないエントリがあります: {0}件")]
    PlanHasConflicts(usize),
    #[error("別の処理が実行中です")]
    AlreadyRunning,
    #[error("出力先フォルダを作成できませんでした: {path}")]
    CreateDir {
        path: PathBuf,
        completed: usize,
        #[source]
        source: io::Error,
    },
    #[error("出力先に同名ファイルが既に存在します: {path}")]
    TargetExists { path: PathBuf, completed: usize },
    #[error("コピーに失敗しました: {from} -> {to}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        completed: usize,
        #[source]
        source: io::Error,
    },
    #[error("実行スレッドを起動できませんでした")]
    Spawn(#[source] io::Error),
    #[error("実行スレッドが異常終了しました")]
    WorkerPanicked,
}

impl ExecuteError {
    /// Entries finished before the failure; their copies remain on disk.
    pub fn completed(&self) -> usize {
        match self {
            ExecuteError::CreateDir { completed, .. }
            | ExecuteError::TargetExists { completed, .. }
            | ExecuteError::Copy { completed, .. } => *completed,
            _ => 0,
        }
    }
}

/// Copies every entry of `plan` into its target directory, in plan order.
///
/// `cancel` is checked before each entry. A copy never overwrites an existing
/// file; the first copy failure aborts the run without rolling back earlier
/// copies. Shifted photos get their timestamps rewritten on the copy, and a
/// failed rewrite is reported without undoing the copy. The plan is consumed:
/// the target directory has changed, so a fresh plan is needed afterwards.
pub fn execute_plan<W, F>(
    plan: RenamePlan,
    writer: &W,
    cancel: &CancelFlag,
    mut progress: F,
) -> Result<ExecutionReport, ExecuteError>
where
    W: MetadataWriter + ?Sized,
    F: FnMut(&Progress),
{
    let target_dir = plan.target_dir.clone().ok_or(ExecuteError::MissingTargetDir)?;
    if plan.has_conflict() {
        let blocking = plan
            .entries
            .iter()
            .filter(|e| e.conflict != crate::planner::Conflict::Clear)
            .count();
        return Err(ExecuteError::PlanHasConflicts(blocking));
    }

    let total = plan.entries.len();
    let mut report = ExecutionReport {
        total,
        completed: 0,
        cancelled: false,
        metadata_failures: Vec::new(),
    };
    tracing::info!(entries = total, target = %target_dir.display(), "execution started");

    for entry in plan.entries {
        if cancel.is_cancelled() {
            report.cancelled = true;
            tracing::warn!(
                completed = report.completed,
                total,
                "execution cancelled"
            );
            break;
        }

        let destination = target_path(&target_dir, &entry.new_name);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| ExecuteError::CreateDir {
                path: parent.to_path_buf(),
                completed: report.completed,
                source,
            })?;
        }

        copy_without_overwrite(&entry.source, &destination).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                ExecuteError::TargetExists {
                    path: destination.clone(),
                    completed: report.completed,
                }
            } else {
                ExecuteError::Copy {
                    from: entry.source.clone(),
                    to: destination.clone(),
                    completed: report.completed,
                    source,
                }
            }
        })?;
        tracing::debug!(
            from = %entry.source.display(),
            to = %destination.display(),
            "copied"
        );

        if let Some(time) = entry.rewrite_time {
            if let Err(err) = writer.write_capture_time(&destination, time) {
                tracing::warn!(
                    path = %destination.display(),
                    error = %err,
                    "copied but timestamp rewrite failed"
                );
                report.metadata_failures.push(MetadataFailure {
                    path: destination.clone(),
                    message: err.to_string(),
                });
            }
        }

        report.completed += 1;
        progress(&Progress {
            completed: report.completed,
            total,
            current: destination,
        });
    }

    if !report.cancelled {
        tracing::info!(
            completed = report.completed,
            metadata_failures = report.metadata_failures.len(),
            "execution finished"
        );
    }
    Ok(report)
}

/// Streams `from` into a newly created `to`; fails with `AlreadyExists` rather
/// than replacing a file that appeared after planning.
fn copy_without_overwrite(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = File::open(from)?;
    let mut destination = OpenOptions::new().write(true).create_new(true).open(to)?;
    let copied = io::copy(&mut source, &mut destination).and_then(|_| destination.sync_all());
    if let Err(err) = copied {
        drop(destination);
        let _ = fs::remove_file(to);
        return Err(err);
    }
    Ok(())
}

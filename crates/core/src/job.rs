use crate::execute::{execute_plan, CancelFlag, ExecuteError, ExecutionReport};
use crate::metadata::MetadataWriter;
use crate::planner::RenamePlan;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type WorkerResult = Result<ExecutionReport, ExecuteError>;

/// Runs at most one execution at a time on a background thread.
///
/// The worker owns its plan, so later changes to the session cannot affect a
/// run in progress.
pub struct Executor {
    writer: Arc<dyn MetadataWriter + Send + Sync>,
    cancel: CancelFlag,
    progress: Arc<AtomicUsize>,
    worker: Option<JoinHandle<WorkerResult>>,
}

impl Executor {
    pub fn new(writer: Arc<dyn MetadataWriter + Send + Sync>) -> Self {
        Self {
            writer,
            cancel: CancelFlag::new(),
            progress: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }
    }

    /// Starts executing `plan`; rejected while a previous run is still going.
    ///
    /// The result of a finished run that was never collected with
    /// [`Executor::wait`] is discarded.
    pub fn start(&mut self, plan: RenamePlan) -> Result<(), ExecuteError> {
        if self.is_running() {
            return Err(ExecuteError::AlreadyRunning);
        }
        if let Some(previous) = self.worker.take() {
            if let Ok(Err(err)) = previous.join() {
                tracing::debug!(error = %err, "discarding uncollected execution result");
            }
        }

        self.cancel.reset();
        self.progress.store(0, Ordering::SeqCst);

        let writer = Arc::clone(&self.writer);
        let cancel = self.cancel.clone();
        let progress = Arc::clone(&self.progress);
        let handle = thread::Builder::new()
            .name("photo-sequencer-execute".to_string())
            .spawn(move || {
                let result = execute_plan(plan, writer.as_ref(), &cancel, |p| {
                    progress.store(p.completed, Ordering::SeqCst);
                });
                progress.store(0, Ordering::SeqCst);
                result
            })
            .map_err(ExecuteError::Spawn)?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Requests cancellation; the worker stops before its next entry.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle that cancels runs of this executor from another thread, such as
    /// a signal handler.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Entries completed by the current run; back to 0 once it ends.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Blocks until the current run ends and returns its outcome, or `None`
    /// when nothing was started.
    pub fn wait(&mut self) -> Option<WorkerResult> {
        let handle = self.worker.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            self.progress.store(0, Ordering::SeqCst);
            Err(ExecuteError::WorkerPanicked)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataError;
    use crate::planner::{generate_plan, PlanOptions};
    use crate::session::Session;
    use crate::testing::{RecordingWriter, StaticMetadata};
    use chrono::{NaiveDateTime, TimeDelta};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Blocks each rewrite until the test releases it.
    struct GateWriter {
        entered: Mutex<Sender<()>>,
        release: Mutex<Receiver<()>>,
    }

    impl MetadataWriter for GateWriter {
        fn write_capture_time(&self, _: &Path, _: NaiveDateTime) -> Result<(), MetadataError> {
            let _ = self.entered.lock().expect("lock").send(());
            let _ = self.release.lock().expect("lock").recv();
            Ok(())
        }
    }

    /// Panics while rewriting the copy named `panic_on`.
    struct PanickingWriter {
        panic_on: &'static str,
    }

    impl MetadataWriter for PanickingWriter {
        fn write_capture_time(&self, path: &Path, _: NaiveDateTime) -> Result<(), MetadataError> {
            if path.ends_with(self.panic_on) {
                panic!("rewrite blew up");
            }
            Ok(())
        }
    }

    fn shifted_plan(count: usize) -> (TempDir, PathBuf, RenamePlan) {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("card");
        fs::create_dir_all(&dir).expect("mkdir");
        let mut reader = StaticMetadata::default();
        for i in 0..count {
            let name = format!("P{i}.jpg");
            fs::write(dir.join(&name), b"jpeg").expect("write photo");
            reader = reader.with(&name, &format!("2023-03-04 05:06:{i:02}"), None);
        }
        let mut session = Session::new();
        let group = session
            .add_source(&[dir], &reader)
            .expect("add")
            .expect("group");
        session
            .set_time_shift(group, TimeDelta::seconds(30))
            .expect("shift");
        let target = temp.path().join("out");
        let plan = generate_plan(
            &session,
            &PlanOptions {
                template: "N".to_string(),
                target_dir: Some(target.clone()),
                start_counter: None,
            },
        )
        .expect("plan");
        (temp, target, plan)
    }

    #[test]
    fn runs_in_background_and_resets_progress() {
        let (_temp, target, plan) = shifted_plan(3);
        let writer = Arc::new(RecordingWriter::default());
        let mut executor = Executor::new(writer.clone());

        executor.start(plan).expect("start");
        let report = executor.wait().expect("started").expect("success");

        assert_eq!(report.completed, 3);
        assert_eq!(executor.progress(), 0);
        assert!(!executor.is_running());
        assert_eq!(writer.writes.lock().expect("lock").len(), 3);
        assert!(target.join("003.jpg").exists());
        assert!(executor.wait().is_none());
    }

    #[test]
    fn second_start_is_rejected_while_running_and_cancel_stops_between_entries() {
        let (_temp, target, plan) = shifted_plan(3);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let writer = Arc::new(GateWriter {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let mut executor = Executor::new(writer);

        executor.start(plan.clone()).expect("start");
        entered_rx.recv().expect("worker reached first rewrite");
        assert!(executor.is_running());
        assert!(matches!(
            executor.start(plan),
            Err(ExecuteError::AlreadyRunning)
        ));

        executor.cancel();
        release_tx.send(()).expect("release");
        let report = executor.wait().expect("started").expect("cancelled run");

        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(executor.progress(), 0);
        assert!(target.join("001.jpg").exists());
        assert!(!target.join("002.jpg").exists());
    }

    #[test]
    fn cancel_flag_handle_stops_the_run_from_another_thread() {
        let (_temp, target, plan) = shifted_plan(3);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut executor = Executor::new(Arc::new(GateWriter {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }));
        let handle = executor.cancel_flag();

        executor.start(plan).expect("start");
        entered_rx.recv().expect("worker reached first rewrite");
        std::thread::spawn(move || handle.cancel())
            .join()
            .expect("cancel thread");
        release_tx.send(()).expect("release");
        let report = executor.wait().expect("started").expect("cancelled run");

        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert!(!target.join("002.jpg").exists());
    }

    #[test]
    fn worker_panic_is_reported_and_progress_resets() {
        let (_temp, target, plan) = shifted_plan(2);
        let mut executor = Executor::new(Arc::new(PanickingWriter {
            panic_on: "002.jpg",
        }));

        executor.start(plan).expect("start");
        while executor.is_running() {
            std::thread::yield_now();
        }
        assert_eq!(executor.progress(), 1);

        let err = executor.wait().expect("started").expect_err("panicked");
        assert!(matches!(err, ExecuteError::WorkerPanicked));
        assert_eq!(executor.progress(), 0);
        assert!(target.join("001.jpg").exists());
    }

    #[test]
    fn failures_are_returned_from_wait() {
        let (_temp, _target, mut plan) = shifted_plan(1);
        plan.target_dir = None;
        let mut executor = Executor::new(Arc::new(RecordingWriter::default()));
        executor.start(plan).expect("start");
        let err = executor.wait().expect("started").expect_err("no target");
        assert!(matches!(err, ExecuteError::MissingTargetDir));
    }
}

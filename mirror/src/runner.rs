//! Run orchestration: validation, the tree walk and event delivery on a
//! dedicated background task

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::error::{MirrorError, Result};
use crate::progress::{ProgressChannel, ProgressEvent, ProgressReporter};
use crate::stats::SyncStats;
use crate::sync_engine::{SyncOptions, TreeSynchronizer};
use crate::validator::Validator;

/// Parameters of one mirror run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Directory mirrored from
    pub source_path: PathBuf,
    /// Directory mirrored onto; must already exist
    pub target_path: PathBuf,
    /// Require the marker files on both sides
    pub validate: bool,
    /// Offer per-file status updates
    pub report_detail: bool,
}

impl SyncRequest {
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            validate: false,
            report_detail: false,
        }
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn report_detail(mut self, report_detail: bool) -> Self {
        self.report_detail = report_detail;
        self
    }
}

/// Host-side entry point: holds the request, starts runs on a background
/// task and relays cancellation.
///
/// Only one run can be active at a time.
pub struct MirrorRunner {
    options: SyncOptions,
    request: Option<SyncRequest>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl MirrorRunner {
    /// Create a runner with engine options
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            request: None,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store the request for the next run
    pub fn setup(&mut self, request: SyncRequest) -> Result<()> {
        if self.is_running() {
            return Err(MirrorError::AlreadyRunning);
        }
        self.request = Some(request);
        Ok(())
    }

    /// The request the next run will use
    pub fn request(&self) -> Option<&SyncRequest> {
        self.request.as_ref()
    }

    /// Whether a run is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the active run to stop at its next poll point
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested for the current (or last) run.
    ///
    /// This is how a consumer tells a cancelled run from a completed one once
    /// the `Finished` event has arrived.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token of the current run, for cancelling from another task
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a run of the stored request on the tokio runtime.
    ///
    /// Fails with [`MirrorError::AlreadyRunning`] while a previous run is
    /// active and with [`MirrorError::NotConfigured`] before `setup`.
    pub fn start(&mut self) -> Result<MirrorRun> {
        let request = self.request.clone().ok_or(MirrorError::NotConfigured)?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MirrorError::AlreadyRunning);
        }

        self.cancel = CancellationToken::new();
        let (reporter, events) =
            ProgressChannel::with_options(self.options.report_interval, self.cancel.clone());

        let mut options = self.options.clone();
        options.report_detail = request.report_detail;

        let guard = RunningGuard(self.running.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            execute(request, options, reporter).await
        });

        Ok(MirrorRun { events, handle })
    }
}

/// Handle on a started run
pub struct MirrorRun {
    events: ProgressChannel,
    handle: JoinHandle<Result<SyncStats>>,
}

impl MirrorRun {
    /// Progress events of this run
    pub fn events(&mut self) -> &mut ProgressChannel {
        &mut self.events
    }

    /// Next progress event; `None` once the run has ended and every event
    /// has been consumed
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end.
    ///
    /// Yields the final counters for completed and cancelled runs, and the
    /// validation error for runs rejected before the walk began.
    pub async fn wait(self) -> Result<SyncStats> {
        self.handle
            .await
            .map_err(|e| MirrorError::Worker(e.to_string()))?
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Validate, walk and report one request. Runs inline on the calling task.
///
/// On a validation failure a single error event is sent and no `Finished`
/// event follows.
pub async fn execute(
    request: SyncRequest,
    options: SyncOptions,
    mut reporter: ProgressReporter,
) -> Result<SyncStats> {
    let span = info_span!(
        "mirror_run",
        run_id = %reporter.run_id(),
        source = %request.source_path.display(),
        target = %request.target_path.display(),
    );

    async move {
        info!(validate = request.validate, report_detail = options.report_detail, "Starting mirror run");

        if let Err(e) = Validator::validate(
            &request.source_path,
            &request.target_path,
            request.validate,
            &reporter,
        )
        .await
        {
            error!("Mirror run rejected: {}", e);
            reporter.error(e.to_string());
            return Err(e);
        }

        let mut stats = SyncStats::new();
        reporter.restart_clock();

        let engine = TreeSynchronizer::new(options);
        let completed = engine
            .synchronize(&request.source_path, &request.target_path, &mut stats, &mut reporter)
            .await;

        stats.log_summary(!completed);
        reporter.finished(&stats);
        Ok(stats)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::MarkerFiles;
    use std::time::Duration;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let target = temp_dir.path().join("target");
        std::fs::create_dir(&source).unwrap();
        std::fs::create_dir(&target).unwrap();
        (temp_dir, source, target)
    }

    async fn collect(run: &mut MirrorRun) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_delivers_single_finished_event() {
        let (_temp_dir, source, target) = dirs();
        std::fs::write(source.join("a.txt"), b"hello").unwrap();

        let mut runner = MirrorRunner::new(SyncOptions::default());
        runner.setup(SyncRequest::new(&source, &target)).unwrap();
        let mut run = runner.start().unwrap();

        let events = collect(&mut run).await;
        let stats = run.wait().await.unwrap();

        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Finished { stats } => Some(*stats),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![stats]);
        assert!(matches!(events.last(), Some(ProgressEvent::Finished { .. })));
        assert_eq!(stats.new_files, 1);
        assert!(!runner.is_cancelled());
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_finished_event() {
        let (_temp_dir, source, target) = dirs();

        let mut runner = MirrorRunner::new(SyncOptions::default());
        runner
            .setup(SyncRequest::new(&source, &target).validate(true))
            .unwrap();
        let mut run = runner.start().unwrap();

        let events = collect(&mut run).await;
        let err = run.wait().await.unwrap_err();

        assert!(matches!(err, MirrorError::SourceNotMarked(_)));
        assert_eq!(
            events,
            vec![
                ProgressEvent::Info {
                    message: MarkerFiles::source_marker(&source).display().to_string()
                },
                ProgressEvent::Error { message: err.to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_fatal_before_mutation() {
        let (temp_dir, source, _target) = dirs();
        std::fs::write(source.join("a.txt"), b"a").unwrap();
        let absent = temp_dir.path().join("absent");

        let mut runner = MirrorRunner::new(SyncOptions::default());
        runner.setup(SyncRequest::new(&source, &absent)).unwrap();
        let run = runner.start().unwrap();

        assert!(matches!(run.wait().await, Err(MirrorError::TargetMissing(_))));
        assert!(!absent.exists());
    }

    #[tokio::test]
    async fn test_start_requires_setup() {
        let mut runner = MirrorRunner::new(SyncOptions::default());
        assert!(matches!(runner.start(), Err(MirrorError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let (_temp_dir, source, target) = dirs();
        let mut runner = MirrorRunner::new(SyncOptions::default());
        runner.setup(SyncRequest::new(&source, &target)).unwrap();

        // Hold the flag as an active run would.
        runner.running.store(true, Ordering::SeqCst);
        assert!(matches!(runner.start(), Err(MirrorError::AlreadyRunning)));
        assert!(matches!(
            runner.setup(SyncRequest::new(&source, &target)),
            Err(MirrorError::AlreadyRunning)
        ));

        runner.running.store(false, Ordering::SeqCst);
        let run = runner.start().unwrap();
        run.wait().await.unwrap();
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_cancel_is_visible_after_finish() {
        let (_temp_dir, source, target) = dirs();
        for i in 0..5 {
            let dir = source.join(format!("d{}", i));
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("f.txt"), b"f").unwrap();
        }

        let options = SyncOptions {
            report_interval: Duration::ZERO,
            ..Default::default()
        };
        let mut runner = MirrorRunner::new(options);
        runner.setup(SyncRequest::new(&source, &target)).unwrap();
        let mut run = runner.start().unwrap();
        // The single-threaded test runtime has not polled the task yet.
        runner.request_cancel();

        let events = collect(&mut run).await;
        let stats = run.wait().await.unwrap();

        assert!(runner.is_cancelled());
        assert!(matches!(events.last(), Some(ProgressEvent::Finished { .. })));
        assert_eq!(stats, SyncStats::default());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}

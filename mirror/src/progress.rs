//! Progress reporting for mirror runs
//!
//! The worker side holds a [`ProgressReporter`]; whoever observes the run
//! holds the matching [`ProgressChannel`]. Status updates are throttled to
//! one per reporting interval, and every call to [`ProgressReporter::report`]
//! doubles as the cancellation poll for the tree walk.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MirrorError, Result};
use crate::stats::SyncStats;

/// Default minimum spacing between two status updates
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Events delivered to the observer of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Informational message (validation paths and the like)
    Info { message: String },
    /// Error message; fatal validation failures and non-fatal OS failures
    Error { message: String },
    /// Throttled status update with a point-in-time copy of the counters
    Status { message: String, stats: SyncStats },
    /// Terminal event carrying the final counters
    Finished { stats: SyncStats },
}

/// Receiving end of a run's progress events
pub struct ProgressChannel {
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressChannel {
    /// Create a reporter/channel pair with the default interval and a fresh
    /// cancellation token
    pub fn new() -> (ProgressReporter, Self) {
        Self::with_options(DEFAULT_REPORT_INTERVAL, CancellationToken::new())
    }

    /// Create a reporter/channel pair sharing `cancel` with the caller
    pub fn with_options(interval: Duration, cancel: CancellationToken) -> (ProgressReporter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(sender, interval, cancel);
        (reporter, Self { receiver })
    }

    /// Receive the next progress event; `None` once the run has dropped its
    /// reporter
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Try to receive a progress event without blocking
    pub fn try_recv(&mut self) -> Result<ProgressEvent> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => MirrorError::Progress("No progress events available".to_string()),
            mpsc::error::TryRecvError::Disconnected => MirrorError::Progress("Progress channel disconnected".to_string()),
        })
    }

    /// Drain every event currently buffered
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the channel
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Time-throttled progress sink owned by a single run
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    run_id: Uuid,
    interval: Duration,
    last_emission: Instant,
    cancel: CancellationToken,
}

impl ProgressReporter {
    fn new(sender: mpsc::UnboundedSender<ProgressEvent>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            sender,
            run_id: Uuid::new_v4(),
            interval,
            last_emission: Instant::now(),
            cancel,
        }
    }

    /// Identifier of the run this reporter belongs to
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Minimum spacing between status updates
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token observed by [`report`](Self::report)
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Restart the throttle clock; called when a run begins
    pub fn restart_clock(&mut self) {
        self.last_emission = Instant::now();
    }

    /// Whether cancellation has been requested for this run
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Offer a status update.
    ///
    /// The update is emitted only when `force_detail` is set and at least one
    /// interval has passed since the previous emission. Returns `false` when
    /// cancellation has been requested, in which case the caller must stop
    /// descending and unwind.
    pub fn report(&mut self, message: impl Into<String>, force_detail: bool, stats: &SyncStats) -> bool {
        if force_detail && self.last_emission.elapsed() >= self.interval {
            self.last_emission = Instant::now();
            self.emit(ProgressEvent::Status {
                message: message.into(),
                stats: *stats,
            });
        }
        !self.cancel.is_cancelled()
    }

    /// Send an informational message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Info {
            message: message.into(),
        });
    }

    /// Send an error message
    pub fn error(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Error {
            message: message.into(),
        });
    }

    /// Send the terminal event with the final counters
    pub fn finished(&self, stats: &SyncStats) {
        self.emit(ProgressEvent::Finished { stats: *stats });
    }

    fn emit(&self, event: ProgressEvent) {
        // A vanished observer must not stop the walk.
        if self.send(event).is_err() {
            debug!(run_id = %self.run_id, "Progress channel closed, event dropped");
        }
    }

    /// Send a progress event
    fn send(&self, event: ProgressEvent) -> Result<()> {
        self.sender.send(event).map_err(|_| {
            MirrorError::Progress("Progress channel disconnected".to_string())
        })
    }
}

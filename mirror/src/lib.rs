//! Mirror Engine Library
//!
//! One-way incremental mirroring of a source directory tree onto a target:
//! - Marker-file validation of the source/target pair
//! - Depth-first synchronization (remove stale, copy new, overwrite older)
//! - Running statistics over the whole walk
//! - Throttled progress reporting with cooperative cancellation
//! - Background run orchestration

pub mod error;
pub mod preservation;
pub mod progress;
pub mod runner;
pub mod scanner;
pub mod stats;
pub mod sync_engine;
pub mod validator;

// Re-export main types and functions
pub use error::{MirrorError, Result};
pub use preservation::{AttributePreserver, PreservationOptions};
pub use progress::{ProgressChannel, ProgressEvent, ProgressReporter, DEFAULT_REPORT_INTERVAL};
pub use runner::{MirrorRun, MirrorRunner, SyncRequest};
pub use scanner::{list_directory, DirectoryEntry, DirectoryListing};
pub use stats::{format_bytes, SyncStats};
pub use sync_engine::{SyncOptions, TreeSynchronizer};
pub use validator::{MarkerFiles, Validator};

use tokio_util::sync::CancellationToken;

/// Mirror `request` on the calling task and return the final counters.
///
/// Progress events are discarded; use [`MirrorRunner`] to observe or cancel
/// a run.
pub async fn mirror_directories(request: SyncRequest, mut options: SyncOptions) -> Result<SyncStats> {
    options.report_detail = request.report_detail;
    let (reporter, mut channel) = ProgressChannel::with_options(options.report_interval, CancellationToken::new());
    channel.close();
    runner::execute(request, options, reporter).await
}

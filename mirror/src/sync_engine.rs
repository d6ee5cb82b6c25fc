//! Recursive one-way tree synchronization

use std::path::Path;
use std::time::Duration;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MirrorError, Result};
use crate::preservation::{clear_restrictive_permissions, AttributePreserver, PreservationOptions};
use crate::progress::{ProgressReporter, DEFAULT_REPORT_INTERVAL};
use crate::scanner::{list_directory, DirectoryEntry, DirectoryListing};
use crate::stats::SyncStats;

/// Options for mirror runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Offer a status update for every copied, overwritten or removed file
    pub report_detail: bool,
    /// Minimum spacing between two status updates
    pub report_interval: Duration,
    /// Attribute preservation options
    pub preservation_options: PreservationOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            report_detail: false,
            report_interval: DEFAULT_REPORT_INTERVAL,
            preservation_options: PreservationOptions::default(),
        }
    }
}

/// The recursive mirror engine.
///
/// For every directory pair the engine runs four passes in a fixed order:
/// stale target files are removed, source files are copied or overwritten,
/// stale target subdirectories are removed, and finally source
/// subdirectories are created where missing and descended into, depth first.
/// Removals always precede creations within one directory.
///
/// Counters reflect verified operations: a removal that leaves the entry in
/// place, or a copy that fails, is reported as an error and not counted.
pub struct TreeSynchronizer {
    options: SyncOptions,
    attribute_preserver: AttributePreserver,
}

impl TreeSynchronizer {
    /// Create a new synchronizer with options
    pub fn new(options: SyncOptions) -> Self {
        let attribute_preserver = AttributePreserver::new(options.preservation_options.clone());
        Self {
            options,
            attribute_preserver,
        }
    }

    /// Get synchronizer options
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Mirror `source` onto `target`.
    ///
    /// Returns `false` as soon as cancellation is observed; the walk then
    /// unwinds without touching anything else. Non-fatal failures are sent to
    /// `reporter` as error messages and the walk carries on.
    pub async fn synchronize(
        &self,
        source: &Path,
        target: &Path,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> bool {
        self.sync_directory(source, target, stats, reporter).await
    }

    fn sync_directory<'a>(
        &'a self,
        source: &'a Path,
        target: &'a Path,
        stats: &'a mut SyncStats,
        reporter: &'a mut ProgressReporter,
    ) -> BoxFuture<'a, bool> {
        async move {
            if reporter.is_cancelled() {
                return false;
            }

            stats.record_directory_visited();
            if !reporter.report(source.display().to_string(), true, stats) {
                return false;
            }

            let Some((source_listing, target_listing)) = list_pair(source, target, reporter).await else {
                return true;
            };
            if !self
                .sync_files(source, target, &source_listing, &target_listing, stats, reporter)
                .await
            {
                return false;
            }

            self.sync_subdirectories(source, target, stats, reporter).await
        }
        .boxed()
    }

    /// Passes 1 and 2: remove stale target files, then copy or overwrite
    async fn sync_files(
        &self,
        source: &Path,
        target: &Path,
        source_listing: &DirectoryListing,
        target_listing: &DirectoryListing,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> bool {
        let detail = self.options.report_detail;

        for entry in target_listing.files.iter().filter(|e| !e.is_marker()) {
            let counterpart = source.join(&entry.name);
            match DirectoryEntry::stat(&counterpart).await {
                Ok(Some(found)) if found.is_file() => continue,
                Ok(_) => {}
                Err(e) => {
                    report_failure(reporter, e);
                    continue;
                }
            }

            match remove_file(&entry.path).await {
                Ok(()) => stats.record_removed_file(entry.size),
                Err(e) => report_failure(reporter, e),
            }
            if !reporter.report(format!("remove file {}", entry.path.display()), detail, stats) {
                return false;
            }
        }

        for entry in source_listing.files.iter().filter(|e| !e.is_marker()) {
            let destination = target.join(&entry.name);
            let existing = match DirectoryEntry::stat(&destination).await {
                Ok(existing) => existing,
                Err(e) => {
                    report_failure(reporter, e);
                    continue;
                }
            };

            let message = match existing {
                Some(found) if found.is_dir => {
                    // A directory is in the way of a source file.
                    match remove_directory(&destination).await {
                        Ok(()) => stats.record_removed_directory(),
                        Err(e) => {
                            report_failure(reporter, e);
                            continue;
                        }
                    }
                    if !reporter.report(format!("remove directory {}", destination.display()), true, stats) {
                        return false;
                    }
                    match self.copy_file(&entry.path, &destination).await {
                        Ok(bytes) => stats.record_new_file(bytes),
                        Err(e) => report_failure(reporter, e),
                    }
                    format!("copy {}", entry.display_name())
                }
                Some(found) => {
                    if entry.modified <= found.modified {
                        continue;
                    }
                    match self.overwrite_file(&entry.path, &destination).await {
                        Ok(bytes) => stats.record_overwritten_file(bytes),
                        Err(e) => report_failure(reporter, e),
                    }
                    format!("overwrite {}", destination.display())
                }
                None => {
                    match self.copy_file(&entry.path, &destination).await {
                        Ok(bytes) => stats.record_new_file(bytes),
                        Err(e) => report_failure(reporter, e),
                    }
                    format!("copy {}", entry.display_name())
                }
            };

            if !reporter.report(message, detail, stats) {
                return false;
            }
        }

        true
    }

    /// Passes 3 and 4: remove stale target subdirectories, then create and
    /// descend into source subdirectories
    async fn sync_subdirectories(
        &self,
        source: &Path,
        target: &Path,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> bool {
        // Listed again: the file passes may have changed what the target holds.
        let Some((source_listing, target_listing)) = list_pair(source, target, reporter).await else {
            return true;
        };

        for entry in &target_listing.directories {
            let counterpart = source.join(&entry.name);
            match DirectoryEntry::stat(&counterpart).await {
                Ok(Some(found)) if found.is_dir => continue,
                Ok(_) => {}
                Err(e) => {
                    report_failure(reporter, e);
                    continue;
                }
            }

            match remove_directory(&entry.path).await {
                Ok(()) => stats.record_removed_directory(),
                Err(e) => report_failure(reporter, e),
            }
            if !reporter.report(format!("remove directory {}", entry.path.display()), true, stats) {
                return false;
            }
        }

        for entry in &source_listing.directories {
            let destination = target.join(&entry.name);
            match DirectoryEntry::stat(&destination).await {
                Ok(Some(found)) if found.is_dir => {}
                Ok(Some(_)) => {
                    report_failure(
                        reporter,
                        MirrorError::path_error(&destination, "A file is in the way of a source directory"),
                    );
                    continue;
                }
                Ok(None) => {
                    if let Err(e) = fs::create_dir(&destination).await {
                        report_failure(
                            reporter,
                            MirrorError::path_error(&destination, format!("Failed to create directory: {}", e)),
                        );
                        continue;
                    }
                    debug!(path = %destination.display(), "Created directory");
                    stats.record_new_directory();
                }
                Err(e) => {
                    report_failure(reporter, e);
                    continue;
                }
            }

            if !self.sync_directory(&entry.path, &destination, stats, reporter).await {
                return false;
            }
        }

        true
    }

    /// Copy a file that does not exist under the target yet
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        let bytes = fs::copy(source, destination).await.map_err(|e| {
            MirrorError::copy_error(source, destination, format!("Failed to copy file: {}", e))
        })?;
        debug!(source = %source.display(), destination = %destination.display(), bytes, "Copied file");

        if self.attribute_preserver.is_active() {
            if let Err(e) = self.attribute_preserver.copy_attributes(source, destination).await {
                warn!("Failed to preserve attributes for '{}': {}", destination.display(), e);
            }
        }

        Ok(bytes)
    }

    /// Replace a stale target file with its source
    async fn overwrite_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        remove_file(destination).await?;
        self.copy_file(source, destination).await
    }
}

/// List both sides of a directory pair, reporting failures.
///
/// `None` means the pair is skipped entirely.
async fn list_pair(
    source: &Path,
    target: &Path,
    reporter: &ProgressReporter,
) -> Option<(DirectoryListing, DirectoryListing)> {
    let source_listing = match list_directory(source).await {
        Ok(listing) => listing,
        Err(e) => {
            report_failure(reporter, e);
            return None;
        }
    };
    match list_directory(target).await {
        Ok(target_listing) => Some((source_listing, target_listing)),
        Err(e) => {
            report_failure(reporter, e);
            None
        }
    }
}

/// Remove a single file and verify it is gone
async fn remove_file(path: &Path) -> Result<()> {
    if let Err(e) = clear_restrictive_permissions(path).await {
        debug!(error = %e, "Could not relax permissions before removal");
    }

    let removal = fs::remove_file(path).await;
    if path_exists(path).await {
        let reason = match removal {
            Err(e) => e.to_string(),
            Ok(()) => "file still present after removal".to_string(),
        };
        return Err(MirrorError::deletion_error(
            path,
            format!("Cannot remove file: {}", reason),
        ));
    }

    debug!(path = %path.display(), "Removed file");
    Ok(())
}

/// Remove a directory subtree and verify it is gone
async fn remove_directory(path: &Path) -> Result<()> {
    if let Err(e) = clear_restrictive_permissions(path).await {
        debug!(error = %e, "Could not relax permissions before removal");
    }

    let removal = fs::remove_dir_all(path).await;
    if path_exists(path).await {
        let reason = match removal {
            Err(e) => e.to_string(),
            Ok(()) => "directory still present after removal".to_string(),
        };
        return Err(MirrorError::deletion_error(
            path,
            format!("Cannot remove directory: {}", reason),
        ));
    }

    debug!(path = %path.display(), "Removed directory");
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    // symlink_metadata so that a dangling link left behind still counts.
    fs::symlink_metadata(path).await.is_ok()
}

fn report_failure(reporter: &ProgressReporter, error: MirrorError) {
    warn!(run_id = %reporter.run_id(), "{}", error);
    reporter.error(error.to_string());
}

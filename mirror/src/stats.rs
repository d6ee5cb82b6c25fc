//! Running statistics for a mirror run

use serde::{Deserialize, Serialize};
use tracing::info;

/// The nine counters accumulated over one mirror run.
///
/// A run owns exactly one instance and mutates it through `&mut` as the walk
/// descends. Observers only ever see copies (the type is `Copy`), so a
/// snapshot sent across a channel can never alias the live counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Files deleted from the target because the source no longer has them
    pub removed_files: u64,
    /// Bytes of the deleted files
    pub removed_bytes: u64,
    /// Target files replaced by a newer source file
    pub overwritten_files: u64,
    /// Bytes written while overwriting
    pub overwritten_bytes: u64,
    /// Files copied to the target for the first time
    pub new_files: u64,
    /// Bytes written for new files
    pub new_bytes: u64,
    /// Directory pairs entered by the walk
    pub directories_visited: u64,
    /// Directories created under the target
    pub new_directories: u64,
    /// Directory subtrees deleted from the target
    pub removed_directories: u64,
}

impl SyncStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_removed_file(&mut self, size: u64) {
        self.removed_files += 1;
        self.removed_bytes += size;
    }

    pub fn record_overwritten_file(&mut self, size: u64) {
        self.overwritten_files += 1;
        self.overwritten_bytes += size;
    }

    pub fn record_new_file(&mut self, size: u64) {
        self.new_files += 1;
        self.new_bytes += size;
    }

    pub fn record_directory_visited(&mut self) {
        self.directories_visited += 1;
    }

    pub fn record_new_directory(&mut self) {
        self.new_directories += 1;
    }

    pub fn record_removed_directory(&mut self) {
        self.removed_directories += 1;
    }

    /// Number of file and directory changes applied to the target
    pub fn total_changes(&self) -> u64 {
        self.removed_files
            + self.overwritten_files
            + self.new_files
            + self.new_directories
            + self.removed_directories
    }

    /// True when the run did not have to touch the target at all
    pub fn is_unchanged(&self) -> bool {
        self.total_changes() == 0
    }

    /// Bytes written to the target (new and overwritten files)
    pub fn bytes_written(&self) -> u64 {
        self.new_bytes + self.overwritten_bytes
    }

    /// Emit the counters as one structured log record
    pub fn log_summary(&self, cancelled: bool) {
        info!(
            cancelled,
            directories_visited = self.directories_visited,
            new_directories = self.new_directories,
            removed_directories = self.removed_directories,
            new_files = self.new_files,
            new_bytes = self.new_bytes,
            overwritten_files = self.overwritten_files,
            overwritten_bytes = self.overwritten_bytes,
            removed_files = self.removed_files,
            removed_bytes = self.removed_bytes,
            "Mirror run finished"
        );
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "Directories visited: {}\n\
             New directories: {}\n\
             Removed directories: {}\n\
             New files: {} ({})\n\
             Overwritten files: {} ({})\n\
             Removed files: {} ({})",
            self.directories_visited,
            self.new_directories,
            self.removed_directories,
            self.new_files,
            format_bytes(self.new_bytes),
            self.overwritten_files,
            format_bytes(self.overwritten_bytes),
            self.removed_files,
            format_bytes(self.removed_bytes),
        )
    }

    /// Single-line form used in status updates
    pub fn status_line(&self) -> String {
        format!(
            "dirs {} (+{} -{}) | files +{} ~{} -{} | {} written",
            self.directories_visited,
            self.new_directories,
            self.removed_directories,
            self.new_files,
            self.overwritten_files,
            self.removed_files,
            format_bytes(self.bytes_written()),
        )
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

//! Error types for the mirror engine

use std::path::PathBuf;

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors produced by validation and the tree walk
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source directory does not exist
    #[error("Source directory does not exist or is not a directory: '{0}'")]
    SourceMissing(PathBuf),

    /// The target directory does not exist
    #[error("Target directory does not exist or is not a directory: '{0}'")]
    TargetMissing(PathBuf),

    /// Validation requested but the source marker file is absent
    #[error("Invalid source directory: marker '{0}' not found")]
    SourceNotMarked(PathBuf),

    /// Validation requested but the target marker file is absent
    #[error("Invalid target directory: marker '{0}' not found")]
    TargetNotMarked(PathBuf),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Directory listing errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// File copying errors
    #[error("File copy error: {message}")]
    FileCopy { message: String },

    /// File or directory deletion errors
    #[error("Deletion error at '{path}': {message}")]
    Deletion { path: PathBuf, message: String },

    /// Permission errors
    #[error("Permission error at '{path}': {message}")]
    Permission { path: PathBuf, message: String },

    /// Attribute preservation errors
    #[error("Attribute preservation error for '{path}': {message}")]
    AttributePreservation { path: PathBuf, message: String },

    /// Progress reporting errors
    #[error("Progress reporting error: {0}")]
    Progress(String),

    /// A run was started while another one is still active
    #[error("A mirror run is already in progress")]
    AlreadyRunning,

    /// The background task running the walk panicked or was aborted
    #[error("Mirror worker failed: {0}")]
    Worker(String),

    /// `start` was called without a prior `setup`
    #[error("No mirror request has been set up")]
    NotConfigured,
}

impl MirrorError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "File copy error from '{}' to '{}': {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::FileCopy {
            message: full_message,
        }
    }

    /// Create a new deletion error
    pub fn deletion_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Deletion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new permission error
    pub fn permission_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Permission {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new attribute preservation error
    pub fn attribute_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AttributePreservation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a run before any mutation happened
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing(_)
                | Self::TargetMissing(_)
                | Self::SourceNotMarked(_)
                | Self::TargetNotMarked(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failures_are_classified() {
        assert!(MirrorError::SourceMissing(PathBuf::from("a")).is_validation_failure());
        assert!(MirrorError::TargetNotMarked(PathBuf::from("b")).is_validation_failure());
        assert!(!MirrorError::AlreadyRunning.is_validation_failure());
        assert!(!MirrorError::deletion_error("c", "still present").is_validation_failure());
    }

    #[test]
    fn test_copy_error_message_names_both_paths() {
        let err = MirrorError::copy_error("/src/a.txt", "/dst/a.txt", "disk full");
        let text = err.to_string();
        assert!(text.contains("/src/a.txt"));
        assert!(text.contains("/dst/a.txt"));
        assert!(text.contains("disk full"));
    }
}

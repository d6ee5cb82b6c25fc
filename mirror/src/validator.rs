//! Pre-run checks on the source/target pair

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{MirrorError, Result};
use crate::progress::ProgressReporter;

/// Well-known sentinel files marking a directory as a mirror source or target.
///
/// The walk never copies, deletes or counts either of them, on either side.
pub struct MarkerFiles;

impl MarkerFiles {
    /// Marker placed inside the source directory
    pub const SOURCE: &'static str = "source.siba";
    /// Marker placed inside the target directory
    pub const TARGET: &'static str = "target.siba";

    /// Whether `name` is one of the two marker file names
    pub fn is_marker(name: &str) -> bool {
        name == Self::SOURCE || name == Self::TARGET
    }

    pub fn source_marker(source: &Path) -> PathBuf {
        source.join(Self::SOURCE)
    }

    pub fn target_marker(target: &Path) -> PathBuf {
        target.join(Self::TARGET)
    }

    /// Create both marker files, leaving existing ones untouched.
    ///
    /// Both directories must already exist.
    pub async fn create(source: &Path, target: &Path) -> Result<()> {
        ensure_directory(source, MirrorError::SourceMissing).await?;
        ensure_directory(target, MirrorError::TargetMissing).await?;

        for marker in [Self::source_marker(source), Self::target_marker(target)] {
            if !path_exists(&marker).await {
                fs::write(&marker, b"").await.map_err(|e| {
                    MirrorError::path_error(&marker, format!("Failed to create marker file: {}", e))
                })?;
                debug!(marker = %marker.display(), "Created marker file");
            }
        }
        Ok(())
    }
}

/// Gatekeeper run once at the top of every mirror run
pub struct Validator;

impl Validator {
    /// Check that both directories exist and, when `check_markers` is set,
    /// that each carries its marker file.
    ///
    /// Each marker path is announced through `reporter` before it is checked,
    /// so the observer sees which file was looked for even on failure.
    pub async fn validate(
        source: &Path,
        target: &Path,
        check_markers: bool,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        ensure_directory(source, MirrorError::SourceMissing).await?;
        ensure_directory(target, MirrorError::TargetMissing).await?;

        if !check_markers {
            return Ok(());
        }

        let source_marker = MarkerFiles::source_marker(source);
        reporter.info(source_marker.display().to_string());
        if !path_exists(&source_marker).await {
            return Err(MirrorError::SourceNotMarked(source_marker));
        }

        let target_marker = MarkerFiles::target_marker(target);
        reporter.info(target_marker.display().to_string());
        if !path_exists(&target_marker).await {
            return Err(MirrorError::TargetNotMarked(target_marker));
        }

        reporter.info("Directories validated");
        Ok(())
    }
}

async fn ensure_directory(path: &Path, missing: fn(PathBuf) -> MirrorError) -> Result<()> {
    let is_dir = fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        Ok(())
    } else {
        Err(missing(path.to_path_buf()))
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressChannel, ProgressEvent};
    use tempfile::TempDir;

    fn dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let target = temp_dir.path().join("target");
        std::fs::create_dir(&source).unwrap();
        std::fs::create_dir(&target).unwrap();
        (temp_dir, source, target)
    }

    fn infos(channel: &mut ProgressChannel) -> Vec<String> {
        channel
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Info { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_marker_names() {
        assert!(MarkerFiles::is_marker("source.siba"));
        assert!(MarkerFiles::is_marker("target.siba"));
        assert!(!MarkerFiles::is_marker("source.siba.bak"));
    }

    #[tokio::test]
    async fn test_missing_source_and_target() {
        let (temp_dir, source, target) = dirs();
        let (reporter, _channel) = ProgressChannel::new();
        let absent = temp_dir.path().join("absent");

        let err = Validator::validate(&absent, &target, false, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::SourceMissing(p) if p == absent));

        let err = Validator::validate(&source, &absent, false, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::TargetMissing(_)));
    }

    #[tokio::test]
    async fn test_regular_file_is_not_a_directory() {
        let (temp_dir, source, target) = dirs();
        let (reporter, _channel) = ProgressChannel::new();
        let plain = temp_dir.path().join("plain.txt");
        std::fs::write(&plain, b"not a directory").unwrap();

        let err = Validator::validate(&plain, &target, false, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::SourceMissing(p) if p == plain));

        let err = Validator::validate(&source, &plain, false, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::TargetMissing(p) if p == plain));
    }

    #[tokio::test]
    async fn test_markers_not_required_without_validation() {
        let (_temp_dir, source, target) = dirs();
        let (reporter, mut channel) = ProgressChannel::new();

        Validator::validate(&source, &target, false, &reporter).await.unwrap();
        assert!(infos(&mut channel).is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_marker_is_announced_first() {
        let (_temp_dir, source, target) = dirs();
        let (reporter, mut channel) = ProgressChannel::new();

        let err = Validator::validate(&source, &target, true, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::SourceNotMarked(_)));
        assert_eq!(
            infos(&mut channel),
            vec![MarkerFiles::source_marker(&source).display().to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_target_marker() {
        let (_temp_dir, source, target) = dirs();
        std::fs::write(MarkerFiles::source_marker(&source), b"").unwrap();
        let (reporter, mut channel) = ProgressChannel::new();

        let err = Validator::validate(&source, &target, true, &reporter).await.unwrap_err();
        assert!(matches!(err, MirrorError::TargetNotMarked(_)));
        assert_eq!(infos(&mut channel).len(), 2);
    }

    #[tokio::test]
    async fn test_create_markers_then_validate() {
        let (_temp_dir, source, target) = dirs();
        MarkerFiles::create(&source, &target).await.unwrap();
        let (reporter, mut channel) = ProgressChannel::new();

        Validator::validate(&source, &target, true, &reporter).await.unwrap();
        let messages = infos(&mut channel);
        assert_eq!(messages.last().map(String::as_str), Some("Directories validated"));
    }
}

//! Single-level directory listing
//!
//! The mirror walk never looks further than one level down per call, and it
//! never keeps listings around: every call here hits the filesystem again so
//! that modification-time comparisons reflect the state at the moment they
//! are made.

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{MirrorError, Result};
use crate::validator::MarkerFiles;

/// Metadata view of one directory child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// File name within its parent, exactly as the OS reports it
    pub name: OsString,
    /// Full path to the entry
    pub path: PathBuf,
    /// Whether this is a directory (symbolic links are followed)
    pub is_dir: bool,
    /// Last modified time
    pub modified: SystemTime,
    /// Size in bytes; zero for directories
    pub size: u64,
}

impl DirectoryEntry {
    /// Read the entry at `path` fresh from the OS.
    ///
    /// Returns `Ok(None)` when nothing (or a dangling link) lives there.
    pub async fn stat(path: &Path) -> Result<Option<Self>> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MirrorError::path_error(path, format!("Failed to read metadata: {}", e)));
            }
        };

        let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();

        Ok(Some(Self {
            name,
            path: path.to_path_buf(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        }))
    }

    /// Whether this is a regular file (or a link to one)
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// Name for messages; invalid UTF-8 is replaced
    pub fn display_name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }

    /// Whether this entry carries one of the marker file names
    pub fn is_marker(&self) -> bool {
        self.name.to_str().is_some_and(MarkerFiles::is_marker)
    }
}

/// Immediate children of a directory, split by kind
#[derive(Debug, Default, Clone)]
pub struct DirectoryListing {
    pub files: Vec<DirectoryEntry>,
    pub directories: Vec<DirectoryEntry>,
}

/// List the immediate children of `dir`, hidden entries included.
///
/// Entries are returned in the order the OS reports them. Children whose
/// metadata cannot be read (dangling links, entries removed mid-listing) are
/// skipped.
pub async fn list_directory(dir: &Path) -> Result<DirectoryListing> {
    let mut reader = fs::read_dir(dir).await.map_err(|e| {
        MirrorError::scan_error(dir, format!("Failed to read directory: {}", e))
    })?;

    let mut listing = DirectoryListing::default();

    while let Some(child) = reader.next_entry().await.map_err(|e| {
        MirrorError::scan_error(dir, format!("Failed to read directory entry: {}", e))
    })? {
        let path = child.path();
        match DirectoryEntry::stat(&path).await {
            Ok(Some(entry)) if entry.is_dir => listing.directories.push(entry),
            Ok(Some(entry)) => listing.files.push(entry),
            Ok(None) => debug!(path = %path.display(), "Skipping unreadable entry"),
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping entry"),
        }
    }

    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_listing_splits_files_and_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("file1.txt"), b"content1").await.unwrap();
        fs::write(root.join(".hidden"), b"h").await.unwrap();
        fs::create_dir(root.join("subdir")).await.unwrap();
        fs::write(root.join("subdir").join("nested.txt"), b"nested").await.unwrap();

        let listing = list_directory(root).await.unwrap();

        let mut files: Vec<_> = listing.files.iter().filter_map(|e| e.name.to_str()).collect();
        files.sort();
        assert_eq!(files, vec![".hidden", "file1.txt"]);
        assert_eq!(listing.directories.len(), 1);
        assert_eq!(listing.directories[0].name, "subdir");
        assert_eq!(listing.directories[0].size, 0);
    }

    #[tokio::test]
    async fn test_stat_reports_size_and_absence() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("data.bin");
        fs::write(&file, vec![0u8; 42]).await.unwrap();

        let entry = DirectoryEntry::stat(&file).await.unwrap().unwrap();
        assert_eq!(entry.size, 42);
        assert!(entry.is_file());
        assert_eq!(entry.name, "data.bin");

        let missing = DirectoryEntry::stat(&temp_dir.path().join("nope")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_listing_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = list_directory(&temp_dir.path().join("absent")).await;
        assert!(matches!(result, Err(MirrorError::DirectoryScan { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_kept_exactly() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let raw = OsStr::from_bytes(b"caf\xe9.txt");
        fs::write(temp_dir.path().join(raw), b"latin-1").await.unwrap();

        let listing = list_directory(temp_dir.path()).await.unwrap();

        assert_eq!(listing.files.len(), 1);
        let entry = &listing.files[0];
        assert_eq!(entry.name, raw);
        assert_eq!(entry.path, temp_dir.path().join(raw));
        assert_eq!(entry.display_name(), "caf\u{FFFD}.txt");
        assert!(!entry.is_marker());
    }

    #[tokio::test]
    async fn test_marker_entries_are_recognised() {
        let temp_dir = TempDir::new().unwrap();
        let marker = temp_dir.path().join(MarkerFiles::SOURCE);
        fs::write(&marker, b"").await.unwrap();

        let entry = DirectoryEntry::stat(&marker).await.unwrap().unwrap();
        assert!(entry.is_marker());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::os::unix::fs::symlink(root.join("gone"), root.join("link")).unwrap();

        let listing = list_directory(root).await.unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.directories.is_empty());
    }
}

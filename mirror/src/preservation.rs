//! File attribute handling around copies and deletions

use std::path::Path;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{MirrorError, Result};

/// Options for attribute preservation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreservationOptions {
    /// Give copied files the modification time of their source
    pub preserve_mtime: bool,
}

/// Applies source attributes to freshly copied files
pub struct AttributePreserver {
    options: PreservationOptions,
}

impl AttributePreserver {
    /// Create a new attribute preserver with options
    pub fn new(options: PreservationOptions) -> Self {
        Self { options }
    }

    /// Whether any attribute would be carried over
    pub fn is_active(&self) -> bool {
        self.options.preserve_mtime
    }

    /// Copy configured attributes from `source` to `destination`
    pub async fn copy_attributes(&self, source: &Path, destination: &Path) -> Result<()> {
        if !self.options.preserve_mtime {
            return Ok(());
        }

        let metadata = fs::metadata(source).await.map_err(|e| {
            MirrorError::attribute_error(source, format!("Failed to read metadata: {}", e))
        })?;
        let mtime = FileTime::from_last_modification_time(&metadata);

        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || {
            filetime::set_file_mtime(&destination, mtime).map_err(|e| {
                MirrorError::attribute_error(&destination, format!("Failed to set modification time: {}", e))
            })
        })
        .await
        .map_err(|e| MirrorError::attribute_error(source, format!("Attribute task failed: {}", e)))?
    }
}

/// Relax permissions on `path` so that it can be removed or replaced.
///
/// Adds read and write access for "other" on Unix; clears the read-only
/// attribute elsewhere. Existing bits are kept.
pub async fn clear_restrictive_permissions(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).await.map_err(|e| {
        MirrorError::permission_error(path, format!("Failed to read metadata: {}", e))
    })?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mut perms = metadata.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o006 == 0o006 {
            return Ok(());
        }
        perms.set_mode(mode | 0o006);
    }

    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            return Ok(());
        }
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }

    fs::set_permissions(path, perms).await.map_err(|e| {
        MirrorError::permission_error(path, format!("Failed to set permissions: {}", e))
    })
}

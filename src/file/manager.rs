// Offline Media Core - offline media downloads for mobile playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! File operations for the download directory
//!
//! # Key Operations
//! - Directory creation
//! - Existence and length checks (the resume offset is the part file length)
//! - Deletes that tolerate missing files
//! - Atomic placement of completed downloads (rename, with retry)

use crate::error::{OfflineError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// File manager scoped to the offline download directory
#[derive(Debug, Clone)]
pub struct FileManager {
    download_directory: PathBuf,
}

impl FileManager {
    pub fn new(download_directory: PathBuf) -> Self {
        Self { download_directory }
    }

    pub fn download_directory(&self) -> &Path {
        &self.download_directory
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if Self::file_exists(path).await {
            return Ok(());
        }

        fs::create_dir_all(path)
            .await
            .map_err(|e| OfflineError::file_io("Failed to create directory", path, e))
    }

    /// Create the parent directory of `path`
    pub async fn ensure_parent_exists(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                self.ensure_directory_exists(parent).await
            }
            _ => Ok(()),
        }
    }

    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Length of a file, or 0 if it doesn't exist
    pub async fn file_len(path: &Path) -> Result<u64> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(OfflineError::file_io("Failed to stat", path, e)),
        }
    }

    /// Delete a file with retry; a missing file is not an error
    pub async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match fs::remove_file(path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(OfflineError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => sleep(RETRY_DELAY).await,
            }
        }
    }

    /// Move `source` onto `destination`, replacing it
    ///
    /// Both paths live in the download directory, so the rename is atomic:
    /// readers see either the old file or the complete new one.
    pub async fn safe_move(&self, source: &Path, destination: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match fs::rename(source, destination).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS || e.kind() == ErrorKind::NotFound => {
                    return Err(OfflineError::FileIoError(format!(
                        "Move failed: {} -> {}: {}",
                        source.display(),
                        destination.display(),
                        e
                    )));
                }
                Err(_) => sleep(RETRY_DELAY).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_directory_exists() {
        let temp_dir = TempDir::new().unwrap();
        let media_dir = temp_dir.path().join("offline").join("video");

        let manager = FileManager::new(temp_dir.path().to_path_buf());
        manager.ensure_directory_exists(&media_dir).await.unwrap();
        assert!(media_dir.exists());

        // Second call is a no-op
        manager.ensure_directory_exists(&media_dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_len_missing_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nothing.part");
        assert_eq!(FileManager::file_len(&path).await.unwrap(), 0);

        fs::write(&path, b"12345").await.unwrap();
        assert_eq!(FileManager::file_len(&path).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_safe_delete() {
        let temp_dir = TempDir::new().unwrap();
        let manager = FileManager::new(temp_dir.path().to_path_buf());
        let path = temp_dir.path().join("m1.mp4");
        fs::write(&path, b"data").await.unwrap();

        manager.safe_delete(&path).await.unwrap();
        assert!(!path.exists());

        // Deleting again is fine
        manager.safe_delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_safe_move_replaces_destination() {
        let temp_dir = TempDir::new().unwrap();
        let manager = FileManager::new(temp_dir.path().to_path_buf());
        let source = temp_dir.path().join("m1.mp4.part");
        let dest = temp_dir.path().join("m1.mp4");
        fs::write(&source, b"new content").await.unwrap();
        fs::write(&dest, b"old").await.unwrap();

        manager.safe_move(&source, &dest).await.unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&dest).await.unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_safe_move_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let manager = FileManager::new(temp_dir.path().to_path_buf());
        let result = manager
            .safe_move(&temp_dir.path().join("a"), &temp_dir.path().join("b"))
            .await;
        assert!(matches!(result, Err(OfflineError::FileIoError(_))));
    }
}

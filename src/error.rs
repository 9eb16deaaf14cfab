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


//! Error types for the offline download subsystem
//!
//! Errors are grouped by domain (network, integrity, file, storage,
//! configuration) so callers can classify failures without string matching.
//!
//! ## How errors surface
//! - Transfer errors (network, I/O) end a download in `DownloadStatus::Failed`;
//!   they are never retried automatically.
//! - Integrity errors (`FileSizeMismatch`, `ChecksumMismatch`) are always fatal
//!   and the partial output is deleted.
//! - Corrupt persisted records are dropped during reconciliation and only
//!   logged as `CorruptRecord`; it never reaches the public API.
//! - Calls on untracked media ids are no-ops, not errors.

use thiserror::Error;

/// Result type alias using our OfflineError type
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Main error type for the offline download subsystem
#[derive(Error, Debug)]
pub enum OfflineError {
    // ===== Network Errors =====

    /// Network connectivity error (connect failure, dropped stream, timeout)
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server responded with a status the transfer cannot use
    #[error("Server responded with unexpected status code {status_code} for {url}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Partial-content response started somewhere other than the requested offset
    #[error("Server resumed at byte {actual} but byte {requested} was requested")]
    UnexpectedContentRange {
        requested: u64,
        actual: u64,
    },

    /// Invalid download URL format or protocol
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    /// Stream ended before the server-declared length was received
    #[error("Download incomplete: received {received} of {expected} bytes")]
    DownloadIncomplete {
        received: u64,
        expected: u64,
    },

    // ===== Integrity Errors =====

    /// Final file size differs from the expected size
    #[error("Download file size mismatch: expected {expected} bytes, got {actual} bytes")]
    FileSizeMismatch {
        expected: u64,
        actual: u64,
    },

    /// Computed SHA-256 digest differs from the expected one
    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        expected: String,
        actual: String,
    },

    // ===== File/Storage Errors =====

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Persisted entry could not be decoded
    #[error("Corrupt record '{key}': {reason}")]
    CorruptRecord {
        key: String,
        reason: String,
    },

    // ===== Configuration/State Errors =====

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl OfflineError {
    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        OfflineError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a FileIoError that names the path involved
    pub fn file_io(action: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        OfflineError::FileIoError(format!("{} {}: {}", action, path.display(), err))
    }

    /// Check if a fresh attempt could plausibly succeed
    ///
    /// The download manager never retries on its own; this is for callers
    /// deciding whether to offer a "retry" action.
    pub fn is_retryable(&self) -> bool {
        match self {
            OfflineError::NetworkError { is_transient, .. } => *is_transient,
            OfflineError::DownloadIncomplete { .. } => true,
            OfflineError::UnexpectedStatusCode { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || (500..=599).contains(status_code)
            }
            OfflineError::ReqwestError(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            _ => false,
        }
    }

    /// Check if error is a failed size or checksum verification
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            OfflineError::FileSizeMismatch { .. } | OfflineError::ChecksumMismatch { .. }
        )
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            OfflineError::FileIoError(_) | OfflineError::IoError(_)
        )
    }
}

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


//! Persisted data models
//!
//! `DownloadRequest` is what the queue store keeps for unfinished downloads,
//! `OfflineMedia` is the durable record of a completed one. Both are stored
//! as JSON and must round-trip every field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// What to fetch for one media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Stable unique key across request, status and record
    pub media_id: String,

    pub download_url: String,

    /// Headers required by the origin server (auth, cookies)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub mime_type: Option<String>,

    /// If set, the final file must have exactly this size
    #[serde(default)]
    pub expected_size_bytes: Option<u64>,

    /// If set, the SHA-256 of the final file must match (hex, any case)
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

impl DownloadRequest {
    pub fn new<I: Into<String>, U: Into<String>>(media_id: I, download_url: U) -> Self {
        Self {
            media_id: media_id.into(),
            download_url: download_url.into(),
            headers: HashMap::new(),
            mime_type: None,
            expected_size_bytes: None,
            checksum_sha256: None,
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size_bytes = Some(bytes);
        self
    }

    pub fn with_checksum<S: Into<String>>(mut self, sha256_hex: S) -> Self {
        self.checksum_sha256 = Some(sha256_hex.into());
        self
    }
}

/// Durable record of a completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineMedia {
    pub media_id: String,

    /// Absolute path of the playable file
    pub file_path: PathBuf,

    #[serde(default)]
    pub mime_type: Option<String>,

    /// Digest computed during the transfer (lowercase hex)
    #[serde(default)]
    pub checksum_sha256: Option<String>,

    #[serde(default)]
    pub size_bytes: Option<u64>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let request = DownloadRequest::new("m1", "https://cdn.example.com/m1.mp4")
            .with_header("Authorization", "Bearer abc")
            .with_mime_type("video/mp4")
            .with_expected_size(1000)
            .with_checksum("ABCDEF");

        let json = serde_json::to_string(&request).unwrap();
        let decoded: DownloadRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_optional_fields_default() {
        let decoded: DownloadRequest =
            serde_json::from_str(r#"{"media_id":"m1","download_url":"http://x/f.mp4"}"#).unwrap();
        assert!(decoded.headers.is_empty());
        assert_eq!(decoded.mime_type, None);
        assert_eq!(decoded.expected_size_bytes, None);
    }

    #[test]
    fn test_offline_media_round_trip() {
        let record = OfflineMedia {
            media_id: "m1".to_string(),
            file_path: PathBuf::from("/data/offline/m1.mp4"),
            mime_type: Some("video/mp4".to_string()),
            checksum_sha256: None,
            size_bytes: Some(1000),
            completed_at: Some(Utc::now()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let decoded: OfflineMedia = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
    }
}

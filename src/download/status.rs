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


//! Observable download status
//!
//! The status board is the only externally visible view of manager state:
//! one `DownloadStatus` per media id, published through a `watch` channel so
//! a new subscriber immediately sees the current map (replay-one).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::watch;

/// Current state of one media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued {
        media_id: String,
    },
    InProgress {
        media_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },
    Paused {
        media_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },
    Completed {
        media_id: String,
        file_path: PathBuf,
        bytes_downloaded: u64,
    },
    Failed {
        media_id: String,
        cause: String,
    },
}

impl DownloadStatus {
    pub fn media_id(&self) -> &str {
        match self {
            DownloadStatus::Queued { media_id }
            | DownloadStatus::InProgress { media_id, .. }
            | DownloadStatus::Paused { media_id, .. }
            | DownloadStatus::Completed { media_id, .. }
            | DownloadStatus::Failed { media_id, .. } => media_id,
        }
    }

    /// Completed and Failed end the transfer; only a new enqueue moves on
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed { .. } | DownloadStatus::Failed { .. }
        )
    }

    pub fn bytes_downloaded(&self) -> u64 {
        match self {
            DownloadStatus::InProgress { bytes_downloaded, .. }
            | DownloadStatus::Paused { bytes_downloaded, .. }
            | DownloadStatus::Completed { bytes_downloaded, .. } => *bytes_downloaded,
            DownloadStatus::Queued { .. } | DownloadStatus::Failed { .. } => 0,
        }
    }

    /// Fraction complete in `0.0..=1.0`, when the total is known
    pub fn progress_fraction(&self) -> Option<f64> {
        match self {
            DownloadStatus::InProgress { bytes_downloaded, total_bytes: Some(total), .. }
            | DownloadStatus::Paused { bytes_downloaded, total_bytes: Some(total), .. } => {
                if *total == 0 {
                    Some(1.0)
                } else {
                    Some((*bytes_downloaded as f64 / *total as f64).min(1.0))
                }
            }
            DownloadStatus::Completed { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// Snapshot of all statuses, keyed by media id
pub type StatusMap = HashMap<String, DownloadStatus>;

/// Publisher side of the status map
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<StatusMap>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusMap::new());
        Self { tx }
    }

    /// Replace the entry for the status's media id
    pub fn publish(&self, status: DownloadStatus) {
        self.tx.send_modify(|map| {
            map.insert(status.media_id().to_string(), status);
        });
    }

    /// Remove the entry for `media_id`, notifying only if one existed
    pub fn clear(&self, media_id: &str) {
        self.tx.send_if_modified(|map| map.remove(media_id).is_some());
    }

    pub fn get(&self, media_id: &str) -> Option<DownloadStatus> {
        self.tx.borrow().get(media_id).cloned()
    }

    pub fn snapshot(&self) -> StatusMap {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(id: &str) -> DownloadStatus {
        DownloadStatus::Queued { media_id: id.to_string() }
    }

    #[test]
    fn test_publish_replaces_entry() {
        let board = StatusBoard::new();
        board.publish(queued("m1"));
        board.publish(DownloadStatus::InProgress {
            media_id: "m1".to_string(),
            bytes_downloaded: 10,
            total_bytes: Some(100),
        });

        let map = board.snapshot();
        assert_eq!(map.len(), 1);
        assert_eq!(map["m1"].bytes_downloaded(), 10);
    }

    #[test]
    fn test_clear_removes_entry() {
        let board = StatusBoard::new();
        board.publish(queued("m1"));
        board.clear("m1");
        board.clear("m1");
        assert!(board.get("m1").is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_current_state() {
        let board = StatusBoard::new();
        board.publish(queued("m1"));
        board.publish(queued("m2"));

        let rx = board.subscribe();
        assert_eq!(rx.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_subscriber_notified_on_change() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        board.publish(queued("m1"));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().contains_key("m1"));

        // Clearing an absent id does not wake subscribers
        board.clear("other");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_progress_fraction() {
        let status = DownloadStatus::Paused {
            media_id: "m1".to_string(),
            bytes_downloaded: 300,
            total_bytes: Some(1000),
        };
        assert_eq!(status.progress_fraction(), Some(0.3));
        assert!(!status.is_terminal());

        let unknown = DownloadStatus::InProgress {
            media_id: "m1".to_string(),
            bytes_downloaded: 5,
            total_bytes: None,
        };
        assert_eq!(unknown.progress_fraction(), None);
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let status = DownloadStatus::Failed {
            media_id: "m3".to_string(),
            cause: "Checksum mismatch".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["media_id"], "m3");
    }
}

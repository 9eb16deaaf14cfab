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


//! Store of download requests that have not completed yet

use crate::error::{OfflineError, Result};
use crate::storage::kv::KeyValueStore;
use crate::storage::models::DownloadRequest;
use std::sync::Arc;
use tracing::warn;

const QUEUE_NAMESPACE: &str = "download_queue";

/// Persisted queue of unfinished `DownloadRequest`s, in enqueue order
#[derive(Clone)]
pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
}

impl QueueStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// All decodable requests, oldest first; corrupt entries are deleted
    pub async fn all(&self) -> Result<Vec<DownloadRequest>> {
        let mut requests = Vec::new();
        for (key, raw) in self.kv.entries(QUEUE_NAMESPACE).await? {
            match serde_json::from_str::<DownloadRequest>(&raw) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    let err = OfflineError::CorruptRecord {
                        key: key.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "dropping corrupt queue entry");
                    self.kv.remove(QUEUE_NAMESPACE, &key).await?;
                }
            }
        }
        Ok(requests)
    }

    /// Insert or replace the entry for `request.media_id`
    pub async fn put(&self, request: &DownloadRequest) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.kv.put(QUEUE_NAMESPACE, &request.media_id, &json).await
    }

    pub async fn remove(&self, media_id: &str) -> Result<()> {
        self.kv.remove(QUEUE_NAMESPACE, media_id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.clear(QUEUE_NAMESPACE).await
    }
}

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


//! Store of completed offline media records

use crate::error::{OfflineError, Result};
use crate::storage::kv::KeyValueStore;
use crate::storage::models::OfflineMedia;
use std::sync::Arc;
use tracing::warn;

const RECORDS_NAMESPACE: &str = "offline_media";

/// Persisted `OfflineMedia` records keyed by media id
///
/// Entries that fail to decode are deleted and skipped; a corrupt record can
/// never be reconciled with a file anyway.
#[derive(Clone)]
pub struct MediaRecordStore {
    kv: Arc<dyn KeyValueStore>,
}

impl MediaRecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn read(&self, media_id: &str) -> Result<Option<OfflineMedia>> {
        let Some(raw) = self.kv.get(RECORDS_NAMESPACE, media_id).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<OfflineMedia>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                self.drop_corrupt(media_id, &e).await?;
                Ok(None)
            }
        }
    }

    /// Insert or replace the record for `record.media_id`
    pub async fn write(&self, record: &OfflineMedia) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.kv.put(RECORDS_NAMESPACE, &record.media_id, &json).await
    }

    pub async fn remove(&self, media_id: &str) -> Result<()> {
        self.kv.remove(RECORDS_NAMESPACE, media_id).await
    }

    pub async fn list(&self) -> Result<Vec<OfflineMedia>> {
        let mut records = Vec::new();
        for (key, raw) in self.kv.entries(RECORDS_NAMESPACE).await? {
            match serde_json::from_str::<OfflineMedia>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => self.drop_corrupt(&key, &e).await?,
            }
        }
        Ok(records)
    }

    async fn drop_corrupt(&self, key: &str, err: &serde_json::Error) -> Result<()> {
        let err = OfflineError::CorruptRecord {
            key: key.to_string(),
            reason: err.to_string(),
        };
        warn!(error = %err, "dropping corrupt offline media record");
        self.kv.remove(RECORDS_NAMESPACE, key).await
    }
}

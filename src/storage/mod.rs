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


//! Persistence for offline downloads
//!
//! # Layers
//! - `Database`: SQLite pool and runtime migrations
//! - `KeyValueStore`: the generic namespaced persistence contract
//! - `MediaRecordStore` / `QueueStore`: typed stores for completed media and
//!   pending requests, JSON-encoded on top of the key-value layer
//!
//! # Usage Example
//! ```no_run
//! use offline_media_core::storage::{Database, MediaRecordStore, QueueStore, SqliteKeyValueStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./offline/downloads.db").await?;
//! let kv = Arc::new(SqliteKeyValueStore::new(&db));
//! let records = MediaRecordStore::new(kv.clone());
//! let queue = QueueStore::new(kv);
//!
//! for request in queue.all().await? {
//!     println!("pending: {}", request.media_id);
//! }
//! println!("offline items: {}", records.list().await?.len());
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod records;

// Re-export commonly used types
pub use database::Database;
pub use kv::{KeyValueStore, SqliteKeyValueStore};
pub use models::{DownloadRequest, OfflineMedia};
pub use queue::QueueStore;
pub use records::MediaRecordStore;

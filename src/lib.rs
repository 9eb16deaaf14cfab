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


//! Offline media downloads for mobile playback
//!
//! Fetches remote media (video, audio, subtitle files) into local storage,
//! tracks every item through `Queued -> InProgress -> Paused/Completed/Failed`,
//! resumes partial transfers after a pause or a restart, verifies size and
//! SHA-256, and persists enough state to survive process restarts.
//!
//! # Example
//! ```no_run
//! use offline_media_core::{
//!     Database, DownloadConfig, DownloadManager, DownloadRequest, ReqwestFetcher,
//!     SqliteKeyValueStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> offline_media_core::Result<()> {
//! let config = DownloadConfig::with_directory("./offline");
//! let db = Database::new(&config.database_path).await?;
//! let store = Arc::new(SqliteKeyValueStore::new(&db));
//! let fetcher = Arc::new(ReqwestFetcher::from_config(&config)?);
//!
//! let manager = DownloadManager::start(config, store, fetcher).await?;
//! manager
//!     .enqueue(DownloadRequest::new("episode-1", "https://cdn.example.com/e1.mp4").with_mime_type("video/mp4"))
//!     .await?;
//!
//! let mut statuses = manager.statuses();
//! while statuses.changed().await.is_ok() {
//!     if let Some(status) = statuses.borrow_and_update().get("episode-1") {
//!         if status.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod logging;
pub mod storage;

pub use config::DownloadConfig;
pub use download::{
    DownloadManager, DownloadStatus, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher,
    StatusMap,
};
pub use error::{OfflineError, Result};
pub use storage::{Database, DownloadRequest, KeyValueStore, OfflineMedia, SqliteKeyValueStore};

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


//! Download management and streaming
//!
//! # Layers
//! - `fetch`: the HTTP capability (`Fetcher`) and its reqwest implementation
//! - `transfer`: one resumable transfer into a staged part file
//! - `checksum`: streaming SHA-256 verification
//! - `status` / `registry`: observable state and in-memory task bookkeeping
//! - `manager`: the public orchestrator

pub mod checksum;
pub mod fetch;
pub mod manager;
pub mod registry;
pub mod status;
pub mod transfer;

// Re-export commonly used types
pub use checksum::ChecksumVerifier;
pub use fetch::{ByteStream, ContentRange, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use manager::DownloadManager;
pub use status::{DownloadStatus, StatusBoard, StatusMap};
pub use transfer::{ProgressSink, TransferExecutor, TransferJob, TransferOutcome};

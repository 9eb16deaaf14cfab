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


//! Offline download orchestration
//!
//! `DownloadManager` owns the task registry, the status board and the two
//! persisted stores, and spawns one worker per active media id.
//!
//! # Lifecycle
//! ```text
//! (none) --enqueue--> Queued --worker starts--> InProgress
//! InProgress --pause--> Paused --resume--> InProgress
//! InProgress --completes--> Completed   (task dropped, record written)
//! InProgress --error--> Failed           (task dropped, files deleted)
//! (any) --remove--> (none)
//! ```
//!
//! # Locking
//! All task map mutations and status publications happen under one
//! `tokio::sync::Mutex`. Byte transfers run outside it; workers take the lock
//! only to report progress and to finish, and only act while their run number
//! still owns the task (see `registry`).
//!
//! # Startup
//! `start` reconciles persisted state before handing out the manager:
//! 1. Completed records whose file still exists are published as `Completed`;
//!    records whose file is gone are dropped
//! 2. Queue entries are replayed without being written again, resuming from
//!    whatever the part file already holds

use crate::config::DownloadConfig;
use crate::download::fetch::Fetcher;
use crate::download::registry::{DownloadTask, DownloadTaskRegistry};
use crate::download::status::{DownloadStatus, StatusBoard, StatusMap};
use crate::download::transfer::{ProgressSink, TransferExecutor, TransferJob, TransferOutcome};
use crate::error::{OfflineError, Result};
use crate::file::{FileManager, MediaPaths};
use crate::storage::{DownloadRequest, KeyValueStore, MediaRecordStore, OfflineMedia, QueueStore};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Public entry point for offline downloads
///
/// Cheap to clone; clones share the same registry and stores.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: DownloadConfig,
    files: FileManager,
    records: MediaRecordStore,
    queue: QueueStore,
    executor: TransferExecutor,
    registry: Mutex<DownloadTaskRegistry>,
    board: StatusBoard,
}

/// How a request enters the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Caller enqueue: persist to the queue, start from byte 0
    Fresh,
    /// Startup replay: already queued, keep the part file
    Replay,
}

impl DownloadManager {
    /// Build the manager and run startup reconciliation
    pub async fn start(
        config: DownloadConfig,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let files = FileManager::new(config.download_directory.clone());
        files.ensure_directory_exists(&config.download_directory).await?;
        let directory = tokio::fs::canonicalize(&config.download_directory)
            .await
            .map_err(|e| OfflineError::file_io("Failed to resolve download directory", &config.download_directory, e))?;

        let inner = Arc::new(ManagerInner {
            files: FileManager::new(directory),
            records: MediaRecordStore::new(store.clone()),
            queue: QueueStore::new(store),
            executor: TransferExecutor::new(fetcher),
            registry: Mutex::new(DownloadTaskRegistry::new()),
            board: StatusBoard::new(),
            config,
        });

        inner.reconcile().await?;

        tracing::info!(
            directory = %inner.files.download_directory().display(),
            "download manager started"
        );

        Ok(Self { inner })
    }

    /// Start downloading `request` unless its media id is already tracked
    ///
    /// A media id whose offline copy is complete is left alone; one that
    /// previously failed is retried from scratch.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<()> {
        validate_download_url(&request.download_url)?;
        self.inner.admit(request, Admission::Fresh).await
    }

    /// Stop the transfer for `media_id` at the next chunk boundary
    pub async fn pause(&self, media_id: &str) {
        let mut registry = self.inner.registry.lock().await;
        if let Some(task) = registry.get_mut(media_id) {
            if task.request_pause() {
                tracing::debug!(media_id, "pause requested");
            }
        }
    }

    /// Restart a paused transfer from the bytes already on disk
    pub async fn resume(&self, media_id: &str) {
        let mut registry = self.inner.registry.lock().await;
        let run = registry.next_run();

        let Some(task) = registry.get_mut(media_id) else {
            return;
        };
        if !task.paused || task.removing {
            return;
        }

        let cancel = task.restart(run);
        let previous = task.handle.take();

        let (bytes_downloaded, total_bytes) = match self.inner.board.get(media_id) {
            Some(DownloadStatus::Paused { bytes_downloaded, total_bytes, .. })
            | Some(DownloadStatus::InProgress { bytes_downloaded, total_bytes, .. }) => {
                (bytes_downloaded, total_bytes)
            }
            _ => (0, None),
        };
        self.inner.board.publish(DownloadStatus::InProgress {
            media_id: media_id.to_string(),
            bytes_downloaded,
            total_bytes,
        });

        task.handle = Some(self.inner.spawn_worker(media_id.to_string(), run, cancel, previous));
        tracing::debug!(media_id, run, "resume requested");
    }

    /// Cancel, delete files and forget `media_id` entirely
    pub async fn remove(&self, media_id: &str) -> Result<()> {
        let (handle, paths) = {
            let mut registry = self.inner.registry.lock().await;
            match registry.get_mut(media_id) {
                Some(task) if task.removing => return Ok(()),
                Some(task) => {
                    task.removing = true;
                    task.cancel.cancel();
                    (task.handle.take(), Some(task.paths.clone()))
                }
                None => (None, None),
            }
        };
        self.inner.board.clear(media_id);

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(media_id, error = %e, "download worker ended abnormally");
            }
        }

        let mut registry = self.inner.registry.lock().await;
        registry.remove(media_id);

        let record = self.inner.records.read(media_id).await?;
        if let Some(paths) = &paths {
            self.inner.delete_outputs(paths).await;
        }
        if let Some(record) = &record {
            let paths = MediaPaths::for_target(record.file_path.clone());
            self.inner.delete_outputs(&paths).await;
        }

        self.inner.records.remove(media_id).await?;
        self.inner.queue.remove(media_id).await?;
        self.inner.board.clear(media_id);

        tracing::info!(media_id, "download removed");
        Ok(())
    }

    /// Live map of every tracked media id to its latest status
    ///
    /// The receiver starts out holding the current map.
    pub fn statuses(&self) -> watch::Receiver<StatusMap> {
        self.inner.board.subscribe()
    }

    pub fn status(&self, media_id: &str) -> Option<DownloadStatus> {
        self.inner.board.get(media_id)
    }

    pub fn snapshot(&self) -> StatusMap {
        self.inner.board.snapshot()
    }

    /// All completed offline media
    pub async fn offline_media(&self) -> Result<Vec<OfflineMedia>> {
        self.inner.records.list().await
    }

    pub async fn offline_media_for(&self, media_id: &str) -> Result<Option<OfflineMedia>> {
        self.inner.records.read(media_id).await
    }

    /// Requests persisted in the queue, oldest first
    pub async fn queued_requests(&self) -> Result<Vec<DownloadRequest>> {
        self.inner.queue.all().await
    }

    /// Pause every active transfer and wait for the workers to settle
    ///
    /// Queue entries stay persisted, so the next `start` picks them up again.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut registry = self.inner.registry.lock().await;
            if registry.is_empty() {
                tracing::info!("download manager shut down with no tasks");
                return;
            }
            tracing::debug!(tasks = registry.len(), "pausing download tasks for shutdown");
            registry
                .tasks_mut()
                .filter_map(|task| {
                    task.request_pause();
                    task.handle.take()
                })
                .collect()
        };

        let grace = self.inner.config.shutdown_grace();
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "download workers did not stop in time");
        }

        tracing::info!("download manager shut down");
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }
}

impl ManagerInner {
    async fn reconcile(self: &Arc<Self>) -> Result<()> {
        let mut completed = HashSet::new();

        for record in self.records.list().await? {
            if FileManager::file_exists(&record.file_path).await {
                let bytes = match record.size_bytes {
                    Some(size) => size,
                    None => FileManager::file_len(&record.file_path).await?,
                };
                self.board.publish(DownloadStatus::Completed {
                    media_id: record.media_id.clone(),
                    file_path: record.file_path.clone(),
                    bytes_downloaded: bytes,
                });
                completed.insert(record.media_id);
            } else {
                tracing::warn!(
                    media_id = %record.media_id,
                    path = %record.file_path.display(),
                    "offline file missing, dropping record"
                );
                self.records.remove(&record.media_id).await?;
            }
        }

        for request in self.queue.all().await? {
            if completed.contains(&request.media_id) {
                tracing::debug!(media_id = %request.media_id, "dropping queue entry for completed media");
                self.queue.remove(&request.media_id).await?;
                continue;
            }
            self.admit(request, Admission::Replay).await?;
        }

        Ok(())
    }

    /// Register a task for `request` and spawn its first worker
    async fn admit(self: &Arc<Self>, request: DownloadRequest, admission: Admission) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let media_id = request.media_id.clone();

        if registry.contains(&media_id) {
            return Ok(());
        }
        if let Some(DownloadStatus::Completed { .. }) = self.board.get(&media_id) {
            return Ok(());
        }

        let paths = MediaPaths::new(
            self.files.download_directory(),
            &media_id,
            request.mime_type.as_deref(),
            &self.config.fallback_extension,
        );
        self.files.ensure_parent_exists(&paths.target).await?;

        if admission == Admission::Fresh {
            self.queue.put(&request).await?;
            self.files.safe_delete(&paths.partial).await?;
        }

        let run = registry.next_run();
        let mut task = DownloadTask::new(request, paths, run);
        let cancel = task.cancel.clone();
        task.handle = Some(self.spawn_worker(media_id.clone(), run, cancel, None));
        registry.insert(task);

        self.board.publish(DownloadStatus::Queued {
            media_id: media_id.clone(),
        });
        tracing::debug!(media_id = %media_id, run, ?admission, "download queued");
        Ok(())
    }

    fn spawn_worker(
        self: &Arc<Self>,
        media_id: String,
        run: u64,
        cancel: CancellationToken,
        previous: Option<JoinHandle<()>>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // The previous run must release the part file first
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            inner.run_worker(media_id, run, cancel).await;
        })
    }

    async fn run_worker(&self, media_id: String, run: u64, cancel: CancellationToken) {
        let (request, paths, resume_token) = {
            let registry = self.registry.lock().await;
            match registry.get(&media_id) {
                Some(task) if task.run == run && !task.removing => (
                    task.request.clone(),
                    task.paths.clone(),
                    task.resume_token.clone(),
                ),
                _ => return,
            }
        };

        let resume_offset = match FileManager::file_len(&paths.partial).await {
            Ok(len) => len,
            Err(e) => {
                self.finish_failed(&media_id, run, &paths, e).await;
                return;
            }
        };

        tracing::debug!(media_id = %media_id, run, resume_offset, "transfer starting");

        let sink = RunProgress {
            inner: self,
            media_id: &media_id,
            run,
        };
        let known_total = match self.board.get(&media_id) {
            Some(DownloadStatus::Paused { total_bytes, .. })
            | Some(DownloadStatus::InProgress { total_bytes, .. }) => total_bytes,
            _ => None,
        };
        let job = TransferJob {
            request: &request,
            partial_path: &paths.partial,
            resume_offset,
            resume_token: resume_token.as_deref(),
            known_total,
        };

        match self.executor.execute(job, &sink, &cancel).await {
            Ok(TransferOutcome::Completed { checksum, bytes }) => {
                self.finish_completed(&request, run, &paths, checksum, bytes).await;
            }
            Ok(TransferOutcome::Paused {
                bytes_downloaded,
                total_bytes,
                resume_token,
            }) => {
                self.finish_paused(&media_id, run, bytes_downloaded, total_bytes, resume_token)
                    .await;
            }
            Err(e) => self.finish_failed(&media_id, run, &paths, e).await,
        }
    }

    async fn finish_completed(
        &self,
        request: &DownloadRequest,
        run: u64,
        paths: &MediaPaths,
        checksum: Option<String>,
        bytes: u64,
    ) {
        let media_id = request.media_id.as_str();
        let mut registry = self.registry.lock().await;
        if !registry.is_current(media_id, run) {
            return;
        }

        let record = OfflineMedia {
            media_id: media_id.to_string(),
            file_path: paths.target.clone(),
            mime_type: request.mime_type.clone(),
            checksum_sha256: checksum,
            size_bytes: Some(bytes),
            completed_at: Some(Utc::now()),
        };

        if let Err(e) = self.place(paths, &record).await {
            drop(registry);
            self.finish_failed(media_id, run, paths, e).await;
            return;
        }

        registry.remove(media_id);
        self.board.publish(DownloadStatus::Completed {
            media_id: media_id.to_string(),
            file_path: paths.target.clone(),
            bytes_downloaded: bytes,
        });

        tracing::info!(media_id, bytes, path = %paths.target.display(), "download completed");
    }

    /// Move the verified part file into place and swap queue entry for record
    async fn place(&self, paths: &MediaPaths, record: &OfflineMedia) -> Result<()> {
        self.files.safe_move(&paths.partial, &paths.target).await?;
        self.records.write(record).await?;
        self.queue.remove(&record.media_id).await
    }

    async fn finish_paused(
        &self,
        media_id: &str,
        run: u64,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        resume_token: Option<String>,
    ) {
        let mut registry = self.registry.lock().await;
        if !registry.is_current(media_id, run) {
            return;
        }
        if let Some(task) = registry.get_mut(media_id) {
            task.paused = true;
            task.resume_token = resume_token;
        }

        self.board.publish(DownloadStatus::Paused {
            media_id: media_id.to_string(),
            bytes_downloaded,
            total_bytes,
        });
        tracing::info!(media_id, bytes_downloaded, "download paused");
    }

    async fn finish_failed(&self, media_id: &str, run: u64, paths: &MediaPaths, error: OfflineError) {
        let mut registry = self.registry.lock().await;
        if !registry.is_current(media_id, run) {
            return;
        }

        tracing::warn!(media_id, error = %error, "download failed");

        self.delete_outputs(paths).await;
        if let Err(e) = self.records.remove(media_id).await {
            tracing::warn!(media_id, error = %e, "failed to remove offline record");
        }
        if let Err(e) = self.queue.remove(media_id).await {
            tracing::warn!(media_id, error = %e, "failed to remove queue entry");
        }

        registry.remove(media_id);
        self.board.publish(DownloadStatus::Failed {
            media_id: media_id.to_string(),
            cause: error.to_string(),
        });
    }

    /// Best-effort deletion of both the part file and the target
    async fn delete_outputs(&self, paths: &MediaPaths) {
        for path in [&paths.partial, &paths.target] {
            if let Err(e) = self.files.safe_delete(path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete download file");
            }
        }
    }
}

/// Publishes `InProgress` for one worker run
struct RunProgress<'a> {
    inner: &'a ManagerInner,
    media_id: &'a str,
    run: u64,
}

#[async_trait]
impl<'a> ProgressSink for RunProgress<'a> {
    async fn report(&self, bytes_downloaded: u64, total_bytes: Option<u64>) {
        let registry = self.inner.registry.lock().await;
        if registry.is_transferring(self.media_id, self.run) {
            self.inner.board.publish(DownloadStatus::InProgress {
                media_id: self.media_id.to_string(),
                bytes_downloaded,
                total_bytes,
            });
        }
    }
}

/// Only absolute http(s) URLs can be fetched
fn validate_download_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| OfflineError::InvalidDownloadUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(OfflineError::InvalidDownloadUrl(format!(
            "{}: unsupported scheme '{}'",
            raw, scheme
        ))),
    }
}

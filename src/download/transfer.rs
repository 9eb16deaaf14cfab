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


//! Per-task transfer loop
//!
//! Moves bytes from a request's URL into its staged `.part` file, starting at
//! a resume offset, and reports progress after every chunk. Cancellation is
//! cooperative: the loop watches a `CancellationToken` between chunks and
//! returns `TransferOutcome::Paused` with the bytes already on disk.
//!
//! # Resume Handling
//! - `206 Partial Content` must start exactly at the requested offset
//! - `200 OK` on a ranged request means the server ignored the range (or the
//!   `If-Range` validator no longer matched); the part file is truncated and
//!   the transfer restarts from byte 0
//! - `416 Range Not Satisfiable` with `bytes */N` where `N` equals the offset
//!   means the part file already holds everything; it goes straight to
//!   verification
//!
//! Integrity checks (declared length, expected size, SHA-256) run after the
//! file has been synced. The executor leaves the verified bytes in the part
//! file; moving them onto the target path is the caller's job.

use crate::download::checksum::ChecksumVerifier;
use crate::download::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::error::{OfflineError, Result};
use crate::file::FileManager;
use crate::storage::models::DownloadRequest;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

/// Buffer size for file writes (64 KiB)
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Buffer size used when re-hashing an existing prefix
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// One transfer attempt
#[derive(Debug, Clone, Copy)]
pub struct TransferJob<'a> {
    pub request: &'a DownloadRequest,
    /// Staged output file
    pub partial_path: &'a Path,
    /// Bytes already in the part file that should be kept
    pub resume_offset: u64,
    /// Validator from the attempt that was paused, if any
    pub resume_token: Option<&'a str>,
    /// Total size learned by an earlier attempt
    pub known_total: Option<u64>,
}

/// How a transfer attempt ended (errors are returned separately)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes are in the part file and passed verification
    Completed {
        /// Computed digest, only when the request carried a checksum
        checksum: Option<String>,
        bytes: u64,
    },
    /// Cancelled cooperatively; the part file keeps `bytes_downloaded` bytes
    Paused {
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        resume_token: Option<String>,
    },
}

/// Receiver for progress updates
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, bytes_downloaded: u64, total_bytes: Option<u64>);
}

/// Sink that drops every update
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _bytes_downloaded: u64, _total_bytes: Option<u64>) {}
}

/// Where the response body lands in the part file
struct BodyPlan {
    start: u64,
    total: Option<u64>,
    /// False when the part file is already complete (416)
    stream_body: bool,
}

/// Runs transfers through a shared `Fetcher`
#[derive(Clone)]
pub struct TransferExecutor {
    fetcher: Arc<dyn Fetcher>,
}

impl TransferExecutor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Run one transfer attempt to completion, pause or failure
    pub async fn execute(
        &self,
        job: TransferJob<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let request = job.request;
        let paused_before_start = || TransferOutcome::Paused {
            bytes_downloaded: job.resume_offset,
            total_bytes: job.known_total,
            resume_token: job.resume_token.map(str::to_string),
        };

        if cancel.is_cancelled() {
            return Ok(paused_before_start());
        }

        let range_start = (job.resume_offset > 0).then_some(job.resume_offset);
        let fetch = FetchRequest {
            url: &request.download_url,
            headers: &request.headers,
            range_start,
            if_range: range_start.and(job.resume_token),
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(paused_before_start()),
            response = self.fetcher.fetch(fetch) => response?,
        };

        let plan = plan_body(&request.download_url, range_start, &response)?;
        let resume_token = response.etag.clone();

        tracing::debug!(
            media_id = %request.media_id,
            status = response.status,
            start = plan.start,
            total = ?plan.total,
            "transfer response received"
        );

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(job.partial_path)
            .await
            .map_err(|e| OfflineError::file_io("Failed to open part file", job.partial_path, e))?;

        let mut verifier = match request.checksum_sha256 {
            Some(_) => Some(hash_prefix(job.partial_path, plan.start).await?),
            None => None,
        };

        file.set_len(plan.start)
            .await
            .map_err(|e| OfflineError::file_io("Failed to truncate part file", job.partial_path, e))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        writer
            .seek(SeekFrom::Start(plan.start))
            .await
            .map_err(|e| OfflineError::file_io("Failed to seek part file", job.partial_path, e))?;

        let mut downloaded = plan.start;
        progress.report(downloaded, plan.total).await;

        if plan.stream_body {
            let mut body = response.body;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                };

                let chunk = match next {
                    Some(Some(chunk)) => chunk?,
                    Some(None) => break,
                    None => {
                        close(writer, job.partial_path).await?;
                        return Ok(TransferOutcome::Paused {
                            bytes_downloaded: downloaded,
                            total_bytes: plan.total,
                            resume_token,
                        });
                    }
                };

                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| OfflineError::file_io("Failed to write part file", job.partial_path, e))?;
                if let Some(verifier) = verifier.as_mut() {
                    verifier.update(&chunk);
                }
                downloaded += chunk.len() as u64;
                progress.report(downloaded, plan.total).await;
            }
        }

        close(writer, job.partial_path).await?;

        if let Some(total) = plan.total {
            if downloaded < total {
                return Err(OfflineError::DownloadIncomplete {
                    received: downloaded,
                    expected: total,
                });
            }
        }

        let actual = FileManager::file_len(job.partial_path).await?;
        let expected = request.expected_size_bytes.or(plan.total);
        if let Some(expected) = expected {
            if actual != expected {
                return Err(OfflineError::FileSizeMismatch { expected, actual });
            }
        }

        let checksum = match (verifier, request.checksum_sha256.as_deref()) {
            (Some(verifier), Some(expected)) => Some(verifier.verify(expected)?),
            _ => None,
        };

        Ok(TransferOutcome::Completed {
            checksum,
            bytes: actual,
        })
    }
}

/// Decide where the body goes from the response head
fn plan_body(url: &str, range_start: Option<u64>, response: &FetchResponse) -> Result<BodyPlan> {
    match response.status {
        200 => {
            if let Some(offset) = range_start {
                tracing::info!(offset, "server ignored range request, restarting from byte 0");
            }
            Ok(BodyPlan {
                start: 0,
                total: response.content_length,
                stream_body: true,
            })
        }
        206 => {
            let requested = range_start.unwrap_or(0);
            let range = response.content_range.ok_or_else(|| {
                OfflineError::network_error("Partial content response without Content-Range", false)
            })?;
            let actual = range.start().ok_or(OfflineError::UnexpectedContentRange {
                requested,
                actual: 0,
            })?;
            if actual != requested {
                return Err(OfflineError::UnexpectedContentRange { requested, actual });
            }
            let total = match (range.total, response.content_length) {
                (Some(total), _) => Some(total),
                (None, Some(len)) => Some(len.checked_add(requested).ok_or_else(|| {
                    OfflineError::network_error("Content-Length overflows resume offset", false)
                })?),
                (None, None) => None,
            };
            Ok(BodyPlan {
                start: requested,
                total,
                stream_body: true,
            })
        }
        416 => match (range_start, response.content_range.and_then(|r| r.total)) {
            (Some(offset), Some(total)) if offset == total => Ok(BodyPlan {
                start: offset,
                total: Some(total),
                stream_body: false,
            }),
            _ => Err(OfflineError::UnexpectedStatusCode {
                status_code: 416,
                url: url.to_string(),
            }),
        },
        status_code => Err(OfflineError::UnexpectedStatusCode {
            status_code,
            url: url.to_string(),
        }),
    }
}

/// Seed a verifier with the first `len` bytes already in the part file
async fn hash_prefix(path: &Path, len: u64) -> Result<ChecksumVerifier> {
    let mut verifier = ChecksumVerifier::new();
    if len == 0 {
        return Ok(verifier);
    }

    let file = File::open(path)
        .await
        .map_err(|e| OfflineError::file_io("Failed to open part file", path, e))?;
    let mut reader = file.take(len);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| OfflineError::file_io("Failed to read part file", path, e))?;
        if read == 0 {
            break;
        }
        verifier.update(&buffer[..read]);
    }

    if verifier.bytes_hashed() != len {
        return Err(OfflineError::DownloadIncomplete {
            received: verifier.bytes_hashed(),
            expected: len,
        });
    }

    Ok(verifier)
}

/// Flush buffered bytes and sync them to durable storage
async fn close(mut writer: BufWriter<File>, path: &Path) -> Result<()> {
    writer
        .flush()
        .await
        .map_err(|e| OfflineError::file_io("Failed to flush part file", path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| OfflineError::file_io("Failed to sync part file", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fetch::{ByteStream, ContentRange};
    use bytes::Bytes;
    use futures_util::stream;
    use sha2::{Digest, Sha256};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves `content` honoring `Range` unless told otherwise
    struct StaticFetcher {
        content: Vec<u8>,
        chunk: usize,
        honor_range: bool,
        etag: Option<String>,
        seen: Mutex<Vec<(Option<u64>, Option<String>)>>,
    }

    impl StaticFetcher {
        fn new(content: Vec<u8>) -> Self {
            Self {
                content,
                chunk: 100,
                honor_range: true,
                etag: Some("\"v1\"".to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((request.range_start, request.if_range.map(str::to_string)));

            let total = self.content.len() as u64;
            let start = match request.range_start {
                Some(start) if self.honor_range => start,
                _ => 0,
            };

            if start >= total && request.range_start.is_some() && self.honor_range {
                return Ok(FetchResponse {
                    status: 416,
                    content_length: Some(0),
                    content_range: ContentRange::parse(&format!("bytes */{}", total)),
                    etag: self.etag.clone(),
                    body: stream::empty().boxed(),
                });
            }

            let body: Vec<Result<Bytes>> = self.content[start as usize..]
                .chunks(self.chunk)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            let body: ByteStream = stream::iter(body).boxed();

            let ranged = request.range_start.is_some() && self.honor_range;
            Ok(FetchResponse {
                status: if ranged { 206 } else { 200 },
                content_length: Some(total - start),
                content_range: ranged
                    .then(|| ContentRange::parse(&format!("bytes {}-{}/{}", start, total - 1, total)))
                    .flatten(),
                etag: self.etag.clone(),
                body,
            })
        }
    }

    /// Records every report and cancels once `cancel_at` is reached
    struct RecordingSink {
        reports: Mutex<Vec<u64>>,
        cancel_at: Option<(u64, CancellationToken)>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, bytes_downloaded: u64, _total_bytes: Option<u64>) {
            self.reports.lock().unwrap().push(bytes_downloaded);
            if let Some((at, token)) = &self.cancel_at {
                if bytes_downloaded >= *at {
                    token.cancel();
                }
            }
        }
    }

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[tokio::test]
    async fn test_full_transfer_reports_progress() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m1.mp4.part");
        let data = content(1000);
        let executor = TransferExecutor::new(Arc::new(StaticFetcher::new(data.clone())));
        let request = DownloadRequest::new("m1", "http://x/f.mp4").with_expected_size(1000);
        let sink = RecordingSink { reports: Mutex::new(Vec::new()), cancel_at: None };

        let outcome = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 0, resume_token: None, known_total: None },
                &sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, TransferOutcome::Completed { checksum: None, bytes: 1000 });
        assert_eq!(tokio::fs::read(&part).await.unwrap(), data);

        let reports = sink.reports.lock().unwrap().clone();
        assert_eq!(reports.first(), Some(&0));
        assert_eq!(reports.last(), Some(&1000));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_pause_then_resume_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m2.part");
        let data = content(1000);
        let fetcher = Arc::new(StaticFetcher::new(data.clone()));
        let executor = TransferExecutor::new(fetcher.clone());
        let request = DownloadRequest::new("m2", "http://x/f.mp4").with_checksum(sha256_hex(&data));

        let cancel = CancellationToken::new();
        let sink = RecordingSink {
            reports: Mutex::new(Vec::new()),
            cancel_at: Some((300, cancel.clone())),
        };
        let first = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 0, resume_token: None, known_total: None },
                &sink,
                &cancel,
            )
            .await
            .unwrap();

        let TransferOutcome::Paused { bytes_downloaded, total_bytes, resume_token } = first else {
            panic!("expected the first attempt to pause");
        };
        assert_eq!(bytes_downloaded, 300);
        assert_eq!(total_bytes, Some(1000));
        assert_eq!(tokio::fs::metadata(&part).await.unwrap().len(), 300);

        let second = executor
            .execute(
                TransferJob {
                    request: &request,
                    partial_path: &part,
                    resume_offset: bytes_downloaded,
                    resume_token: resume_token.as_deref(),
                    known_total: total_bytes,
                },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            second,
            TransferOutcome::Completed { checksum: Some(sha256_hex(&data)), bytes: 1000 }
        );
        assert_eq!(tokio::fs::read(&part).await.unwrap(), data);

        let seen = fetcher.seen.lock().unwrap().clone();
        assert_eq!(seen[1], (Some(300), Some("\"v1\"".to_string())));
    }

    #[tokio::test]
    async fn test_ignored_range_restarts_from_zero() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m.part");
        let data = content(500);
        tokio::fs::write(&part, vec![0xAAu8; 200]).await.unwrap();

        let mut fetcher = StaticFetcher::new(data.clone());
        fetcher.honor_range = false;
        let executor = TransferExecutor::new(Arc::new(fetcher));
        let request = DownloadRequest::new("m", "http://x/f").with_checksum(sha256_hex(&data));

        let outcome = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 200, resume_token: None, known_total: None },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, TransferOutcome::Completed { bytes: 500, .. }));
        assert_eq!(tokio::fs::read(&part).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_already_complete_part_file_is_verified() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m.part");
        let data = content(400);
        tokio::fs::write(&part, &data).await.unwrap();

        let executor = TransferExecutor::new(Arc::new(StaticFetcher::new(data.clone())));
        let request = DownloadRequest::new("m", "http://x/f").with_checksum(sha256_hex(&data));

        let outcome = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 400, resume_token: None, known_total: None },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::Completed { checksum: Some(sha256_hex(&data)), bytes: 400 }
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m3.part");
        let executor = TransferExecutor::new(Arc::new(StaticFetcher::new(content(1000))));
        let request = DownloadRequest::new("m3", "http://x/f").with_checksum("deadbeef");

        let err = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 0, resume_token: None, known_total: None },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OfflineError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_expected_size_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m.part");
        let executor = TransferExecutor::new(Arc::new(StaticFetcher::new(content(1000))));
        let request = DownloadRequest::new("m", "http://x/f").with_expected_size(999);

        let err = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 0, resume_token: None, known_total: None },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OfflineError::FileSizeMismatch { expected: 999, actual: 1000 }));
    }

    #[tokio::test]
    async fn test_empty_response_completes() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("empty.part");
        let executor = TransferExecutor::new(Arc::new(StaticFetcher::new(Vec::new())));
        let request = DownloadRequest::new("empty", "http://x/f");

        let outcome = executor
            .execute(
                TransferJob { request: &request, partial_path: &part, resume_offset: 0, resume_token: None, known_total: None },
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, TransferOutcome::Completed { checksum: None, bytes: 0 });
        assert!(part.exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_keeps_known_total() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("m.part");
        let fetcher = Arc::new(StaticFetcher::new(content(10)));
        let executor = TransferExecutor::new(fetcher.clone());
        let request = DownloadRequest::new("m", "http://x/f");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = executor
            .execute(
                TransferJob {
                    request: &request,
                    partial_path: &part,
                    resume_offset: 7,
                    resume_token: Some("t"),
                    known_total: Some(10),
                },
                &NoProgress,
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::Paused {
                bytes_downloaded: 7,
                total_bytes: Some(10),
                resume_token: Some("t".to_string()),
            }
        );
        assert!(fetcher.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_misaligned_partial_content() {
        let response = FetchResponse {
            status: 206,
            content_length: Some(10),
            content_range: ContentRange::parse("bytes 0-9/10"),
            etag: None,
            body: stream::empty().boxed(),
        };
        let err = plan_body("http://x/f", Some(5), &response).err().unwrap();
        assert!(matches!(err, OfflineError::UnexpectedContentRange { requested: 5, actual: 0 }));
    }

    #[test]
    fn test_plan_rejects_overflowing_length() {
        let response = FetchResponse {
            status: 206,
            content_length: Some(u64::MAX),
            content_range: ContentRange::parse("bytes 5-14/*"),
            etag: None,
            body: stream::empty().boxed(),
        };
        let err = plan_body("http://x/f", Some(5), &response).err().unwrap();
        assert!(matches!(err, OfflineError::NetworkError { is_transient: false, .. }));
    }

    #[test]
    fn test_plan_rejects_unexpected_status() {
        let response = FetchResponse {
            status: 404,
            content_length: None,
            content_range: None,
            etag: None,
            body: stream::empty().boxed(),
        };
        let err = plan_body("http://x/f", None, &response).err().unwrap();
        assert!(matches!(err, OfflineError::UnexpectedStatusCode { status_code: 404, .. }));
    }
}

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


//! HTTP fetch capability used by the transfer executor
//!
//! The executor only needs "GET this URL with these headers, optionally from
//! byte N" and a stream of body chunks back. `Fetcher` is that seam;
//! `ReqwestFetcher` is the portable implementation. Hosts that must go
//! through a platform download API can plug in their own.
//!
//! # Resume Mechanism
//! 1. Send `Range: bytes={offset}-` (plus `If-Range: {etag}` when known)
//! 2. `206 Partial Content` with `Content-Range: bytes {offset}-{end}/{total}`
//!    continues the file
//! 3. `200 OK` means the server ignored the range (or the resource changed)
//!    and is serving from byte 0

use crate::config::DownloadConfig;
use crate::error::{OfflineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, ETAG, IF_RANGE, RANGE};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Body of a fetch response, one item per received chunk
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One GET, possibly ranged
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub headers: &'a HashMap<String, String>,
    /// First byte wanted; `None` fetches the whole resource
    pub range_start: Option<u64>,
    /// Validator from a previous response (ETag), sent as `If-Range`
    pub if_range: Option<&'a str>,
}

/// Response head plus streaming body
pub struct FetchResponse {
    pub status: u16,
    /// Length of this response body, if declared
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    /// Opaque validator usable as a resume token
    pub etag: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .field("etag", &self.etag)
            .finish_non_exhaustive()
    }
}

/// Parsed `Content-Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive byte span; `None` for `bytes */total` (416 responses)
    pub span: Option<(u64, u64)>,
    /// Complete resource length, `None` for `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes a-b/total`, `bytes a-b/*` or `bytes */total`
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().ok()?),
        };

        let span = match range.trim() {
            "*" => None,
            r => {
                let (start, end) = r.split_once('-')?;
                let start = start.trim().parse::<u64>().ok()?;
                let end = end.trim().parse::<u64>().ok()?;
                if end < start {
                    return None;
                }
                Some((start, end))
            }
        };

        if span.is_none() && total.is_none() {
            return None;
        }

        Some(Self { span, total })
    }

    pub fn start(&self) -> Option<u64> {
        self.span.map(|(start, _)| start)
    }
}

/// Generic "fetch bytes from URL" capability
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchResponse>;
}

/// `Fetcher` over a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    read_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(client: Client, read_timeout: Duration) -> Self {
        Self { client, read_timeout }
    }

    /// Build a client with the configured timeouts and user agent
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout());
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        Ok(Self::new(builder.build()?, config.read_timeout()))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchResponse> {
        let mut builder = self.client.get(request.url);

        // Ranging belongs to the executor
        for (key, value) in request.headers {
            let lower = key.to_ascii_lowercase();
            if lower != "range" && lower != "if-range" {
                builder = builder.header(key.as_str(), value.as_str());
            }
        }

        if let Some(start) = request.range_start {
            builder = builder.header(RANGE, format!("bytes={}-", start));
            if let Some(validator) = request.if_range {
                builder = builder.header(IF_RANGE, validator);
            }
        }

        let response = builder.send().await.map_err(|e| {
            OfflineError::network_error(
                format!("Request failed: {}", e),
                e.is_timeout() || e.is_connect(),
            )
        })?;

        let headers = response.headers();
        let content_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse);
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            content_range,
            etag,
            body: with_read_timeout(response.bytes_stream(), self.read_timeout),
        })
    }
}

/// Fail the body stream when no chunk arrives within `timeout`
fn with_read_timeout<S>(inner: S, timeout: Duration) -> ByteStream
where
    S: futures_util::Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    stream::unfold(Some(Box::pin(inner)), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(timeout, inner.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
            Ok(Some(Err(e))) => Some((
                Err(OfflineError::network_error(format!("Stream error: {}", e), true)),
                None,
            )),
            Ok(None) => None,
            Err(_) => Some((
                Err(OfflineError::network_error(
                    format!("No data received for {} seconds", timeout.as_secs()),
                    true,
                )),
                None,
            )),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_content_range() {
        let range = ContentRange::parse("bytes 300-999/1000").unwrap();
        assert_eq!(range.span, Some((300, 999)));
        assert_eq!(range.total, Some(1000));
        assert_eq!(range.start(), Some(300));
    }

    #[test]
    fn test_parse_unknown_total() {
        let range = ContentRange::parse("bytes 0-99/*").unwrap();
        assert_eq!(range.span, Some((0, 99)));
        assert_eq!(range.total, None);
    }

    #[test]
    fn test_parse_unsatisfied_range() {
        let range = ContentRange::parse("bytes */1000").unwrap();
        assert_eq!(range.span, None);
        assert_eq!(range.total, Some(1000));
        assert_eq!(range.start(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(ContentRange::parse("bytes */*"), None);
        assert_eq!(ContentRange::parse("items 0-1/2"), None);
        assert_eq!(ContentRange::parse("bytes 5-1/10"), None);
        assert_eq!(ContentRange::parse("bytes a-b/10"), None);
        assert_eq!(ContentRange::parse(""), None);
    }

    #[tokio::test]
    async fn test_read_timeout_fails_stalled_stream() {
        let stalled = stream::pending::<reqwest::Result<Bytes>>();
        let mut body = with_read_timeout(stalled, Duration::from_millis(10));
        let first = body.next().await.unwrap();
        assert!(matches!(first, Err(OfflineError::NetworkError { is_transient: true, .. })));
        assert!(body.next().await.is_none());
    }

    #[test]
    fn test_fetcher_from_config() {
        let config = DownloadConfig::default();
        assert!(ReqwestFetcher::from_config(&config).is_ok());
    }
}

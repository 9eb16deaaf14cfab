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


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use offline_media_core::logging::init_logging;
use offline_media_core::{
    Database, DownloadConfig, DownloadManager, DownloadRequest, DownloadStatus, ReqwestFetcher,
    SqliteKeyValueStore,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "offline-media-cli")]
#[command(about = "Offline media CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Download directory (overrides the configuration file)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// SQLite database path (overrides the configuration file)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file and follow its progress (Ctrl-C pauses)
    Fetch {
        /// Media id
        media_id: String,
        /// Download URL
        url: String,
        /// MIME type, used to pick the file extension
        #[arg(short, long)]
        mime: Option<String>,
        /// Expected size in bytes
        #[arg(short, long)]
        size: Option<u64>,
        /// Expected SHA-256 (hex)
        #[arg(long)]
        sha256: Option<String>,
        /// Extra request header as "Name: value"
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// List completed offline media
    List,
    /// List pending download requests
    Queue,
    /// Remove a download and its files
    Remove {
        /// Media id
        media_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(None);
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DownloadConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => DownloadConfig::default(),
    };
    if let Some(dir) = cli.dir {
        config = DownloadConfig {
            database_path: dir.join("downloads.db"),
            download_directory: dir,
            ..config
        };
    }
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let db = Database::new(&config.database_path)
        .await
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let store = Arc::new(SqliteKeyValueStore::new(&db));
    let fetcher = Arc::new(ReqwestFetcher::from_config(&config)?);
    let manager = DownloadManager::start(config, store, fetcher).await?;

    match cli.command {
        Commands::Fetch {
            media_id,
            url,
            mime,
            size,
            sha256,
            headers,
        } => {
            let mut request = DownloadRequest::new(&media_id, url);
            request.mime_type = mime;
            request.expected_size_bytes = size;
            request.checksum_sha256 = sha256;
            for header in &headers {
                let Some((name, value)) = header.split_once(':') else {
                    bail!("invalid header '{}', expected \"Name: value\"", header);
                };
                request = request.with_header(name.trim(), value.trim());
            }

            manager.enqueue(request).await?;
            follow(&manager, &media_id).await?;
        }
        Commands::List => {
            let records = manager.offline_media().await?;
            if records.is_empty() {
                println!("No offline media");
            }
            for record in records {
                println!(
                    "{}\t{}\t{} bytes",
                    record.media_id,
                    record.file_path.display(),
                    record.size_bytes.unwrap_or_default()
                );
            }
        }
        Commands::Queue => {
            let pending = manager.queued_requests().await?;
            if pending.is_empty() {
                println!("Queue is empty");
            }
            for request in pending {
                println!("{}\t{}", request.media_id, request.download_url);
            }
        }
        Commands::Remove { media_id } => {
            manager.remove(&media_id).await?;
            println!("Removed {}", media_id);
        }
    }

    manager.shutdown().await;
    db.close().await?;
    Ok(())
}

/// Print status changes for `media_id` until it reaches a terminal state
async fn follow(manager: &DownloadManager, media_id: &str) -> anyhow::Result<()> {
    let mut statuses = manager.statuses();

    loop {
        let status = statuses.borrow_and_update().get(media_id).cloned();
        match status {
            Some(DownloadStatus::Completed { file_path, bytes_downloaded, .. }) => {
                println!("Completed: {} ({} bytes)", file_path.display(), bytes_downloaded);
                return Ok(());
            }
            Some(DownloadStatus::Failed { cause, .. }) => bail!("download failed: {}", cause),
            Some(status) => match status.progress_fraction() {
                Some(fraction) => println!(
                    "{:>5.1}%  {} bytes",
                    fraction * 100.0,
                    status.bytes_downloaded()
                ),
                None => println!("{} bytes", status.bytes_downloaded()),
            },
            None => {}
        }

        tokio::select! {
            changed = statuses.changed() => changed.context("download manager stopped")?,
            _ = tokio::signal::ctrl_c() => {
                manager.pause(media_id).await;
                println!("Paused; run the same command again to resume");
                return Ok(());
            }
        }
    }
}

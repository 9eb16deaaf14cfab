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


//! Download subsystem configuration
//!
//! Settings are stored as JSON. Missing keys fall back to their defaults so
//! older config files keep loading after new settings are added.

use crate::error::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory that receives completed and partial media files
    #[serde(default = "default_download_directory")]
    pub download_directory: PathBuf,

    /// SQLite file backing the record and queue stores
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Extension used when the mime type is missing or unknown
    #[serde(default = "default_fallback_extension")]
    pub fallback_extension: String,

    /// TCP/TLS connect timeout for the HTTP transport
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum silence between body chunks before the transfer fails
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// User-Agent sent when the request headers don't carry one
    #[serde(default)]
    pub user_agent: Option<String>,

    /// How long `shutdown` waits for transfers to acknowledge the pause
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_download_directory() -> PathBuf {
    PathBuf::from("offline")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("offline/downloads.db")
}

fn default_fallback_extension() -> String {
    "bin".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            database_path: default_database_path(),
            fallback_extension: default_fallback_extension(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl DownloadConfig {
    /// Config rooted at `directory`, with the database stored inside it
    pub fn with_directory<P: Into<PathBuf>>(directory: P) -> Self {
        let download_directory = directory.into();
        Self {
            database_path: download_directory.join("downloads.db"),
            download_directory,
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| OfflineError::file_io("Failed to read config", path, e))?;
        let config: DownloadConfig = serde_json::from_str(&content).map_err(|e| {
            OfflineError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty JSON, creating the parent directory
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OfflineError::file_io("Failed to create", parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .await
            .map_err(|e| OfflineError::file_io("Failed to write config", path, e))?;
        Ok(())
    }

    /// Reject settings the download manager cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.download_directory.as_os_str().is_empty() {
            return Err(OfflineError::InvalidConfiguration(
                "download_directory must not be empty".to_string(),
            ));
        }
        let ext = self.fallback_extension.as_str();
        if ext.is_empty() || ext.contains('.') || ext.contains('/') || ext.contains('\\') {
            return Err(OfflineError::InvalidConfiguration(format!(
                "fallback_extension must be a bare extension, got '{}'",
                ext
            )));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(OfflineError::InvalidConfiguration(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

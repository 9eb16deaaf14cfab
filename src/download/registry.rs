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


//! In-memory task bookkeeping
//!
//! The registry is the authority on "is this media currently being fetched".
//! It lives behind the manager's single mutex; nothing here locks on its own.
//!
//! Every spawned worker is stamped with a run number. A worker may only touch
//! its task (publish progress, finish, fail) while the task still carries that
//! run and is not being removed, so outcomes from a superseded worker are
//! dropped instead of racing the one that replaced it.

use crate::file::MediaPaths;
use crate::storage::models::DownloadRequest;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Working state for one tracked media id
#[derive(Debug)]
pub struct DownloadTask {
    pub request: DownloadRequest,
    pub paths: MediaPaths,
    /// Run number of the worker that currently owns the task
    pub run: u64,
    pub cancel: CancellationToken,
    pub paused: bool,
    /// Set while `remove` waits for the worker to let go
    pub removing: bool,
    pub handle: Option<JoinHandle<()>>,
    /// ETag captured at the last pause
    pub resume_token: Option<String>,
}

impl DownloadTask {
    pub fn new(request: DownloadRequest, paths: MediaPaths, run: u64) -> Self {
        Self {
            request,
            paths,
            run,
            cancel: CancellationToken::new(),
            paused: false,
            removing: false,
            handle: None,
            resume_token: None,
        }
    }

    pub fn media_id(&self) -> &str {
        &self.request.media_id
    }

    /// Hand the task to a new run; returns the token the new worker watches
    pub fn restart(&mut self, run: u64) -> CancellationToken {
        self.run = run;
        self.paused = false;
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    /// Ask the current worker to stop at the next chunk boundary
    ///
    /// Returns false if the task was already paused or is being removed.
    pub fn request_pause(&mut self) -> bool {
        if self.paused || self.removing {
            return false;
        }
        self.paused = true;
        self.cancel.cancel();
        true
    }
}

/// Media id to task map plus the run counter
#[derive(Debug, Default)]
pub struct DownloadTaskRegistry {
    tasks: HashMap<String, DownloadTask>,
    last_run: u64,
}

impl DownloadTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a run number no earlier worker has used
    pub fn next_run(&mut self) -> u64 {
        self.last_run += 1;
        self.last_run
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.tasks.contains_key(media_id)
    }

    pub fn get(&self, media_id: &str) -> Option<&DownloadTask> {
        self.tasks.get(media_id)
    }

    pub fn get_mut(&mut self, media_id: &str) -> Option<&mut DownloadTask> {
        self.tasks.get_mut(media_id)
    }

    /// Track a task; an existing task under the same id is returned
    pub fn insert(&mut self, task: DownloadTask) -> Option<DownloadTask> {
        self.tasks.insert(task.media_id().to_string(), task)
    }

    pub fn remove(&mut self, media_id: &str) -> Option<DownloadTask> {
        self.tasks.remove(media_id)
    }

    /// True while `run` still owns the task
    pub fn is_current(&self, media_id: &str, run: u64) -> bool {
        self.tasks
            .get(media_id)
            .is_some_and(|task| task.run == run && !task.removing)
    }

    /// True while `run` owns the task and has not been asked to pause
    pub fn is_transferring(&self, media_id: &str, run: u64) -> bool {
        self.tasks
            .get(media_id)
            .is_some_and(|task| task.run == run && !task.removing && !task.paused)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut DownloadTask> {
        self.tasks.values_mut()
    }
}

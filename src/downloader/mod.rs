//! Core downloader implementation split into focused submodules.
//!
//! The `HlsDownloader` struct and its methods are organized by domain:
//! - [`control`] - Task lifecycle control (pause/resume/cancel/retry/remove)
//! - [`download_task`] - Playlist parsing, key resolution, the segment worker pool
//!   and finalization

mod control;
mod download_task;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{Error, Result, TaskError};
use crate::http::HttpClient;
use crate::playlist::parse_source_url;
use crate::store::{TaskHandle, TaskStore};
use crate::task::TaskState;
use crate::types::{Event, Status, TaskId, TaskOptions, TaskSnapshot};
use crate::utils::{default_title, task_temp_dir};

use download_task::DownloadTaskContext;

/// Capacity of the event channel; slow subscribers lag beyond this
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct HlsDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Shared HTTP client for playlists, keys and segments
    pub(crate) http: HttpClient,
    /// Task registry
    pub(crate) store: TaskStore,
}

impl HlsDownloader {
    /// Create a downloader with its own empty task store
    ///
    /// Validates the configuration and creates the output and temp directories.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_store(config, TaskStore::new()).await
    }

    /// Create a downloader that registers tasks in `store`
    pub async fn with_store(config: Config, store: TaskStore) -> Result<Self> {
        config.validate()?;

        for (dir, name) in [
            (config.output_dir(), "output"),
            (config.temp_dir(), "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        name,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let http = HttpClient::new(&config.http)?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            http,
            store,
        })
    }

    /// Subscribe to task events
    ///
    /// Every state change of every task is published as [`Event::Progress`]
    /// carrying a full snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Task registry backing this downloader
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Register a task for `url` and start it in the background
    ///
    /// Returns as soon as the task is registered; parsing, key resolution,
    /// downloading and merging happen asynchronously. A URL that cannot be
    /// parsed is rejected here without creating a task.
    pub async fn create_task(&self, url: &str, options: TaskOptions) -> Result<TaskId> {
        let url = parse_source_url(url)?;
        let id = TaskId::new();
        let title = options
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_title);

        let state = TaskState::new(
            id,
            url.to_string(),
            title,
            options,
            task_temp_dir(self.config.temp_dir(), id),
        );
        let handle = Arc::new(TaskHandle::new(state));
        self.store.insert(handle.clone()).await;

        tracing::info!(task_id = %id, url = %url, "Task created");
        self.emit_event(Event::Created {
            id,
            url: url.to_string(),
        });
        self.emit_event(Event::Progress(handle.snapshot().await));

        let guard = handle.begin_run();
        let ctx = self.task_context(handle);
        tokio::spawn(async move {
            let _guard = guard;
            download_task::run_task(ctx).await;
        });

        Ok(id)
    }

    /// Current snapshot of a task
    pub async fn status(&self, id: TaskId) -> Result<TaskSnapshot> {
        Ok(self.get_handle(id).await?.snapshot().await)
    }

    /// Snapshots of all tasks, oldest first, optionally only those in `status`
    pub async fn list(&self, status: Option<Status>) -> Vec<TaskSnapshot> {
        self.store.list(status).await
    }

    /// Wait until the task's background run finishes, then return its snapshot
    ///
    /// Returns immediately for tasks that are idle (partial, terminal).
    pub async fn wait(&self, id: TaskId) -> Result<TaskSnapshot> {
        let handle = self.get_handle(id).await?;
        handle.wait_idle().await;
        Ok(handle.snapshot().await)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) async fn get_handle(&self, id: TaskId) -> Result<Arc<TaskHandle>> {
        self.store
            .get(id)
            .await
            .ok_or(Error::Task(TaskError::NotFound(id)))
    }

    pub(crate) fn task_context(&self, handle: Arc<TaskHandle>) -> DownloadTaskContext {
        DownloadTaskContext {
            handle,
            http: self.http.clone(),
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

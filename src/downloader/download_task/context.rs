//! Download task context: shared state for one task run.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::Error;
use crate::http::HttpClient;
use crate::store::TaskHandle;
use crate::task::TaskState;
use crate::types::{Event, TaskId};

/// Shared context for a single task run, reducing parameter passing between helpers.
pub(crate) struct DownloadTaskContext {
    pub(crate) handle: Arc<TaskHandle>,
    pub(crate) http: HttpClient,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl DownloadTaskContext {
    pub(crate) fn id(&self) -> TaskId {
        self.handle.id()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.handle.control.is_cancelled()
    }

    /// Publish a snapshot taken while the caller holds the state lock, so
    /// subscribers see changes in the order they were made.
    pub(crate) fn publish(&self, state: &TaskState) {
        self.event_tx.send(Event::Progress(state.snapshot())).ok();
    }

    /// Move the task to `error` with the message of `err`.
    ///
    /// A task that was cancelled meanwhile stays cancelled.
    pub(crate) async fn mark_failed(&self, err: &Error) {
        let mut state = self.handle.state.write().await;
        if state.fail(err.to_string()).is_ok() {
            tracing::error!(
                task_id = %self.id(),
                error = %err,
                code = err.error_code(),
                "Task failed"
            );
            self.publish(&state);
        }
    }

    /// Worker count for a queue of `queue_len` segments: the task override or the
    /// configured cap, never more than there is work.
    pub(crate) fn worker_count(&self, override_cap: Option<usize>, queue_len: usize) -> usize {
        override_cap
            .filter(|n| *n > 0)
            .unwrap_or(self.config.download.max_concurrent_segments)
            .min(queue_len)
            .max(1)
    }
}

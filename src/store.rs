//! In-memory registry of tasks

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::task::{TaskControl, TaskState};
use crate::types::{Status, TaskId, TaskSnapshot};

/// A registered task: its state plus the signals that drive its workers
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    pub(crate) state: RwLock<TaskState>,
    pub(crate) control: TaskControl,
    running: watch::Sender<bool>,
}

impl TaskHandle {
    /// Wrap a fresh task state
    pub fn new(state: TaskState) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            id: state.id(),
            state: RwLock::new(state),
            control: TaskControl::new(),
            running,
        }
    }

    /// Task ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> TaskSnapshot {
        self.state.read().await.snapshot()
    }

    /// Whether a background run (parse, download or merge) is in progress
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Mark a run as started; the run ends when the guard drops
    pub(crate) fn begin_run(self: &Arc<Self>) -> RunGuard {
        self.running.send_replace(true);
        RunGuard {
            handle: Arc::clone(self),
        }
    }

    /// Wait until no run is in progress
    pub async fn wait_idle(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }
}

/// Clears the running flag on drop, including when the run panics
pub(crate) struct RunGuard {
    handle: Arc<TaskHandle>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.handle.running.send_replace(false);
    }
}

/// Shared task registry
///
/// Cloning shares the same map.
#[derive(Clone, Debug, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Arc<TaskHandle>>>>,
}

impl TaskStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, replacing any task with the same ID
    pub async fn insert(&self, handle: Arc<TaskHandle>) {
        self.tasks.write().await.insert(handle.id(), handle);
    }

    /// Look up a task
    pub async fn get(&self, id: TaskId) -> Option<Arc<TaskHandle>> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Drop a task from the registry
    pub async fn remove(&self, id: TaskId) -> Option<Arc<TaskHandle>> {
        self.tasks.write().await.remove(&id)
    }

    /// Snapshots of all tasks, oldest first, optionally filtered by status
    pub async fn list(&self, status: Option<Status>) -> Vec<TaskSnapshot> {
        let handles: Vec<_> = self.tasks.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let snapshot = handle.snapshot().await;
            if status.is_none_or(|s| s == snapshot.status) {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Number of registered tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether no task is registered
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

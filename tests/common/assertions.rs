//! Custom test assertions for end-to-end tests

use std::path::Path;
use std::time::Duration;
use hls_dl::{Event, Status, TaskId, TaskSnapshot};
use tokio::sync::broadcast;

/// Wait for a progress event reporting `status` for `id`
pub async fn wait_for_status(
    events: &mut broadcast::Receiver<Event>,
    id: TaskId,
    status: Status,
    timeout: Duration,
) -> TaskSnapshot {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Progress(snapshot)) if snapshot.id == id && snapshot.status == status => {
                    return snapshot;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out after {timeout:?} waiting for {status}"))
}

/// Assert that a task's private temp directory is gone
pub fn assert_temp_dir_removed(temp_root: &Path, id: TaskId) {
    let dir = temp_root.join(format!("task_{id}"));
    assert!(!dir.exists(), "temp directory {} still exists", dir.display());
}

/// Assert that `dir` contains no files
pub fn assert_dir_empty(dir: &Path) {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .expect("directory should exist")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    assert!(entries.is_empty(), "expected {} to be empty, found {entries:?}", dir.display());
}

//! Task lifecycle control: pause, resume, cancel, retry, remove.

use crate::error::{Error, Result, TaskError};
use crate::types::{Event, Status, TaskId, TaskSnapshot};
use crate::utils::purge_dir;

use super::HlsDownloader;
use super::download_task;

impl HlsDownloader {
    /// Pause a downloading task
    ///
    /// Workers stop taking new segments; segments already in flight finish and
    /// are recorded. Pausing a paused task is a no-op.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist
    /// - [`TaskError::InvalidState`] unless the task is downloading or paused
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        let handle = self.get_handle(id).await?;
        let mut state = handle.state.write().await;

        match state.status() {
            Status::Paused => return Ok(()),
            Status::Downloading if handle.is_running() => {}
            current => return Err(invalid_state(id, "pause", current)),
        }

        state.transition(Status::Paused)?;
        handle.control.pause();
        tracing::info!(task_id = %id, "Task paused");
        self.emit_event(Event::Progress(state.snapshot()));
        Ok(())
    }

    /// Resume a paused task
    ///
    /// Segments already on disk are not fetched again. Resuming a downloading
    /// task is a no-op.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist
    /// - [`TaskError::InvalidState`] unless the task is paused or downloading
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let handle = self.get_handle(id).await?;
        let mut state = handle.state.write().await;

        match state.status() {
            Status::Downloading => return Ok(()),
            Status::Paused => {}
            current => return Err(invalid_state(id, "resume", current)),
        }

        state.transition(Status::Downloading)?;
        handle.control.resume();
        tracing::info!(task_id = %id, "Task resumed");
        self.emit_event(Event::Progress(state.snapshot()));
        Ok(())
    }

    /// Cancel a task and discard its temporary data
    ///
    /// Signals every worker, waits for the background run to stop, removes the
    /// temp directory and drops the task from the store. Results of segments that
    /// were in flight are discarded. Returns the final snapshot.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist
    /// - [`TaskError::InvalidState`] if the task already completed or failed
    pub async fn cancel(&self, id: TaskId) -> Result<TaskSnapshot> {
        let handle = self.get_handle(id).await?;

        let (snapshot, temp_dir) = {
            let mut state = handle.state.write().await;
            let current = state.status();
            if current.is_terminal() {
                return Err(invalid_state(id, "cancel", current));
            }
            state.transition(Status::Cancelled)?;
            handle.control.cancel();
            let snapshot = state.snapshot();
            self.emit_event(Event::Progress(snapshot.clone()));
            (snapshot, state.temp_dir().to_path_buf())
        };

        handle.wait_idle().await;

        if let Err(e) = purge_dir(&temp_dir).await {
            tracing::warn!(task_id = %id, error = %e, "Failed to remove temp directory");
        }
        self.store.remove(id).await;
        tracing::info!(task_id = %id, "Task cancelled");
        self.emit_event(Event::Removed { id });

        Ok(snapshot)
    }

    /// Re-download the segments that failed
    ///
    /// Valid for `partial` tasks, and for idle `downloading` tasks whose merge
    /// failed (the merge runs again). Only the indices in the failed set are
    /// queued; downloaded segments are never fetched again.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist
    /// - [`TaskError::InvalidState`] for any other state, or while a run is active
    pub async fn retry(&self, id: TaskId) -> Result<()> {
        let handle = self.get_handle(id).await?;

        let (guard, queue) = {
            let mut state = handle.state.write().await;
            match state.status() {
                Status::Partial => state.transition(Status::Downloading)?,
                Status::Downloading if !handle.is_running() => {}
                current => return Err(invalid_state(id, "retry", current)),
            }

            let queue = state.take_failed();
            state.set_error(None);
            handle.control.resume();
            tracing::info!(task_id = %id, segments = queue.len(), "Retrying failed segments");
            self.emit_event(Event::Progress(state.snapshot()));
            (handle.begin_run(), queue)
        };

        let ctx = self.task_context(handle);
        tokio::spawn(async move {
            let _guard = guard;
            download_task::run_download(ctx, queue).await;
        });
        Ok(())
    }

    /// Drop an idle task from the store
    ///
    /// Allowed for terminal and `partial` tasks. Any leftover temp directory is
    /// removed; a merged output file is kept.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist
    /// - [`TaskError::InvalidState`] while the task is active
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        let handle = self.get_handle(id).await?;

        let temp_dir = {
            let state = handle.state.read().await;
            let current = state.status();
            if handle.is_running() || !(current.is_terminal() || current == Status::Partial) {
                return Err(invalid_state(id, "remove", current));
            }
            state.temp_dir().to_path_buf()
        };

        purge_dir(&temp_dir).await?;
        self.store.remove(id).await;
        tracing::info!(task_id = %id, "Task removed");
        self.emit_event(Event::Removed { id });
        Ok(())
    }
}

fn invalid_state(id: TaskId, operation: &'static str, current: Status) -> Error {
    Error::Task(TaskError::InvalidState {
        id,
        operation,
        current,
    })
}

//! Finalization: decide partial, merge or complete once the queue drains.

use crate::error::Error;
use crate::merge::Merger;
use crate::types::Status;
use crate::utils::purge_dir;

use super::context::DownloadTaskContext;

/// Settle the task after a drain.
///
/// - cancelled: nothing to do, `cancel` owns the cleanup
/// - any failed segment: `partial`, artifacts kept for `retry`
/// - otherwise: merge; on success `completed` and the temp directory is removed,
///   on failure the task returns to `downloading` with the error recorded so that
///   `retry` can run the merge again
pub(super) async fn finalize(ctx: &DownloadTaskContext) {
    let id = ctx.id();
    if ctx.is_cancelled() {
        return;
    }

    let (total, temp_dir, title, format) = {
        let mut state = ctx.handle.state.write().await;
        // A pause that landed after the last segment must not hold back the result
        ctx.handle.control.resume();

        let failed = state.failed_indices();
        if !failed.is_empty() {
            let total = state.total_segments();
            if state.transition(Status::Partial).is_err() {
                return;
            }
            state.set_error(Some(format!(
                "{} of {} segments failed",
                failed.len(),
                total
            )));
            tracing::warn!(
                task_id = %id,
                failed = failed.len(),
                total,
                "Download finished with failed segments"
            );
            ctx.publish(&state);
            return;
        }

        if state.transition(Status::Merging).is_err() {
            return;
        }
        state.set_error(None);
        ctx.publish(&state);
        (
            state.total_segments(),
            state.temp_dir().to_path_buf(),
            state.title().to_string(),
            state.output_format(),
        )
    };

    let merger = Merger::new(
        ctx.config.output_dir().clone(),
        ctx.config.download.file_collision,
    );
    let result = merger.merge(&temp_dir, total, &title, format).await;

    let mut state = ctx.handle.state.write().await;
    match result {
        Ok(output) => {
            if state.transition(Status::Completed).is_err() {
                // Cancelled during the merge
                let _ = tokio::fs::remove_file(&output.path).await;
                return;
            }
            state.set_output(output.path.clone(), output.size);
            ctx.publish(&state);
            drop(state);

            if let Err(e) = purge_dir(&temp_dir).await {
                tracing::warn!(task_id = %id, error = %e, "Failed to remove temp directory");
            }
            tracing::info!(task_id = %id, path = %output.path.display(), "Task completed");
        }
        Err(e) => {
            let err = Error::from(e);
            if state.transition(Status::Downloading).is_err() {
                return;
            }
            tracing::error!(task_id = %id, error = %err, "Merge failed");
            state.set_error(Some(err.to_string()));
            ctx.publish(&state);
        }
    }
}

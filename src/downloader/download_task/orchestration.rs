//! Task orchestration: top-level lifecycle for a single task.

use crate::error::Error;
use crate::playlist::PlaylistParser;
use crate::types::Status;

use super::context::DownloadTaskContext;
use super::finalization::finalize;
use super::keys::resolve_keys;
use super::workers::run_workers;

/// Full run of a new task.
///
/// Phases:
/// 1. Fetch and parse the playlist
/// 2. Apply the segment range
/// 3. Resolve encryption keys
/// 4. Create the task's temp directory
/// 5. Drain the segment queue and finalize
///
/// Any failure in phases 1-4 ends the task in `error`.
pub(crate) async fn run_task(ctx: DownloadTaskContext) {
    let id = ctx.id();

    // Phase 1: parse
    let (url, headers) = {
        let mut state = ctx.handle.state.write().await;
        if state.transition(Status::Parsing).is_err() {
            return;
        }
        ctx.publish(&state);
        (state.url().to_string(), state.options().headers.clone())
    };

    let parser = PlaylistParser::new(ctx.http.clone());
    let parsed = tokio::select! {
        biased;
        _ = ctx.handle.control.token().cancelled() => return,
        parsed = parser.parse(&url, &headers) => parsed,
    };
    let playlist = match parsed {
        Ok(playlist) => playlist,
        Err(e) => {
            ctx.mark_failed(&e).await;
            return;
        }
    };

    // Phase 2: range
    let (segments, temp_dir) = {
        let mut state = ctx.handle.state.write().await;
        if let Err(e) = state.set_playlist(playlist) {
            drop(state);
            ctx.mark_failed(&Error::from(e)).await;
            return;
        }
        (state.segments(), state.temp_dir().to_path_buf())
    };

    // Phase 3: keys
    let resolved = tokio::select! {
        biased;
        _ = ctx.handle.control.token().cancelled() => return,
        resolved = resolve_keys(&ctx, &segments, &headers) => resolved,
    };
    let keys = match resolved {
        Ok(keys) => keys,
        Err(e) => {
            ctx.mark_failed(&e).await;
            return;
        }
    };

    // Phase 4: temp directory
    if let Err(e) = tokio::fs::create_dir_all(&temp_dir).await {
        tracing::error!(task_id = %id, error = %e, "Failed to create temp directory");
        ctx.mark_failed(&Error::Io(e)).await;
        return;
    }

    // Phase 5: download
    let queue = {
        let mut state = ctx.handle.state.write().await;
        state.set_keys(keys);
        if state.transition(Status::Downloading).is_err() {
            return;
        }
        tracing::info!(
            task_id = %id,
            segments = state.total_segments(),
            encrypted = state.encryption().is_some(),
            "Downloading segments"
        );
        ctx.publish(&state);
        state.pending_indices()
    };

    run_download(ctx, queue).await;
}

/// Drain `queue` with the worker pool, then decide partial/merge/complete.
///
/// Shared by the initial run and by `retry`.
pub(crate) async fn run_download(ctx: DownloadTaskContext, queue: Vec<usize>) {
    run_workers(&ctx, queue).await;
    finalize(&ctx).await;
}

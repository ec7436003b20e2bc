//! Segment worker pool: bounded workers pulling indices from a shared queue.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::crypto::IvSource;
use crate::error::{Error, Result};
use crate::playlist::Segment;
use crate::retry::with_retry;
use crate::task::KeyRing;
use crate::utils::{segment_artifact_path, write_atomic};

use super::context::DownloadTaskContext;

/// Everything a worker needs besides the queue, captured once per drain.
struct SegmentJob {
    segments: Arc<Vec<Segment>>,
    keys: Arc<KeyRing>,
    headers: HashMap<String, String>,
    temp_dir: PathBuf,
}

/// Outcome of one segment attempt
enum Attempt {
    /// Artifact written; carries bytes fetched from the network
    Fetched(u64),
    /// Artifact was already on disk
    AlreadyPresent,
    /// Attempt failed
    Failed(Error),
    /// Cancelled mid-flight; result discarded
    Discarded,
}

/// Drain `indices` with up to the configured number of workers.
///
/// Each index is taken by exactly one worker. Workers stop taking new indices
/// while the task is paused and exit on cancellation; a segment already in flight
/// finishes (or is discarded if cancelled).
pub(super) async fn run_workers(ctx: &DownloadTaskContext, indices: Vec<usize>) {
    if indices.is_empty() {
        return;
    }

    let (job, worker_override) = {
        let state = ctx.handle.state.read().await;
        (
            SegmentJob {
                segments: state.segments(),
                keys: state.keys(),
                headers: state.options().headers.clone(),
                temp_dir: state.temp_dir().to_path_buf(),
            },
            state.options().max_concurrent_segments,
        )
    };

    let workers = ctx.worker_count(worker_override, indices.len());
    tracing::debug!(
        task_id = %ctx.id(),
        queued = indices.len(),
        workers,
        "Starting segment workers"
    );

    let queue = Mutex::new(VecDeque::from(indices));
    join_all((0..workers).map(|_| worker_loop(ctx, &job, &queue))).await;
}

async fn worker_loop(ctx: &DownloadTaskContext, job: &SegmentJob, queue: &Mutex<VecDeque<usize>>) {
    loop {
        if !ctx.handle.control.wait_until_runnable().await {
            return;
        }
        let Some(index) = queue.lock().await.pop_front() else {
            return;
        };

        let attempt = tokio::select! {
            biased;
            _ = ctx.handle.control.token().cancelled() => Attempt::Discarded,
            attempt = process_segment(ctx, job, index) => attempt,
        };
        record(ctx, index, attempt).await;
    }
}

async fn process_segment(ctx: &DownloadTaskContext, job: &SegmentJob, index: usize) -> Attempt {
    let artifact = segment_artifact_path(&job.temp_dir, index);
    if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
        return Attempt::AlreadyPresent;
    }

    let Some(segment) = job.segments.get(index) else {
        return Attempt::Discarded;
    };

    let (data, fetched) = match fetch_segment(ctx, job, segment).await {
        Ok(result) => result,
        Err(e) => return Attempt::Failed(e),
    };

    if ctx.is_cancelled() {
        return Attempt::Discarded;
    }
    match write_atomic(&artifact, &data).await {
        Ok(()) => Attempt::Fetched(fetched),
        Err(e) => Attempt::Failed(Error::Io(e)),
    }
}

/// Fetch with transient retry, then decrypt. Returns the plaintext and the
/// number of bytes that came over the network.
async fn fetch_segment(
    ctx: &DownloadTaskContext,
    job: &SegmentJob,
    segment: &Segment,
) -> Result<(Vec<u8>, u64)> {
    let timeout = ctx.config.http.segment_timeout;
    let (http, headers, uri) = (&ctx.http, &job.headers, segment.uri.as_str());
    let body = with_retry(&ctx.config.retry, move || http.get_bytes(uri, timeout, headers)).await?;
    let fetched = body.len() as u64;

    let Some(descriptor) = &segment.encryption else {
        return Ok((body.to_vec(), fetched));
    };

    let key_uri = descriptor.uri.as_deref().unwrap_or_default();
    let decryptor = job.keys.get(key_uri).ok_or_else(|| Error::KeyFetch {
        uri: key_uri.to_string(),
        reason: "key was not resolved".to_string(),
    })?;
    let iv = match descriptor.iv.as_deref() {
        Some(hex_iv) => IvSource::Explicit(hex_iv),
        None => IvSource::Sequence(segment.sequence),
    };

    Ok((decryptor.decrypt(&body, iv)?, fetched))
}

async fn record(ctx: &DownloadTaskContext, index: usize, attempt: Attempt) {
    let mut state = ctx.handle.state.write().await;
    if ctx.is_cancelled() {
        return;
    }

    let changed = match attempt {
        Attempt::Fetched(bytes) => state.mark_downloaded(index, Some(bytes)),
        Attempt::AlreadyPresent => {
            tracing::debug!(task_id = %ctx.id(), index, "Segment already on disk, skipping fetch");
            state.mark_downloaded(index, None)
        }
        Attempt::Failed(e) => {
            tracing::warn!(task_id = %ctx.id(), index, error = %e, "Segment failed");
            state.mark_failed(index)
        }
        Attempt::Discarded => false,
    };

    if changed {
        ctx.publish(&state);
    }
}

//! Per-task state: lifecycle, segment bookkeeping and progress accounting
//!
//! The lifecycle is a small state machine:
//!
//! ```text
//! pending -> parsing -> downloading <-> paused
//!                       downloading -> merging -> completed
//!                       downloading -> partial -> downloading (retry)
//!                       merging -> downloading (merge failed, retry re-runs it)
//! any non-terminal -> error | cancelled
//! ```
//!
//! `completed`, `error` and `cancelled` are terminal.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::crypto::SegmentDecryptor;
use crate::error::{ParseError, TaskError};
use crate::playlist::{EncryptionDescriptor, Playlist, Segment};
use crate::types::{OutputFormat, Status, TaskId, TaskOptions, TaskSnapshot};

/// Minimum time between speed samples
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Resolved keys of a task, by key URI
pub type KeyRing = HashMap<String, SegmentDecryptor>;

/// Whether the lifecycle allows moving from `from` to `to`
pub fn can_transition(from: Status, to: Status) -> bool {
    use Status::*;
    match (from, to) {
        (Pending, Parsing)
        | (Parsing, Downloading)
        | (Downloading, Paused)
        | (Paused, Downloading)
        | (Downloading | Paused, Merging)
        | (Downloading | Paused, Partial)
        | (Partial, Downloading)
        | (Merging, Completed)
        | (Merging, Downloading) => true,
        (from, Error | Cancelled) => !from.is_terminal(),
        _ => false,
    }
}

/// Clamp a 1-based inclusive segment range into `[1, total]`
///
/// Missing bounds default to the whole playlist; `0` and negative starts count as
/// `1`. Returns the matching 0-based half-open range, or [`ParseError::EmptyRange`]
/// when start ends up after end.
pub fn clamp_range(
    total: usize,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<Range<usize>, ParseError> {
    let max = i64::try_from(total).unwrap_or(i64::MAX).max(1);
    let start = start.unwrap_or(1).clamp(1, max) as usize;
    let end = end.unwrap_or(max).clamp(1, max) as usize;

    if total == 0 || start > end {
        return Err(ParseError::EmptyRange { start, end });
    }
    Ok(start - 1..end)
}

/// Download rate sampled over windows of at least [`SPEED_SAMPLE_INTERVAL`]
#[derive(Clone, Debug)]
pub struct SpeedSampler {
    window_start: Instant,
    window_bytes: u64,
    bps: u64,
}

impl SpeedSampler {
    /// Start a window at `now` with `total_bytes` already counted
    pub fn new(now: Instant, total_bytes: u64) -> Self {
        Self {
            window_start: now,
            window_bytes: total_bytes,
            bps: 0,
        }
    }

    /// Record the running byte total; updates the rate once the window is long enough
    pub fn record(&mut self, total_bytes: u64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < SPEED_SAMPLE_INTERVAL {
            return;
        }
        let delta = total_bytes.saturating_sub(self.window_bytes);
        self.bps = (delta as f64 / elapsed.as_secs_f64()) as u64;
        self.window_start = now;
        self.window_bytes = total_bytes;
    }

    /// Latest rate in bytes per second
    pub fn bps(&self) -> u64 {
        self.bps
    }
}

/// Everything known about one task
#[derive(Debug)]
pub struct TaskState {
    id: TaskId,
    url: String,
    title: String,
    output_format: OutputFormat,
    options: TaskOptions,
    temp_dir: PathBuf,
    status: Status,
    segments: Arc<Vec<Segment>>,
    encryption: Option<EncryptionDescriptor>,
    keys: Arc<KeyRing>,
    total_duration: f64,
    downloaded: BTreeSet<usize>,
    failed: BTreeSet<usize>,
    downloaded_bytes: u64,
    fetched_segments: u64,
    speed: SpeedSampler,
    error: Option<String>,
    output_path: Option<PathBuf>,
    output_size: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskState {
    /// New pending task
    pub fn new(id: TaskId, url: String, title: String, options: TaskOptions, temp_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            url,
            title,
            output_format: options.output_format(),
            options,
            temp_dir,
            status: Status::Pending,
            segments: Arc::new(Vec::new()),
            encryption: None,
            keys: Arc::new(KeyRing::new()),
            total_duration: 0.0,
            downloaded: BTreeSet::new(),
            failed: BTreeSet::new(),
            downloaded_bytes: 0,
            fetched_segments: 0,
            speed: SpeedSampler::new(Instant::now(), 0),
            error: None,
            output_path: None,
            output_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Task ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Playlist URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Output title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Output form
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Options the task was created with
    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Private working directory
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Working segment list
    pub fn segments(&self) -> Arc<Vec<Segment>> {
        self.segments.clone()
    }

    /// Segments in the working range
    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }

    /// Resolved keys
    pub fn keys(&self) -> Arc<KeyRing> {
        self.keys.clone()
    }

    /// Last key descriptor of the playlist
    pub fn encryption(&self) -> Option<&EncryptionDescriptor> {
        self.encryption.as_ref()
    }

    /// Whether segment `index` is persisted
    pub fn is_downloaded(&self, index: usize) -> bool {
        self.downloaded.contains(&index)
    }

    /// Number of persisted segments
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Indices whose last attempt failed, ascending
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().copied().collect()
    }

    /// Last error message
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to `to` if the lifecycle allows it
    pub fn transition(&mut self, to: Status) -> Result<(), TaskError> {
        if !can_transition(self.status, to) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        tracing::debug!(task_id = %self.id, from = %self.status, to = %to, "Task status change");
        if to == Status::Downloading {
            self.speed = SpeedSampler::new(Instant::now(), self.downloaded_bytes);
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Move to `error` with `message`
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TaskError> {
        self.transition(Status::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Set or clear the error message without changing status
    pub fn set_error(&mut self, message: Option<String>) {
        self.error = message;
        self.touch();
    }

    /// Install the working segment list from a parsed playlist
    ///
    /// Applies the task's range options, renumbers the selected segments from 0
    /// and keeps their media sequence numbers for IV derivation.
    pub fn set_playlist(&mut self, playlist: Playlist) -> Result<(), ParseError> {
        let range = clamp_range(
            playlist.segments.len(),
            self.options.start_segment,
            self.options.end_segment,
        )?;

        let segments: Vec<Segment> = playlist.segments[range]
            .iter()
            .enumerate()
            .map(|(index, segment)| Segment {
                index,
                ..segment.clone()
            })
            .collect();

        self.total_duration = segments.iter().map(|s| s.duration).sum();
        self.segments = Arc::new(segments);
        self.encryption = playlist.encryption;
        self.downloaded.clear();
        self.failed.clear();
        self.touch();
        Ok(())
    }

    /// Install resolved keys
    pub fn set_keys(&mut self, keys: KeyRing) {
        self.keys = Arc::new(keys);
    }

    /// Record segment `index` as persisted
    ///
    /// `fetched_bytes` is `None` when the artifact was already on disk. Returns
    /// false if the segment was already counted or is out of range.
    pub fn mark_downloaded(&mut self, index: usize, fetched_bytes: Option<u64>) -> bool {
        if index >= self.segments.len() || !self.downloaded.insert(index) {
            return false;
        }
        self.failed.remove(&index);
        if let Some(bytes) = fetched_bytes {
            self.downloaded_bytes += bytes;
            self.fetched_segments += 1;
            self.speed.record(self.downloaded_bytes, Instant::now());
        }
        self.touch();
        true
    }

    /// Record a failed attempt for segment `index`
    pub fn mark_failed(&mut self, index: usize) -> bool {
        if index >= self.segments.len() || self.downloaded.contains(&index) {
            return false;
        }
        let inserted = self.failed.insert(index);
        self.touch();
        inserted
    }

    /// Clear and return the failed set, for re-enqueueing
    pub fn take_failed(&mut self) -> Vec<usize> {
        let failed = std::mem::take(&mut self.failed);
        self.touch();
        failed.into_iter().collect()
    }

    /// Indices not yet persisted, ascending
    pub fn pending_indices(&self) -> Vec<usize> {
        (0..self.segments.len())
            .filter(|i| !self.downloaded.contains(i))
            .collect()
    }

    /// Record the merged artifact
    pub fn set_output(&mut self, path: PathBuf, size: u64) {
        self.output_path = Some(path);
        self.output_size = Some(size);
        self.touch();
    }

    /// Percentage of working segments persisted, rounded
    pub fn progress(&self) -> u8 {
        let total = self.segments.len();
        if total == 0 {
            return 0;
        }
        ((self.downloaded.len() as f64 / total as f64) * 100.0).round() as u8
    }

    /// Current rate; zero unless downloading
    pub fn speed_bps(&self) -> u64 {
        if self.status == Status::Downloading {
            self.speed.bps()
        } else {
            0
        }
    }

    /// Seconds left at the current rate, from the average fetched segment size
    pub fn eta_seconds(&self) -> Option<u64> {
        let remaining = self.segments.len().saturating_sub(self.downloaded.len()) as u64;
        if remaining == 0 {
            return Some(0);
        }
        let bps = self.speed_bps();
        if bps == 0 || self.fetched_segments == 0 {
            return None;
        }
        let average = self.downloaded_bytes / self.fetched_segments;
        Some(remaining * average / bps)
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            title: self.title.clone(),
            status: self.status,
            progress: self.progress(),
            total_segments: self.segments.len(),
            downloaded_segments: self.downloaded.len(),
            failed_segments: self.failed.len(),
            speed_bps: self.speed_bps(),
            downloaded_bytes: self.downloaded_bytes,
            eta_seconds: self.eta_seconds(),
            total_duration: self.total_duration,
            output_format: self.output_format,
            output_path: self.output_path.clone(),
            output_size: self.output_size,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Cancellation and pause signals shared by a task's workers
#[derive(Debug)]
pub struct TaskControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    /// Running, not paused
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused,
        }
    }

    /// Close the gate; workers stop taking new segments
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Open the gate
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Whether the gate is closed
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Signal cancellation to every worker
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was signalled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token for `select!`-style waits
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Block while paused; false means the task was cancelled instead
    pub async fn wait_until_runnable(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut rx = self.paused.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = rx.wait_for(|paused| !*paused) => res.is_ok(),
        }
    }
}

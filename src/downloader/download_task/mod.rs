//! Download task execution -- playlist to merged file.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state and event publishing for one task run
//! - [`orchestration`] - Top-level task lifecycle
//! - [`keys`] - Encryption key resolution
//! - [`workers`] - Bounded worker pool draining the segment queue
//! - [`finalization`] - Partial/merge/complete decision after the queue drains

mod context;
mod finalization;
mod keys;
mod orchestration;
mod workers;


pub(crate) use context::DownloadTaskContext;
pub(crate) use orchestration::{run_download, run_task};

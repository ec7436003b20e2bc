//! Path helpers for task directories, segment artifacts and the final output

use crate::config::FileCollisionAction;
use crate::error::MergeError;
use crate::types::{OutputFormat, TaskId};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Suffix for files that are still being written
const PART_SUFFIX: &str = "part";

/// Characters that are not allowed in file names on common filesystems
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Private working directory of a task under `temp_root`
pub fn task_temp_dir(temp_root: &Path, id: TaskId) -> PathBuf {
    temp_root.join(format!("task_{id}"))
}

/// Artifact path of segment `index`; zero-padded so names sort in merge order
pub fn segment_artifact_path(task_dir: &Path, index: usize) -> PathBuf {
    task_dir.join(format!("segment_{index:06}.ts"))
}

/// `<path>.part`, where a file lives until it is complete
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Title used when the caller gives none: `video_<unix millis>`
pub fn default_title() -> String {
    format!("video_{}", chrono::Utc::now().timestamp_millis())
}

/// Make `title` safe to use as a file stem
///
/// Reserved and control characters become `_`; leading/trailing dots and
/// whitespace are dropped. An empty result falls back to [`default_title`].
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        default_title()
    } else {
        trimmed.to_string()
    }
}

/// Final artifact path for `title` in `output_dir`, resolving collisions
pub fn output_path(
    output_dir: &Path,
    title: &str,
    format: OutputFormat,
    action: FileCollisionAction,
) -> Result<PathBuf, MergeError> {
    let file_name = format!("{}.{}", sanitize_filename(title), format.extension());
    get_unique_path(&output_dir.join(file_name), action)
}

/// Get a unique path for a file, handling collisions according to `action`
///
/// Rename appends ` (1)`, ` (2)`, ... before the extension. Skip fails with
/// [`MergeError::Collision`] when the file exists. Overwrite returns `path` as is.
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf, MergeError> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(MergeError::Collision(path.to_path_buf()));
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| MergeError::Collision(path.to_path_buf()))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = match extension {
                    Some(ext) => parent.join(format!("{stem} ({i}).{ext}")),
                    None => parent.join(format!("{stem} ({i})")),
                };
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }

            Err(MergeError::Collision(path.to_path_buf()))
        }
    }
}

/// Write `data` to `<path>.part`, then rename it into place
///
/// A crash mid-write leaves only the `.part` file, which is never mistaken for a
/// finished artifact.
pub async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let part = part_path(path);
    tokio::fs::write(&part, data).await?;
    tokio::fs::rename(&part, path).await
}

/// Remove a task directory and everything in it; a missing directory is fine
pub async fn purge_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

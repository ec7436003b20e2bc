//! Concatenation of segment artifacts into the final output file

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::FileCollisionAction;
use crate::error::MergeError;
use crate::types::OutputFormat;
use crate::utils::{output_path, part_path, segment_artifact_path};

/// Final artifact of a merge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedOutput {
    /// Where the file was written
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Joins `segment_000000.ts`, `segment_000001.ts`, ... in index order
#[derive(Clone, Debug)]
pub struct Merger {
    output_dir: PathBuf,
    collision: FileCollisionAction,
}

impl Merger {
    /// Merger writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            output_dir: output_dir.into(),
            collision,
        }
    }

    /// Concatenate the `total` artifacts in `task_dir` into `<title>.<ext>`
    ///
    /// Every artifact must exist before anything is written. The output is built
    /// as a `.part` file and renamed on success, so a failed merge never leaves a
    /// truncated file under the final name.
    pub async fn merge(
        &self,
        task_dir: &Path,
        total: usize,
        title: &str,
        format: OutputFormat,
    ) -> Result<MergedOutput, MergeError> {
        let mut artifacts = Vec::with_capacity(total);
        for index in 0..total {
            let path = segment_artifact_path(task_dir, index);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(MergeError::MissingSegment { index, path });
            }
            artifacts.push(path);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| MergeError::Write {
                path: self.output_dir.clone(),
                source,
            })?;

        let path = self.claim(title, format).await?;
        let part = part_path(&path);

        let size = match concat(&artifacts, &part).await {
            Ok(size) => size,
            Err(source) => {
                self.discard(&path, &part).await;
                return Err(MergeError::Write { path, source });
            }
        };

        if let Err(source) = tokio::fs::rename(&part, &path).await {
            self.discard(&path, &part).await;
            return Err(MergeError::Write { path, source });
        }

        tracing::info!(path = %path.display(), size, segments = total, "Merged segments");
        Ok(MergedOutput { path, size })
    }

    /// Pick the output path and create it empty so concurrent merges of the same
    /// title cannot pick it too
    async fn claim(&self, title: &str, format: OutputFormat) -> Result<PathBuf, MergeError> {
        loop {
            let path = output_path(&self.output_dir, title, format, self.collision)?;
            if self.collision == FileCollisionAction::Overwrite {
                return Ok(path);
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.collision == FileCollisionAction::Skip {
                        return Err(MergeError::Collision(path));
                    }
                }
                Err(source) => return Err(MergeError::Write { path, source }),
            }
        }
    }

    /// Drop the part file and the claimed placeholder
    async fn discard(&self, path: &Path, part: &Path) {
        let _ = tokio::fs::remove_file(part).await;
        if self.collision != FileCollisionAction::Overwrite {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

async fn concat(artifacts: &[PathBuf], dest: &Path) -> std::io::Result<u64> {
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    for artifact in artifacts {
        let mut reader = tokio::fs::File::open(artifact).await?;
        written += tokio::io::copy(&mut reader, &mut writer).await?;
    }

    writer.flush().await?;
    writer.get_ref().sync_all().await?;
    Ok(written)
}

use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::filename::ClientFilename;
use crate::config::UploadConfig;
use crate::error::ConversionError;
use crate::metrics::{UPLOADED_BYTES, UPLOAD_REJECTIONS};
use crate::registry::ConversionSpec;

/// A file staged for one job.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Filename as the client sent it.
    pub original_filename: String,
    /// Sanitised stem outputs are named after.
    pub stem: String,
    /// Declared (lower-case) extension.
    pub extension: String,
    /// Collision-free path under the job's input directory.
    pub staged_path: PathBuf,
    pub size_bytes: u64,
}

/// Directory layout of one job under the staging root.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub job_id: String,
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl JobPaths {
    fn new(staging_root: &Path, job_id: &str) -> Self {
        let root = staging_root.join(job_id);
        Self {
            job_id: job_id.to_string(),
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            work_dir: root.join("work"),
            root,
        }
    }
}

/// Stages uploads into per-job directories.
#[derive(Debug, Clone)]
pub struct UploadManager {
    staging_root: PathBuf,
    max_file_bytes: u64,
}

impl UploadManager {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            staging_root: config.staging_root.clone(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Paths for a job. Does not touch the filesystem.
    pub fn job_paths(&self, job_id: &str) -> JobPaths {
        JobPaths::new(&self.staging_root, job_id)
    }

    /// Create the job's input, output and work directories.
    pub async fn prepare(&self, paths: &JobPaths) -> Result<(), ConversionError> {
        for dir in [&paths.input_dir, &paths.output_dir, &paths.work_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ConversionError::internal(format!(
                    "failed to create staging directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Stream one file to disk.
    ///
    /// The size ceiling is checked on every chunk, so an oversized upload is
    /// rejected as soon as it crosses the limit and its partial file removed.
    /// Zero-byte uploads are rejected as `EmptyFile`.
    pub async fn stage<S, B>(
        &self,
        paths: &JobPaths,
        index: usize,
        filename: &ClientFilename,
        stream: S,
    ) -> Result<UploadedAsset, ConversionError>
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        let extension = filename
            .extension
            .clone()
            .unwrap_or_else(|| "bin".to_string());
        let staged_path = paths.input_dir.join(format!(
            "{:02}_{}.{}",
            index,
            Uuid::new_v4().simple(),
            extension
        ));

        let result = self.write_stream(&staged_path, filename, stream).await;
        let size_bytes = match result {
            Ok(size) => size,
            Err(e) => {
                discard(&staged_path).await;
                UPLOAD_REJECTIONS.with_label_values(&[e.kind().as_str()]).inc();
                return Err(e);
            }
        };

        UPLOADED_BYTES.inc_by(size_bytes);
        debug!(
            job_id = %paths.job_id,
            filename = %filename.original,
            path = %staged_path.display(),
            size_bytes,
            "Staged upload"
        );

        Ok(UploadedAsset {
            original_filename: filename.original.clone(),
            stem: filename.stem.clone(),
            extension,
            staged_path,
            size_bytes,
        })
    }

    /// Stage several files for one job, checking arity first.
    pub async fn stage_many<S, B>(
        &self,
        paths: &JobPaths,
        spec: &ConversionSpec,
        files: Vec<(ClientFilename, S)>,
    ) -> Result<Vec<UploadedAsset>, ConversionError>
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        if let Err(e) = spec.arity.check(files.len()) {
            UPLOAD_REJECTIONS.with_label_values(&[e.kind().as_str()]).inc();
            return Err(e);
        }

        let mut assets = Vec::with_capacity(files.len());
        for (index, (filename, stream)) in files.into_iter().enumerate() {
            assets.push(self.stage(paths, index, &filename, stream).await?);
        }
        Ok(assets)
    }

    async fn write_stream<S, B>(
        &self,
        path: &Path,
        filename: &ClientFilename,
        stream: S,
    ) -> Result<u64, ConversionError>
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| io_error("create staged file", path, e))?;

        futures::pin_mut!(stream);
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let bytes = chunk.as_ref();
            written += bytes.len() as u64;
            if written > self.max_file_bytes {
                return Err(ConversionError::PayloadTooLarge {
                    filename: filename.original.clone(),
                    limit_bytes: self.max_file_bytes,
                });
            }
            file.write_all(bytes)
                .await
                .map_err(|e| io_error("write staged file", path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| io_error("flush staged file", path, e))?;

        if written == 0 {
            return Err(ConversionError::EmptyFile {
                filename: filename.original.clone(),
            });
        }
        Ok(written)
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> ConversionError {
    ConversionError::internal(format!("failed to {} {}: {}", action, path.display(), e))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial upload"),
    }
}

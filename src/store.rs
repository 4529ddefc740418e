//! Filesystem-backed object store.
//!
//! Objects live at `<root>/<bucket>/<key>`, so a key like
//! `redacted/scans/a.png` becomes nested directories. Writes go to a temp
//! file in the destination directory and are renamed into place, so a reader
//! never sees a half-written object.

use crate::error::ServiceError;
use crate::services::ObjectStore;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// [`ObjectStore`] over a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path for `bucket`/`key`.
    ///
    /// Rejects anything that would resolve outside the bucket directory.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ServiceError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            let safe = !part.is_empty()
                && rel
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !safe {
                return Err(ServiceError::Other(format!(
                    "refusing unsafe object path '{bucket}/{key}'"
                )));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServiceError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ServiceError> {
        let path = self.object_path(bucket, key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent).await?;

        // Temp file + persist (rename) on a blocking thread.
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ServiceError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(&body)?;
            tmp.flush()?;
            tmp.persist(&target).map_err(|e| ServiceError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| ServiceError::Other(format!("write task failed: {e}")))??;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

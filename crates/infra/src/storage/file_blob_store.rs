//! Filesystem blob store for staged batches.
//!
//! Keys are relative `/`-separated paths under a root directory
//! (`<userId>/<uuid>.json`). Writes land in a temporary sibling first and are
//! renamed into place, so readers never observe a partial object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use calsync_core::BlobStore;
use calsync_domain::{BlobConfig, CalSyncError, Result};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::InfraError;

pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(&config.root_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.trim().is_empty()
            && !key.contains('\\')
            && relative.components().all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(CalSyncError::InvalidInput(format!("invalid blob key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(blob_error)?;
        }

        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("blob");
        let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
        fs::write(&staging, &bytes).await.map_err(blob_error)?;
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(blob_error(err));
        }
        debug!(key, "blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => CalSyncError::NotFound(format!("blob {key}")),
            _ => blob_error(err),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(blob_error(err)),
        }
    }
}

fn blob_error(err: std::io::Error) -> CalSyncError {
    InfraError::from(err).into()
}

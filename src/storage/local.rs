//! Local JSON file primitives.
//!
//! Every state file is rewritten whole: the new content goes to a sibling
//! `.tmp` file which is then renamed over the target, so a crash mid-write
//! leaves either the old or the new document on disk.

use std::path::PathBuf;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// One JSON document on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Serialize and write the document.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&bytes)
            .await
            .map_err(|e| AppError::storage(&self.path, e))
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read and deserialize the document, `None` when the file is missing.
    pub async fn read<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.read_bytes().await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read the document, falling back to `T::default()` when it is missing
    /// or unreadable.
    pub async fn read_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self.read().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::info!("No {} found, starting empty", self.path.display());
                T::default()
            }
            Err(e) => {
                log::warn!(
                    "Failed to load {}: {}. Starting empty.",
                    self.path.display(),
                    e
                );
                T::default()
            }
        }
    }
}

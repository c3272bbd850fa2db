// src/storage/local.rs

//! Local filesystem key-value store.
//!
//! Keys map directly to files under a root directory; writes go to a
//! temporary file first and are renamed into place so a crashed process
//! never leaves a half-written value behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

use super::KvStore;

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for LocalStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn set_raw(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{get_json, set_json};
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_and_read_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.set_raw("test.json", b"{}").await.unwrap();
        let data = store.get_raw("test.json").await.unwrap();
        assert_eq!(data, Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());
        assert!(store.get_raw("nope.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.set_raw("gone.json", b"x").await.unwrap();
        store.remove("gone.json").await.unwrap();
        store.remove("gone.json").await.unwrap();
        assert!(store.get_raw("gone.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        let value = vec!["a".to_string(), "b".to_string()];
        set_json(&store, "list.json", &value).await.unwrap();
        let loaded: Vec<String> = get_json(&store, "list.json").await.unwrap().unwrap();
        assert_eq!(loaded, value);
    }
}

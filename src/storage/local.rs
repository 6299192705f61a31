//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {storage_dir}/
//! ├── state.json            # Sites and change history
//! └── selection_audit.log   # Append-only extraction audit
//! {feeds_dir}/
//! ├── site_<slug>.xml       # Per-site feeds
//! └── DE-<region>.xml       # Per-region feeds
//! ```
//!
//! Whole-file writes go to a temporary sibling first and are renamed into
//! place, so readers never observe a partially written file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::StateBackend;

/// Key of the state document inside the storage directory.
pub const STATE_KEY: &str = "state.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// The temporary file is removed if any step fails.
    pub async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Append a single line to a file, creating it if needed.
    pub async fn append_line(path: &Path, line: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StateBackend for LocalStorage {
    async fn read_state(&self) -> Result<Option<Vec<u8>>> {
        self.read_bytes(STATE_KEY).await
    }

    async fn write_state(&self, bytes: &[u8]) -> Result<()> {
        self.write_bytes(STATE_KEY, bytes).await
    }

    fn describe(&self) -> String {
        self.path(STATE_KEY).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!storage.path("test.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let data = storage.read_bytes("nope.txt").await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_nested_dirs() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("a/b"));

        storage.write_bytes("feed.xml", b"<rss/>").await.unwrap();
        assert!(tmp.path().join("a/b/feed.xml").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_state(b"{\"v\":1}").await.unwrap();
        storage.write_state(b"{\"v\":2}").await.unwrap();
        let data = storage.read_state().await.unwrap().unwrap();
        assert_eq!(data, b"{\"v\":2}".to_vec());
    }

    #[tokio::test]
    async fn test_append_line() {
        let tmp = TempDir::new().unwrap();
        let log_path = tmp.path().join("logs/audit.log");

        LocalStorage::append_line(&log_path, "first").await.unwrap();
        LocalStorage::append_line(&log_path, "second").await.unwrap();
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}

//! On-disk locations for files in transit and delivered files.
//!
//! Relay cache copies live at `<transfer_id>/<filename>` and deliveries are
//! staged as `.<transfer_id>.part` before being renamed into place, so two
//! handlers never write the same path and no on-disk name grows past the
//! longest accepted filename.

use crate::relay::types::{RelayError, RelayResult};
use std::path::{Path, PathBuf};

pub struct RelayStorage {
    receive_dir: PathBuf,
    relay_dir: PathBuf,
}

impl RelayStorage {
    pub fn new(receive_dir: impl Into<PathBuf>, relay_dir: impl Into<PathBuf>) -> Self {
        Self {
            receive_dir: receive_dir.into(),
            relay_dir: relay_dir.into(),
        }
    }

    /// Create both directories if missing
    pub async fn ensure_dirs(&self) -> RelayResult<()> {
        for dir in [&self.receive_dir, &self.relay_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                RelayError::Storage(format!("create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn receive_dir(&self) -> &Path {
        &self.receive_dir
    }

    pub fn relay_dir(&self) -> &Path {
        &self.relay_dir
    }

    /// Relay cache location for a transfer not yet at its destination
    pub fn relay_path(&self, transfer_id: &str, filename: &str) -> PathBuf {
        self.relay_dir.join(transfer_id).join(filename)
    }

    /// Temporary location for a delivery awaiting verification
    pub fn staging_path(&self, transfer_id: &str) -> PathBuf {
        self.receive_dir.join(format!(".{transfer_id}.part"))
    }

    /// Create (or truncate) a file for incoming payload bytes
    pub async fn create(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(path).await
    }

    /// Final location of a delivered file
    pub fn delivered_path(&self, filename: &str) -> PathBuf {
        self.receive_dir.join(filename)
    }

    /// Move a verified staging file to its permanent name
    pub async fn promote(&self, staging: &Path, filename: &str) -> RelayResult<PathBuf> {
        let target = self.delivered_path(filename);
        tokio::fs::rename(staging, &target).await.map_err(|e| {
            RelayError::Storage(format!(
                "rename {} -> {}: {}",
                staging.display(),
                target.display(),
                e
            ))
        })?;
        Ok(target)
    }

    /// Remove a relay cache copy after the next hop acknowledged it,
    /// along with its per-transfer directory
    pub async fn discard(&self, path: &Path) -> RelayResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RelayError::Storage(format!(
                    "remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        if let Some(parent) = path.parent().filter(|p| *p != self.relay_dir) {
            if parent.starts_with(&self.relay_dir) {
                // Fails harmlessly if something else is still in there
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }

    /// Files currently held in the relay cache (stalled or in flight)
    pub async fn cached_files(&self) -> RelayResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.relay_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                files.push(entry.path());
            } else if file_type.is_dir() {
                let mut inner = tokio::fs::read_dir(entry.path()).await?;
                while let Some(entry) = inner.next_entry().await? {
                    if entry.file_type().await?.is_file() {
                        files.push(entry.path());
                    }
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> RelayStorage {
        RelayStorage::new(dir.path().join("receive"), dir.path().join("relay"))
    }

    #[tokio::test]
    async fn test_paths_are_unique_per_transfer() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let a = storage.relay_path("t-1", "report.pdf");
        let b = storage.relay_path("t-2", "report.pdf");
        assert_ne!(a, b);
        assert!(a.starts_with(storage.relay_dir()));

        let staging = storage.staging_path("t-1");
        assert_ne!(staging, storage.delivered_path("report.pdf"));
        assert!(staging.starts_with(storage.receive_dir()));
    }

    #[tokio::test]
    async fn test_longest_filename_fits_on_disk() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let name = "n".repeat(crate::transfer::types::MAX_FILENAME_LEN);

        let cached = storage.relay_path(&id, &name);
        storage.create(&cached).await.unwrap();
        assert_eq!(storage.cached_files().await.unwrap(), vec![cached.clone()]);

        let staging = storage.staging_path(&id);
        storage.create(&staging).await.unwrap();
        let delivered = storage.promote(&staging, &name).await.unwrap();
        assert!(delivered.exists());
    }

    #[tokio::test]
    async fn test_promote_and_discard() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staging = storage.staging_path("t-1");
        tokio::fs::write(&staging, b"abc").await.unwrap();
        let delivered = storage.promote(&staging, "a.txt").await.unwrap();
        assert_eq!(tokio::fs::read(&delivered).await.unwrap(), b"abc");
        assert!(!staging.exists());

        let cached = storage.relay_path("t-2", "b.txt");
        let mut file = storage.create(&cached).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut file, b"xyz").await.unwrap();
        drop(file);
        assert_eq!(storage.cached_files().await.unwrap(), vec![cached.clone()]);

        storage.discard(&cached).await.unwrap();
        assert!(storage.cached_files().await.unwrap().is_empty());
        assert!(!storage.relay_dir().join("t-2").exists());

        // Discarding twice is harmless
        storage.discard(&cached).await.unwrap();
    }
}

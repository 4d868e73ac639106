//! JSON snapshot files: `user_id -> [record]` maps written whole.
//!
//! Writes are serialized per file and land through a temp file + rename, so
//! a reader never sees a half-written snapshot and two saves never interleave.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard};

use super::StoreError;

/// One snapshot file plus the lock that serializes writers to it.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hold this while taking the in-memory snapshot and writing it.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Decode the file; `Ok(None)` when it does not exist.
    pub async fn read<T: DeserializeOwned>(
        &self,
    ) -> Result<Option<HashMap<String, Vec<T>>>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let map = serde_json::from_slice(&bytes)?;
        Ok(Some(map))
    }

    /// Replace the file contents. Callers hold [`SnapshotFile::lock`].
    pub async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("absent.json"));
        let map = file.read::<u32>().await.unwrap();
        assert!(map.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested/data.json"));
        {
            let _guard = file.lock().await;
            file.write(br#"{"alice":[1,2,3]}"#).await.unwrap();
        }
        let map = file.read::<u32>().await.unwrap().unwrap();
        assert_eq!(map["alice"], vec![1, 2, 3]);
        assert!(!file.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = SnapshotFile::new(path).read::<u32>().await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }
}

use log::debug;
use opfs_lib::{EntryId, FsError, FsResult};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub path: PathBuf,
    pub last_modified_ms: i64,
}

/// Byte storage for file entries, keyed by entry id.
pub trait FileBlobManager: Send + Sync {
    fn get_or_create_blob(&self, entry_id: &EntryId) -> FsResult<BlobHandle>;

    /// Removing a blob that does not exist succeeds.
    fn remove_blob(&self, entry_id: &EntryId) -> FsResult<()>;
}

/// One file per entry under `<base_dir>/<first two hex chars>/<hex id>`.
pub struct LocalFileBlobManager {
    base_dir: PathBuf,
}

impl LocalFileBlobManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> FsResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            FsError::IoError(format!(
                "create blob dir {} failed: {}",
                base_dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn blob_path(&self, entry_id: &EntryId) -> PathBuf {
        let hex_id = entry_id.to_hex();
        self.base_dir.join(&hex_id[..2]).join(hex_id)
    }
}

fn last_modified_ms(path: &Path) -> FsResult<i64> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| FsError::IoError(format!("stat {} failed: {}", path.display(), e)))?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(since_epoch.as_millis() as i64)
}

impl FileBlobManager for LocalFileBlobManager {
    fn get_or_create_blob(&self, entry_id: &EntryId) -> FsResult<BlobHandle> {
        let path = self.blob_path(entry_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                FsError::IoError(format!("create {} failed: {}", dir.display(), e))
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| FsError::IoError(format!("open {} failed: {}", path.display(), e)))?;

        let last_modified_ms = last_modified_ms(&path)?;
        Ok(BlobHandle {
            path,
            last_modified_ms,
        })
    }

    fn remove_blob(&self, entry_id: &EntryId) -> FsResult<()> {
        let path = self.blob_path(entry_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::IoError(format!(
                "remove {} failed: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opfs_lib::ENTRY_ID_LEN;
    use tempfile::TempDir;

    #[test]
    fn test_local_blob_lifecycle() {
        let tmp_dir = TempDir::new().unwrap();
        let mgr = LocalFileBlobManager::new(tmp_dir.path().join("blobs")).unwrap();
        let entry_id = EntryId::from_bytes([0xab; ENTRY_ID_LEN]);

        let handle = mgr.get_or_create_blob(&entry_id).unwrap();
        assert!(handle.path.exists());
        assert!(handle.path.starts_with(mgr.base_dir().join("ab")));
        assert!(handle.last_modified_ms > 0);

        let again = mgr.get_or_create_blob(&entry_id).unwrap();
        assert_eq!(handle.path, again.path);

        mgr.remove_blob(&entry_id).unwrap();
        assert!(!handle.path.exists());
        mgr.remove_blob(&entry_id).unwrap();
    }
}

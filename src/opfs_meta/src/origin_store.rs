use crate::blob_mgr::LocalFileBlobManager;
use crate::db_manager::{DatabaseManager, ManagerOptions, DEFAULT_PAGE_SIZE};
use crate::lock_registry::ExclusiveLockRegistry;
use crate::schema::{create_schema, ensure_root_entry, init_connection};
use crate::unique_id::DEFAULT_MAX_ID_ROUNDS;
use log::{info, warn};
use opfs_lib::{EntryId, FsError, FsResult, Sha256EntryIdGenerator};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginStoreConfig {
    #[serde(alias = "meta_db_path")]
    pub db_path: PathBuf,
    #[serde(alias = "blob_path")]
    pub blob_dir: PathBuf,
    pub page_size: u32,
    pub max_id_rounds: u32,
    pub busy_timeout_ms: u32,
}

impl Default for OriginStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("metadata.sqlite"),
            blob_dir: PathBuf::from("blobs"),
            page_size: DEFAULT_PAGE_SIZE,
            max_id_rounds: DEFAULT_MAX_ID_ROUNDS,
            busy_timeout_ms: 5000,
        }
    }
}

impl OriginStoreConfig {
    /// Default layout rooted at one directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db_path: dir.join("metadata.sqlite"),
            blob_dir: dir.join("blobs"),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> FsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FsError::IoError(format!("read {} failed: {}", path.display(), e)))?;
        serde_json::from_str::<Self>(&content)
            .map_err(|e| FsError::InvalidParam(format!("parse {} failed: {}", path.display(), e)))
    }

    pub fn manager_options(&self) -> ManagerOptions {
        let defaults = ManagerOptions::default();
        ManagerOptions {
            page_size: if self.page_size == 0 {
                warn!("page_size 0 in config, using {}", defaults.page_size);
                defaults.page_size
            } else {
                self.page_size
            },
            max_id_rounds: if self.max_id_rounds == 0 {
                defaults.max_id_rounds
            } else {
                self.max_id_rounds
            },
        }
    }
}

/// Owns everything one origin needs and lends it to `DatabaseManager`.
pub struct OriginStore {
    origin: String,
    conn: Connection,
    blob_mgr: LocalFileBlobManager,
    locks: ExclusiveLockRegistry,
    id_gen: Sha256EntryIdGenerator,
    root_entry: EntryId,
    options: ManagerOptions,
}

impl OriginStore {
    pub fn open(config: &OriginStoreConfig, origin: &str) -> FsResult<Self> {
        if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| FsError::IoError(format!("create {} failed: {}", dir.display(), e)))?;
        }
        let conn = Connection::open_with_flags(
            &config.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| FsError::DbError(format!("open db failed: {}", e)))?;
        init_connection(&conn, config.busy_timeout_ms)?;
        create_schema(&conn)?;

        let id_gen = Sha256EntryIdGenerator;
        let root_entry = ensure_root_entry(&conn, &id_gen, origin)?;
        let blob_mgr = LocalFileBlobManager::new(config.blob_dir.clone())?;

        info!(
            "opened origin store for {} at {}",
            origin,
            config.db_path.display()
        );
        Ok(Self {
            origin: origin.to_string(),
            conn,
            blob_mgr,
            locks: ExclusiveLockRegistry::new(),
            id_gen,
            root_entry,
            options: config.manager_options(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn root_entry(&self) -> &EntryId {
        &self.root_entry
    }

    pub fn locks(&self) -> &ExclusiveLockRegistry {
        &self.locks
    }

    pub fn blob_mgr(&self) -> &LocalFileBlobManager {
        &self.blob_mgr
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn manager(&self) -> DatabaseManager<'_> {
        DatabaseManager::new(
            &self.conn,
            &self.blob_mgr,
            &self.locks,
            &self.id_gen,
            self.root_entry,
        )
        .with_options(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opfs_lib::FileSystemChildMetadata;
    use tempfile::TempDir;

    #[test]
    fn test_config_load_with_aliases_and_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let config_path = tmp_dir.path().join("opfs.json");
        std::fs::write(
            &config_path,
            r#"{ "meta_db_path": "/tmp/x/meta.db", "page_size": 16 }"#,
        )
        .unwrap();

        let config = OriginStoreConfig::load(&config_path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x/meta.db"));
        assert_eq!(config.blob_dir, PathBuf::from("blobs"));
        assert_eq!(config.manager_options().page_size, 16);
        assert_eq!(config.manager_options().max_id_rounds, DEFAULT_MAX_ID_ROUNDS);

        std::fs::write(&config_path, "not json").unwrap();
        let err = OriginStoreConfig::load(&config_path).unwrap_err();
        assert!(matches!(err, FsError::InvalidParam(_)));

        let err = OriginStoreConfig::load(&tmp_dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, FsError::IoError(_)));
    }

    #[test]
    fn test_reopen_keeps_tree() {
        let tmp_dir = TempDir::new().unwrap();
        let config = OriginStoreConfig::in_dir(tmp_dir.path());

        let first_id = {
            let store = OriginStore::open(&config, "https://example.com").unwrap();
            let dm = store.manager();
            let child = FileSystemChildMetadata::new(*store.root_entry(), "First");
            dm.get_or_create_directory(&child, true).unwrap()
        };

        let store = OriginStore::open(&config, "https://example.com").unwrap();
        let dm = store.manager();
        let child = FileSystemChildMetadata::new(*store.root_entry(), "First");
        assert_eq!(dm.get_or_create_directory(&child, false).unwrap(), first_id);
        assert_eq!(dm.get_usage().unwrap(), 5);
    }
}

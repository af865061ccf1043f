// opfs_meta keeps the directory tree of one origin's private file system in
// sqlite. File bytes live in a FileBlobManager, open handles are tracked by a
// LockRegistry; both are supplied by the embedding process.

pub mod blob_mgr;
pub mod db_manager;
pub mod lock_registry;
pub mod origin_store;
pub mod schema;

mod path_query;
mod queries;
mod statement;
mod unique_id;
mod usage;

pub use blob_mgr::{BlobHandle, FileBlobManager, LocalFileBlobManager};
pub use db_manager::{DatabaseManager, FileInfo, ManagerOptions, DEFAULT_PAGE_SIZE};
pub use lock_registry::{ExclusiveLockRegistry, LockRegistry};
pub use origin_store::{OriginStore, OriginStoreConfig};
pub use unique_id::DEFAULT_MAX_ID_ROUNDS;

use crate::blob_mgr::{BlobHandle, FileBlobManager};
use crate::lock_registry::LockRegistry;
use crate::path_query::{file_descendants, is_ancestor, resolve_reversed_path};
use crate::queries;
use crate::statement::ImmediateTxn;
use crate::unique_id::{get_unique_entry_id, DEFAULT_MAX_ID_ROUNDS};
use crate::usage;
use log::{debug, warn};
use opfs_lib::{
    is_valid_name, map_db_err, name_usage, EntryId, EntryIdGenerator, EntryKind, EntryPath,
    FileSystemChildMetadata, FileSystemDirectoryListing, FileSystemEntryMetadata,
    FileSystemEntryPair, FsError, FsResult, PageNumber, Usage,
};
use rusqlite::{params, Connection};

/// Directory listings are served in pages of this many Entries rows.
pub const DEFAULT_PAGE_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub page_size: u32,
    pub max_id_rounds: u32,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_id_rounds: DEFAULT_MAX_ID_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Empty when the file has no type.
    pub content_type: String,
    pub last_modified_ms: i64,
    /// Names from the origin root to the file.
    pub path: EntryPath,
    pub blob: BlobHandle,
}

/// Metadata operations for one origin's tree.
///
/// Borrows an open, migrated connection and the collaborators for its
/// lifetime; none of them are torn down here. Calls on one connection must be
/// serialized by the caller.
pub struct DatabaseManager<'a> {
    conn: &'a Connection,
    blob_mgr: &'a dyn FileBlobManager,
    locks: &'a dyn LockRegistry,
    id_gen: &'a dyn EntryIdGenerator,
    root_entry: EntryId,
    options: ManagerOptions,
}

impl<'a> DatabaseManager<'a> {
    pub fn new(
        conn: &'a Connection,
        blob_mgr: &'a dyn FileBlobManager,
        locks: &'a dyn LockRegistry,
        id_gen: &'a dyn EntryIdGenerator,
        root_entry: EntryId,
    ) -> Self {
        Self {
            conn,
            blob_mgr,
            locks,
            id_gen,
            root_entry,
            options: ManagerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root_entry(&self) -> &EntryId {
        &self.root_entry
    }

    pub fn does_directory_exist(&self, child: &FileSystemChildMetadata) -> FsResult<bool> {
        queries::does_directory_exist(self.conn, child)
    }

    pub fn is_directory_id(&self, entry_id: &EntryId) -> FsResult<bool> {
        queries::is_directory_id(self.conn, entry_id)
    }

    pub fn does_file_exist(&self, child: &FileSystemChildMetadata) -> FsResult<bool> {
        queries::does_file_exist(self.conn, child)
    }

    pub fn is_file_id(&self, entry_id: &EntryId) -> FsResult<bool> {
        queries::is_file_id(self.conn, entry_id)
    }

    /// NotFound when the id is neither a file nor a directory.
    pub fn entry_kind(&self, entry_id: &EntryId) -> FsResult<EntryKind> {
        queries::entry_kind(self.conn, entry_id)
    }

    pub fn is_file(&self, entry_id: &EntryId) -> FsResult<bool> {
        Ok(self.entry_kind(entry_id)?.is_file())
    }

    pub fn find_entry_id(
        &self,
        child: &FileSystemChildMetadata,
        kind: EntryKind,
    ) -> FsResult<EntryId> {
        queries::find_entry_id(self.conn, child, kind)
    }

    pub fn is_directory_empty(&self, entry_id: &EntryId) -> FsResult<bool> {
        queries::is_directory_empty(self.conn, entry_id)
    }

    pub fn get_or_create_directory(
        &self,
        child: &FileSystemChildMetadata,
        create: bool,
    ) -> FsResult<EntryId> {
        self.get_or_create_entry(child, EntryKind::Directory, create)
    }

    pub fn get_or_create_file(
        &self,
        child: &FileSystemChildMetadata,
        create: bool,
    ) -> FsResult<EntryId> {
        self.get_or_create_entry(child, EntryKind::File, create)
    }

    fn get_or_create_entry(
        &self,
        child: &FileSystemChildMetadata,
        kind: EntryKind,
        create: bool,
    ) -> FsResult<EntryId> {
        let name = &child.child_name;
        if !is_valid_name(name) {
            return Err(FsError::TypeMismatch(format!("invalid name: {:?}", name)));
        }

        // A file and a directory may not share a name under one parent.
        let (other_exists, same_exists) = match kind {
            EntryKind::Directory => (
                self.does_file_exist(child)?,
                self.does_directory_exist(child)?,
            ),
            EntryKind::File => (
                self.does_directory_exist(child)?,
                self.does_file_exist(child)?,
            ),
        };
        if other_exists {
            return Err(FsError::TypeMismatch(format!(
                "{} already exists under {} with another kind",
                name, child.parent_id
            )));
        }
        if same_exists {
            return self.find_entry_id(child, kind);
        }
        if !create {
            return Err(FsError::NotFound(format!(
                "{} not found under {}",
                name, child.parent_id
            )));
        }

        let entry_id =
            get_unique_entry_id(self.conn, self.id_gen, child, self.options.max_id_rounds)?;

        let txn = ImmediateTxn::begin(self.conn, "get_or_create_entry")?;
        txn.conn()
            .execute(
                "INSERT INTO Entries (handle, parent) VALUES (?1, ?2)",
                params![entry_id, child.parent_id],
            )
            .map_err(map_db_err)?;
        let insert_kind = match kind {
            EntryKind::Directory => "INSERT INTO Directories (handle, name) VALUES (?1, ?2)",
            EntryKind::File => "INSERT INTO Files (handle, name) VALUES (?1, ?2)",
        };
        txn.conn()
            .execute(insert_kind, params![entry_id, name])
            .map_err(map_db_err)?;
        usage::update_usage(txn.conn(), name_usage(name))?;
        txn.commit()?;

        debug!(
            "created {:?} {} as {} under {}",
            kind, name, entry_id, child.parent_id
        );
        Ok(entry_id)
    }

    /// One page of a directory's children, split by kind. No ordering is
    /// promised beyond being stable for an unchanged directory.
    pub fn get_directory_entries(
        &self,
        parent: &EntryId,
        page: PageNumber,
    ) -> FsResult<FileSystemDirectoryListing> {
        if !self.is_directory_id(parent)? {
            return Err(FsError::NotFound(format!("directory {} not found", parent)));
        }

        let page_size = self.options.page_size;
        let directories =
            queries::get_entries_page(self.conn, parent, EntryKind::Directory, page, page_size)?;
        let files = queries::get_entries_page(self.conn, parent, EntryKind::File, page, page_size)?;
        Ok(FileSystemDirectoryListing { directories, files })
    }

    pub fn get_file(&self, entry_id: &EntryId) -> FsResult<FileInfo> {
        if !self.is_file_id(entry_id)? {
            return Err(FsError::NotFound(format!("file {} not found", entry_id)));
        }

        let mut path =
            resolve_reversed_path(self.conn, &FileSystemEntryPair::new(self.root_entry, *entry_id))?;
        if path.is_empty() {
            return Err(FsError::NotFound(format!(
                "file {} is not reachable from root",
                entry_id
            )));
        }
        path.reverse();

        let content_type = queries::file_content_type(self.conn, entry_id)?.unwrap_or_default();
        let blob = self.blob_mgr.get_or_create_blob(entry_id)?;
        Ok(FileInfo {
            content_type,
            last_modified_ms: blob.last_modified_ms,
            path,
            blob,
        })
    }

    /// Ok(false) when there is no such directory.
    pub fn remove_directory(
        &self,
        child: &FileSystemChildMetadata,
        recursive: bool,
    ) -> FsResult<bool> {
        if child.child_name.is_empty() || !self.does_directory_exist(child)? {
            return Ok(false);
        }

        let entry_id = self.find_entry_id(child, EntryKind::Directory)?;
        if !recursive && !self.is_directory_empty(&entry_id)? {
            return Err(FsError::InvalidModification(format!(
                "directory {} is not empty",
                child.child_name
            )));
        }

        let txn = ImmediateTxn::begin(self.conn, "remove_directory")?;
        let descendants = file_descendants(txn.conn(), &entry_id)?;
        txn.conn()
            .execute("DELETE FROM Entries WHERE handle = ?1", params![entry_id])
            .map_err(map_db_err)?;
        // Names removed by the cascade are not subtracted from usage.
        usage::update_usage(txn.conn(), -name_usage(&child.child_name))?;
        txn.commit()?;

        debug!(
            "removed directory {} ({} files below)",
            entry_id,
            descendants.len()
        );
        for file_id in descendants.iter() {
            if let Err(e) = self.blob_mgr.remove_blob(file_id) {
                warn!("remove blob of {} failed: {}", file_id, e);
            }
        }
        Ok(true)
    }

    /// Ok(false) when there is no such file.
    pub fn remove_file(&self, child: &FileSystemChildMetadata) -> FsResult<bool> {
        if child.child_name.is_empty() || !self.does_file_exist(child)? {
            return Ok(false);
        }

        let entry_id = self.find_entry_id(child, EntryKind::File)?;
        if self.locks.is_locked(&entry_id) {
            debug!("refusing to remove in-use file {}", entry_id);
            return Err(FsError::InvalidModification(format!(
                "file {} is in use",
                child.child_name
            )));
        }

        let txn = ImmediateTxn::begin(self.conn, "remove_file")?;
        txn.conn()
            .execute("DELETE FROM Entries WHERE handle = ?1", params![entry_id])
            .map_err(map_db_err)?;
        usage::update_usage(txn.conn(), -name_usage(&child.child_name))?;
        txn.commit()?;

        debug!("removed file {}", entry_id);
        if let Err(e) = self.blob_mgr.remove_blob(&entry_id) {
            warn!("remove blob of {} failed: {}", entry_id, e);
        }
        Ok(true)
    }

    pub fn rename_entry(
        &self,
        handle: &FileSystemEntryMetadata,
        new_name: &str,
    ) -> FsResult<bool> {
        let entry_id = &handle.entry_id;
        if *entry_id == self.root_entry {
            return Err(FsError::NotFound("root cannot be renamed".to_string()));
        }

        // A vanished source is NotFound, not Ok(false).
        let kind = self.entry_kind(entry_id)?;
        if handle.entry_name == new_name {
            return Ok(true);
        }
        if !is_valid_name(new_name) {
            return Err(FsError::TypeMismatch(format!("invalid name: {:?}", new_name)));
        }

        let txn = ImmediateTxn::begin(self.conn, "rename_entry")?;
        if let Some(parent_id) = queries::entry_parent(txn.conn(), entry_id)? {
            let sibling = FileSystemChildMetadata::new(parent_id, new_name);
            if queries::does_file_exist(txn.conn(), &sibling)?
                || queries::does_directory_exist(txn.conn(), &sibling)?
            {
                return Err(FsError::NoModificationAllowed(format!(
                    "{} already exists under {}",
                    new_name, parent_id
                )));
            }
        }
        self.perform_rename(txn.conn(), handle, kind, new_name)?;
        txn.commit()?;
        Ok(true)
    }

    /// Reparents and optionally renames an entry. Never replaces an existing
    /// destination.
    pub fn move_entry(
        &self,
        handle: &FileSystemEntryMetadata,
        new_designation: &FileSystemChildMetadata,
    ) -> FsResult<bool> {
        let entry_id = &handle.entry_id;
        if *entry_id == self.root_entry {
            return Err(FsError::NotFound("root cannot be moved".to_string()));
        }

        let txn = ImmediateTxn::begin(self.conn, "move_entry")?;
        // A vanished source is NotFound, not Ok(false).
        let kind = queries::entry_kind(txn.conn(), entry_id)?;
        if kind.is_file() && self.locks.is_locked(entry_id) {
            debug!("refusing to move in-use file {}", entry_id);
            return Err(FsError::NoModificationAllowed(format!(
                "file {} is in use",
                handle.entry_name
            )));
        }

        // Both kinds are checked; the caller's is_directory flag is not trusted.
        if queries::does_file_exist(txn.conn(), new_designation)?
            || queries::does_directory_exist(txn.conn(), new_designation)?
        {
            return Err(FsError::NoModificationAllowed(format!(
                "{} already exists under {}",
                new_designation.child_name, new_designation.parent_id
            )));
        }

        let under_self = is_ancestor(
            txn.conn(),
            &FileSystemEntryPair::new(*entry_id, new_designation.parent_id),
        )?;
        if under_self {
            return Err(FsError::InvalidModification(format!(
                "cannot move {} below itself",
                handle.entry_name
            )));
        }

        txn.conn()
            .execute(
                "UPDATE Entries SET parent = ?1 WHERE handle = ?2",
                params![new_designation.parent_id, entry_id],
            )
            .map_err(map_db_err)?;

        if handle.entry_name != new_designation.child_name {
            self.perform_rename(txn.conn(), handle, kind, &new_designation.child_name)?;
        }
        txn.commit()?;

        debug!(
            "moved {} to {} under {}",
            entry_id, new_designation.child_name, new_designation.parent_id
        );
        Ok(true)
    }

    fn perform_rename(
        &self,
        conn: &Connection,
        handle: &FileSystemEntryMetadata,
        kind: EntryKind,
        new_name: &str,
    ) -> FsResult<()> {
        if !is_valid_name(new_name) {
            return Err(FsError::TypeMismatch(format!("invalid name: {:?}", new_name)));
        }

        let update_name = match kind {
            EntryKind::Directory => "UPDATE Directories SET name = ?1 WHERE handle = ?2",
            EntryKind::File => "UPDATE Files SET name = ?1 WHERE handle = ?2",
        };
        conn.execute(update_name, params![new_name, handle.entry_id])
            .map_err(map_db_err)?;

        let delta = name_usage(new_name) - name_usage(&handle.entry_name);
        if delta != 0 {
            usage::update_usage(conn, delta)?;
        }
        Ok(())
    }

    /// Names from `parent_id` down to `child_id`; empty when `parent_id` is not
    /// an ancestor.
    pub fn resolve(&self, endpoints: &FileSystemEntryPair) -> FsResult<EntryPath> {
        let mut path = resolve_reversed_path(self.conn, endpoints)?;
        path.reverse();
        Ok(path)
    }

    pub fn is_ancestor(&self, endpoints: &FileSystemEntryPair) -> FsResult<bool> {
        is_ancestor(self.conn, endpoints)
    }

    pub fn get_usage(&self) -> FsResult<Usage> {
        usage::get_usage(self.conn)
    }

    pub fn update_usage(&self, delta: Usage) -> FsResult<()> {
        usage::update_usage(self.conn, delta)
    }

    pub fn aggregate_usages(&self) -> FsResult<()> {
        usage::aggregate_usages(self.conn)
    }
}

use crate::statement::yes_or_no;
use opfs_lib::{
    map_db_err, EntryId, EntryKind, FileSystemChildMetadata, FileSystemEntryMetadata, FsError,
    FsResult, PageNumber,
};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn does_directory_exist(
    conn: &Connection,
    child: &FileSystemChildMetadata,
) -> FsResult<bool> {
    yes_or_no(
        conn,
        "SELECT EXISTS (
            SELECT 1 FROM Directories JOIN Entries USING (handle)
            WHERE Directories.name = ?2 AND Entries.parent = ?1
        )",
        params![child.parent_id, child.child_name],
    )
}

pub(crate) fn is_directory_id(conn: &Connection, entry_id: &EntryId) -> FsResult<bool> {
    yes_or_no(
        conn,
        "SELECT EXISTS (SELECT 1 FROM Directories WHERE handle = ?1)",
        params![entry_id],
    )
}

pub(crate) fn does_file_exist(conn: &Connection, child: &FileSystemChildMetadata) -> FsResult<bool> {
    yes_or_no(
        conn,
        "SELECT EXISTS (
            SELECT 1 FROM Files JOIN Entries USING (handle)
            WHERE Files.name = ?2 AND Entries.parent = ?1
        )",
        params![child.parent_id, child.child_name],
    )
}

pub(crate) fn is_file_id(conn: &Connection, entry_id: &EntryId) -> FsResult<bool> {
    yes_or_no(
        conn,
        "SELECT EXISTS (SELECT 1 FROM Files WHERE handle = ?1)",
        params![entry_id],
    )
}

pub(crate) fn does_entry_exist(conn: &Connection, entry_id: &EntryId) -> FsResult<bool> {
    yes_or_no(
        conn,
        "SELECT EXISTS (SELECT 1 FROM Entries WHERE handle = ?1)",
        params![entry_id],
    )
}

/// Probes the file table first, then the directory table.
pub(crate) fn entry_kind(conn: &Connection, entry_id: &EntryId) -> FsResult<EntryKind> {
    if is_file_id(conn, entry_id)? {
        return Ok(EntryKind::File);
    }
    if is_directory_id(conn, entry_id)? {
        return Ok(EntryKind::Directory);
    }
    Err(FsError::NotFound(format!("entry {} not found", entry_id)))
}

pub(crate) fn find_entry_id(
    conn: &Connection,
    child: &FileSystemChildMetadata,
    kind: EntryKind,
) -> FsResult<EntryId> {
    let sql = match kind {
        EntryKind::Directory => {
            "SELECT Entries.handle FROM Directories JOIN Entries USING (handle)
             WHERE Directories.name = ?2 AND Entries.parent = ?1"
        }
        EntryKind::File => {
            "SELECT Entries.handle FROM Files JOIN Entries USING (handle)
             WHERE Files.name = ?2 AND Entries.parent = ?1"
        }
    };
    conn.query_row(sql, params![child.parent_id, child.child_name], |row| {
        row.get::<_, EntryId>(0)
    })
    .optional()
    .map_err(map_db_err)?
    .ok_or_else(|| {
        FsError::NotFound(format!(
            "{} not found under {}",
            child.child_name, child.parent_id
        ))
    })
}

pub(crate) fn entry_parent(conn: &Connection, entry_id: &EntryId) -> FsResult<Option<EntryId>> {
    conn.query_row(
        "SELECT parent FROM Entries WHERE handle = ?1",
        params![entry_id],
        |row| row.get::<_, Option<EntryId>>(0),
    )
    .optional()
    .map_err(map_db_err)?
    .ok_or_else(|| FsError::NotFound(format!("entry {} not found", entry_id)))
}

pub(crate) fn is_directory_empty(conn: &Connection, entry_id: &EntryId) -> FsResult<bool> {
    let has_children = yes_or_no(
        conn,
        "SELECT EXISTS (SELECT 1 FROM Entries WHERE parent = ?1)",
        params![entry_id],
    )?;
    Ok(!has_children)
}

/// Content type of a file; `None` when unset or when there is no such file.
pub(crate) fn file_content_type(conn: &Connection, entry_id: &EntryId) -> FsResult<Option<String>> {
    let content_type = conn
        .query_row(
            "SELECT type FROM Files INNER JOIN Entries USING (handle) WHERE handle = ?1",
            params![entry_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(map_db_err)?;
    Ok(content_type.flatten())
}

/// One page of a directory's children of the given kind. The page window is
/// applied to the parent's Entries rows before they are split by kind.
pub(crate) fn get_entries_page(
    conn: &Connection,
    parent: &EntryId,
    kind: EntryKind,
    page: PageNumber,
    page_size: u32,
) -> FsResult<Vec<FileSystemEntryMetadata>> {
    let sql = match kind {
        EntryKind::Directory => {
            "SELECT Dirs.handle, Dirs.name
             FROM Directories AS Dirs
             INNER JOIN (
                SELECT handle FROM Entries WHERE parent = ?1 ORDER BY rowid LIMIT ?2 OFFSET ?3
             ) AS Ents
             ON Dirs.handle = Ents.handle"
        }
        EntryKind::File => {
            "SELECT Files.handle, Files.name
             FROM Files
             INNER JOIN (
                SELECT handle FROM Entries WHERE parent = ?1 ORDER BY rowid LIMIT ?2 OFFSET ?3
             ) AS Ents
             ON Files.handle = Ents.handle"
        }
    };
    let offset = page as i64 * page_size as i64;
    let mut stmt = conn.prepare(sql).map_err(map_db_err)?;
    let rows = stmt
        .query_map(params![parent, page_size as i64, offset], |row| {
            Ok((row.get::<_, EntryId>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(map_db_err)?;

    let mut entries = Vec::new();
    for row in rows {
        let (entry_id, entry_name) = row.map_err(map_db_err)?;
        entries.push(FileSystemEntryMetadata::new(
            entry_id,
            entry_name,
            kind.is_directory(),
        ));
    }
    Ok(entries)
}

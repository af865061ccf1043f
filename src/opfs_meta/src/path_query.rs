// Recursive walks over the Entries parent pointers.

use crate::statement::yes_or_no;
use opfs_lib::{map_db_err, EntryId, EntryPath, FileSystemEntryPair, FsResult};
use rusqlite::{params, Connection};

const FOLLOW_PATH_CTE: &str = "WITH RECURSIVE followPath(handle, parent, depth) AS (
        SELECT handle, parent, 0 FROM Entries WHERE handle = ?1
        UNION
        SELECT Entries.handle, Entries.parent, followPath.depth + 1
        FROM followPath, Entries
        WHERE followPath.parent = Entries.handle
    )";

/// Names from `child_id` up to, but excluding, `parent_id`, child first.
///
/// Empty when `parent_id` is not an ancestor of `child_id`.
pub(crate) fn resolve_reversed_path(
    conn: &Connection,
    endpoints: &FileSystemEntryPair,
) -> FsResult<EntryPath> {
    let sql = format!(
        "{}
        SELECT COALESCE(Directories.name, Files.name), followPath.handle
        FROM followPath
        LEFT JOIN Directories USING (handle)
        LEFT JOIN Files USING (handle)
        ORDER BY followPath.depth",
        FOLLOW_PATH_CTE
    );
    let mut stmt = conn.prepare(&sql).map_err(map_db_err)?;
    let rows = stmt
        .query_map(params![endpoints.child_id], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, EntryId>(1)?))
        })
        .map_err(map_db_err)?;

    let mut path = EntryPath::new();
    for row in rows {
        let (name, entry_id) = row.map_err(map_db_err)?;
        if entry_id == endpoints.parent_id {
            return Ok(path);
        }
        path.push(name.unwrap_or_default());
    }

    Ok(EntryPath::new())
}

/// True when `parent_id` is `child_id` itself or one of its ancestors.
pub(crate) fn is_ancestor(conn: &Connection, endpoints: &FileSystemEntryPair) -> FsResult<bool> {
    let sql = format!(
        "{}
        SELECT EXISTS (SELECT 1 FROM followPath WHERE handle = ?2)",
        FOLLOW_PATH_CTE
    );
    yes_or_no(
        conn,
        &sql,
        params![endpoints.child_id, endpoints.parent_id],
    )
}

/// Every file in the subtree rooted at `entry_id`, the root included.
pub(crate) fn file_descendants(conn: &Connection, entry_id: &EntryId) -> FsResult<Vec<EntryId>> {
    let mut stmt = conn
        .prepare(
            "WITH RECURSIVE traceChildren(handle) AS (
                SELECT handle FROM Entries WHERE handle = ?1
                UNION
                SELECT Entries.handle FROM traceChildren, Entries
                WHERE traceChildren.handle = Entries.parent
            )
            SELECT handle FROM traceChildren INNER JOIN Files USING (handle)",
        )
        .map_err(map_db_err)?;
    let rows = stmt
        .query_map(params![entry_id], |row| row.get::<_, EntryId>(0))
        .map_err(map_db_err)?;

    let mut descendants = Vec::new();
    for row in rows {
        descendants.push(row.map_err(map_db_err)?);
    }
    Ok(descendants)
}

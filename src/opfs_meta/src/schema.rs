use log::{debug, info};
use opfs_lib::{map_db_err, EntryId, EntryIdGenerator, FsError, FsResult};
use rusqlite::{params, Connection};

pub fn init_connection(conn: &Connection, busy_timeout_ms: u32) -> FsResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {};",
        busy_timeout_ms
    ))
    .map_err(|e| FsError::DbError(format!("pragma failed: {}", e)))?;
    Ok(())
}

/// Creates the four relations. Deleting an Entries row cascades to its
/// kind row and, through the Directories row, to every Entries row below it.
/// Only a directory can be a parent.
pub fn create_schema(conn: &Connection) -> FsResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS Entries (
            handle BLOB PRIMARY KEY,
            parent BLOB,
            FOREIGN KEY (parent) REFERENCES Directories(handle) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_entries_parent ON Entries(parent);

        CREATE TABLE IF NOT EXISTS Directories (
            handle BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            FOREIGN KEY (handle) REFERENCES Entries(handle) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS Files (
            handle BLOB PRIMARY KEY,
            type TEXT,
            name TEXT NOT NULL,
            FOREIGN KEY (handle) REFERENCES Entries(handle) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS Usages (
            usage INTEGER NOT NULL,
            aggregated INTEGER NOT NULL DEFAULT 0
        );",
    )
    .map_err(|e| FsError::DbError(format!("create schema failed: {}", e)))?;
    Ok(())
}

/// Returns the origin's root id, inserting the root rows on first use.
pub fn ensure_root_entry(
    conn: &Connection,
    id_gen: &dyn EntryIdGenerator,
    origin: &str,
) -> FsResult<EntryId> {
    let root = id_gen.root_id(origin)?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO Entries (handle, parent) VALUES (?1, NULL)",
            params![root],
        )
        .map_err(map_db_err)?;
    if inserted > 0 {
        conn.execute(
            "INSERT INTO Directories (handle, name) VALUES (?1, '')",
            params![root],
        )
        .map_err(map_db_err)?;
        info!("created root entry {} for origin {}", root, origin);
    } else {
        debug!("root entry {} for origin {} already exists", root, origin);
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opfs_lib::Sha256EntryIdGenerator;

    #[test]
    fn test_schema_and_root_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_connection(&conn, 1000).unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();

        let gen = Sha256EntryIdGenerator;
        let root = ensure_root_entry(&conn, &gen, "https://example.com").unwrap();
        let again = ensure_root_entry(&conn, &gen, "https://example.com").unwrap();
        assert_eq!(root, again);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Directories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let parent: Option<EntryId> = conn
            .query_row(
                "SELECT parent FROM Entries WHERE handle = ?1",
                params![root],
                |row| row.get(0),
            )
            .unwrap();
        assert!(parent.is_none());
    }
}

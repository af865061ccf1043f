use log::warn;
use opfs_lib::{map_db_err, FsResult};
use rusqlite::{Connection, Params};

/// Runs a `SELECT EXISTS (...)` style query.
pub(crate) fn yes_or_no<P: Params>(conn: &Connection, sql: &str, params: P) -> FsResult<bool> {
    conn.query_row(sql, params, |row| row.get::<_, bool>(0))
        .map_err(map_db_err)
}

/// Immediate write transaction on a borrowed connection.
///
/// Rolls back on drop unless `commit` succeeded. When the connection is
/// already inside a transaction the guard opens a named savepoint instead, so
/// nested work joins the outer transaction and can be undone on its own.
pub(crate) struct ImmediateTxn<'c> {
    conn: &'c Connection,
    savepoint: Option<&'static str>,
    finished: bool,
}

impl<'c> ImmediateTxn<'c> {
    pub(crate) fn begin(conn: &'c Connection, name: &'static str) -> FsResult<Self> {
        let savepoint = if conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE").map_err(map_db_err)?;
            None
        } else {
            conn.execute_batch(&format!("SAVEPOINT {}", name))
                .map_err(map_db_err)?;
            Some(name)
        };
        Ok(Self {
            conn,
            savepoint,
            finished: false,
        })
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub(crate) fn commit(mut self) -> FsResult<()> {
        let sql = match self.savepoint {
            None => "COMMIT".to_string(),
            Some(name) => format!("RELEASE SAVEPOINT {}", name),
        };
        self.conn.execute_batch(&sql).map_err(map_db_err)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ImmediateTxn<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let sql = match self.savepoint {
            None => "ROLLBACK".to_string(),
            Some(name) => format!(
                "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0};",
                name
            ),
        };
        if let Err(e) = self.conn.execute_batch(&sql) {
            warn!("rollback failed: {}", e);
        }
    }
}

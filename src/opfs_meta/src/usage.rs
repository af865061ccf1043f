use crate::statement::ImmediateTxn;
use log::{debug, warn};
use opfs_lib::{map_db_err, FsResult, Usage};
use rusqlite::{params, Connection};

/// Sum of all rows not yet folded by an aggregation pass. The previous total
/// is itself one of those rows, so this is the full usage.
pub(crate) fn get_usage(conn: &Connection) -> FsResult<Usage> {
    conn.query_row(
        "SELECT COALESCE(SUM(usage), 0) FROM Usages WHERE aggregated = 0",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map_err(map_db_err)
}

/// Appends one delta row, then tries to fold the ledger. A failed fold is
/// only logged; the unfolded ledger still sums to the right total.
pub(crate) fn update_usage(conn: &Connection, delta: Usage) -> FsResult<()> {
    conn.execute(
        "INSERT INTO Usages (usage, aggregated) VALUES (?1, 0)",
        params![delta],
    )
    .map_err(map_db_err)?;

    if let Err(e) = aggregate_usages(conn) {
        warn!("aggregate usages failed, will retry on next update: {}", e);
    }
    Ok(())
}

/// Folds every unaggregated row into one total row.
///
/// Two passes running at the same time on one store give undefined results;
/// callers must keep a single writer per connection.
pub(crate) fn aggregate_usages(conn: &Connection) -> FsResult<()> {
    let txn = ImmediateTxn::begin(conn, "aggregate_usages")?;

    let inserted = txn
        .conn()
        .execute(
            "INSERT INTO Usages (usage, aggregated)
             SELECT total, 1 FROM (
                SELECT SUM(usage) OVER (ORDER BY rowid ROWS UNBOUNDED PRECEDING) AS total,
                       rowid AS seq
                FROM Usages
                WHERE aggregated = 0
             )
             ORDER BY seq DESC
             LIMIT 1",
            [],
        )
        .map_err(map_db_err)?;

    let folded = txn
        .conn()
        .execute("DELETE FROM Usages WHERE aggregated = 0", [])
        .map_err(map_db_err)?;

    txn.conn()
        .execute("UPDATE Usages SET aggregated = NOT aggregated", [])
        .map_err(map_db_err)?;

    txn.commit()?;
    debug!("aggregated {} usage rows into {}", folded, inserted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;

    fn usage_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM Usages", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_empty_ledger_is_zero() {
        let conn = usage_conn();
        assert_eq!(get_usage(&conn).unwrap(), 0);
        aggregate_usages(&conn).unwrap();
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn test_update_usage_folds_into_single_row() {
        let conn = usage_conn();
        update_usage(&conn, 5).unwrap();
        update_usage(&conn, 6).unwrap();
        update_usage(&conn, -2).unwrap();
        assert_eq!(get_usage(&conn).unwrap(), 9);
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn test_failed_fold_keeps_deltas() {
        let conn = usage_conn();
        conn.execute_batch(
            "CREATE TRIGGER block_fold BEFORE INSERT ON Usages WHEN NEW.aggregated = 1
             BEGIN SELECT RAISE(ABORT, 'fold blocked'); END;",
        )
        .unwrap();

        update_usage(&conn, 5).unwrap();
        update_usage(&conn, 6).unwrap();
        update_usage(&conn, -2).unwrap();
        assert!(aggregate_usages(&conn).is_err());
        assert!(conn.is_autocommit());
        assert_eq!(row_count(&conn), 3);
        assert_eq!(get_usage(&conn).unwrap(), 9);
    }

    #[test]
    fn test_unaggregated_rows_still_count() {
        let conn = usage_conn();
        for delta in [3i64, 4, 10] {
            conn.execute(
                "INSERT INTO Usages (usage, aggregated) VALUES (?1, 0)",
                params![delta],
            )
            .unwrap();
        }
        assert_eq!(get_usage(&conn).unwrap(), 17);
        assert_eq!(row_count(&conn), 3);

        aggregate_usages(&conn).unwrap();
        assert_eq!(get_usage(&conn).unwrap(), 17);
        assert_eq!(row_count(&conn), 1);

        aggregate_usages(&conn).unwrap();
        assert_eq!(get_usage(&conn).unwrap(), 17);
        assert_eq!(row_count(&conn), 1);
    }
}

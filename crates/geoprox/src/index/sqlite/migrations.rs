//! Versioned schema upgrades for the point store.
//!
//! The applied version lives in the `metadata` table. Each pending
//! [`Migration`] runs in its own transaction together with the version bump,
//! so a crash mid-upgrade leaves the database at the last complete step.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::{Migration, CREATE_METADATA_TABLE, MIGRATIONS};

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Version a fully migrated database reports.
#[must_use]
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring `conn` up to [`latest_version`].
///
/// # Errors
///
/// Returns [`Error::DatabaseMigration`] if the stored version is unreadable
/// or newer than this build understands, or a database error if a step fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_METADATA_TABLE)?;

    let applied = stored_version(conn)?;
    let latest = latest_version();
    if applied > latest {
        return Err(Error::DatabaseMigration {
            message: format!("database is at schema version {applied}, newest known is {latest}"),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }
    Ok(())
}

/// Version recorded in `metadata`, 0 for a new database.
fn stored_version(conn: &Connection) -> Result<i32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    raw.map_or(Ok(0), |value| {
        value.trim().parse().map_err(|_| Error::DatabaseMigration {
            message: format!("unreadable schema version '{value}'"),
        })
    })
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for statement in migration.statements {
        tx.execute_batch(statement)?;
    }
    tx.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (SCHEMA_VERSION_KEY, migration.version.to_string()),
    )?;
    tx.commit()?;

    info!(
        "Applied schema migration {} ({})",
        migration.version, migration.description
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_names(conn: &Connection, kind: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1")
            .unwrap();
        let names = stmt
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap();
        names
    }

    fn force_version(conn: &Connection, value: &str) {
        conn.execute(
            "UPDATE metadata SET value = ?1 WHERE key = ?2",
            [value, SCHEMA_VERSION_KEY],
        )
        .unwrap();
    }

    #[test]
    fn test_new_database_reaches_latest() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        assert_eq!(stored_version(&conn).unwrap(), latest_version());
        let tables = object_names(&conn, "table");
        assert!(tables.contains(&"points".to_string()));
        assert!(tables.contains(&"metadata".to_string()));
        assert!(object_names(&conn, "index").contains(&"idx_points_updated_at".to_string()));
    }

    #[test]
    fn test_reopen_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("INSERT INTO points VALUES ('alice', 1.0, 2.0, 0)", [])
            .unwrap();

        initialize_schema(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_version_zero_before_migrating() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_METADATA_TABLE).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_unreadable_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        force_version(&conn, "banana");

        let err = initialize_schema(&conn).unwrap_err();
        assert!(matches!(err, Error::DatabaseMigration { .. }));
        assert!(err.to_string().contains("banana"));
    }

    #[test]
    fn test_future_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        force_version(&conn, &(latest_version() + 1).to_string());

        let err = initialize_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("newest known"));
    }
}

//! `SQLite` schema definitions for the point store.

/// SQL statement to create the points table.
///
/// One row per identity; `updated_at` is unix milliseconds.
pub const CREATE_POINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS points (
    identity TEXT PRIMARY KEY NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    updated_at INTEGER NOT NULL
)
";

/// Index on `updated_at`; every live filter and sweep is a range scan on it.
pub const CREATE_UPDATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_points_updated_at ON points(updated_at)
";

/// Key-value table holding the schema version. Created before any migration.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// One step in the schema history.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version the database is at once this step is applied.
    pub version: i32,
    /// Short description for logs.
    pub description: &'static str,
    /// Statements run in one transaction.
    pub statements: &'static [&'static str],
}

/// Every migration, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "points table with updated_at index",
    statements: &[CREATE_POINTS_TABLE, CREATE_UPDATED_AT_INDEX],
}];

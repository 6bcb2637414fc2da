//! `SQLite`-backed proximity index.
//!
//! Points live in a single `points` table keyed by identity. Staleness is
//! filtered in SQL against a cutoff derived from the index clock; distance
//! filtering and ordering happen in Rust with the same haversine code the
//! memory backend uses.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::location::{validate_identity, Coordinate, Neighbor, Point};

use super::{rank_neighbors, IndexOptions, IndexStats, ProximityIndex};

/// Connection busy timeout for file databases shared between processes.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A row as stored: identity, latitude, longitude, `updated_at` millis.
type RawPoint = (String, f64, f64, i64);

/// Proximity index persisted in `SQLite`.
///
/// A single connection sits behind a mutex, so every operation runs as one
/// serialized statement (or a short series of them for sweeps).
#[derive(Debug)]
pub struct SqliteIndex {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    options: IndexOptions,
    ttl: chrono::Duration,
}

impl SqliteIndex {
    /// Open or create a point database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, or the database cannot
    /// be opened or migrated.
    pub fn open(
        path: impl AsRef<Path>,
        options: IndexOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let ttl = options.chrono_ttl()?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets readers proceed while a writer holds the database.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            clock,
            options,
            ttl,
        })
    }

    /// Create an in-memory instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the in-memory database
    /// cannot be created.
    pub fn open_in_memory(options: IndexOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let ttl = options.chrono_ttl()?;
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
            clock,
            options,
            ttl,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::backend("sqlite connection lock poisoned"))
    }

    /// Smallest stored `updated_at` that is still live as of `now`.
    ///
    /// Live means `now - updated_at <= ttl`, i.e. `updated_at >= now - ttl`.
    /// Stored values are whole milliseconds, so round the cutoff up.
    fn live_cutoff_millis(&self, now: DateTime<Utc>) -> i64 {
        let cutoff = now - self.ttl;
        let millis = cutoff.timestamp_millis();
        if cutoff.timestamp_subsec_nanos() % 1_000_000 == 0 {
            millis
        } else {
            millis + 1
        }
    }

    /// Convert a database row into its raw parts.
    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawPoint> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    /// Validate raw parts read back from the database.
    fn raw_to_point((identity, latitude, longitude, updated_at): RawPoint) -> Result<Point> {
        let coordinate = Coordinate::new(latitude, longitude)
            .map_err(|_| Error::backend(format!("corrupt coordinate stored for '{identity}'")))?;
        let updated_at = millis_to_datetime(updated_at)?;
        Ok(Point::new(identity, coordinate, updated_at))
    }

    fn live_row(conn: &Connection, identity: &str, cutoff: i64) -> Result<Option<RawPoint>> {
        let row = conn
            .query_row(
                r"
                SELECT identity, latitude, longitude, updated_at
                FROM points WHERE identity = ?1 AND updated_at >= ?2
                ",
                params![identity, cutoff],
                Self::row_to_raw,
            )
            .optional()?;
        Ok(row)
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::backend(format!("timestamp out of range: {millis}")))
}

impl ProximityIndex for SqliteIndex {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn ttl(&self) -> Duration {
        self.options.ttl
    }

    fn store(&self, identity: &str, coordinate: Coordinate) -> Result<Point> {
        validate_identity(identity)?;
        let updated_millis = self.clock.now().timestamp_millis();

        self.conn()?.execute(
            r"
            INSERT INTO points (identity, latitude, longitude, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(identity) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                updated_at = excluded.updated_at
            ",
            params![
                identity,
                coordinate.latitude(),
                coordinate.longitude(),
                updated_millis,
            ],
        )?;

        debug!("Stored {} at {}", identity, coordinate);
        Ok(Point::new(
            identity.to_string(),
            coordinate,
            millis_to_datetime(updated_millis)?,
        ))
    }

    fn remove(&self, identity: &str) -> Result<()> {
        let cutoff = self.live_cutoff_millis(self.clock.now());
        let conn = self.conn()?;

        let live = conn.execute(
            "DELETE FROM points WHERE identity = ?1 AND updated_at >= ?2",
            params![identity, cutoff],
        )?;
        if live > 0 {
            debug!("Removed {}", identity);
            return Ok(());
        }

        let stale = conn.execute("DELETE FROM points WHERE identity = ?1", [identity])?;
        if stale > 0 {
            debug!("Purged stale point for {}", identity);
        }
        Err(Error::not_found(identity))
    }

    fn locate(&self, identity: &str) -> Result<Option<Point>> {
        let cutoff = self.live_cutoff_millis(self.clock.now());
        let conn = self.conn()?;
        let raw = Self::live_row(&conn, identity, cutoff)?;
        raw.map(Self::raw_to_point).transpose()
    }

    fn query_radius(&self, center: &str, radius_km: f64, limit: usize) -> Result<Vec<Neighbor>> {
        let cutoff = self.live_cutoff_millis(self.clock.now());

        let (center_raw, rows) = {
            let conn = self.conn()?;
            let Some(center_raw) = Self::live_row(&conn, center, cutoff)? else {
                return Err(Error::not_found(center));
            };

            let mut stmt = conn.prepare_cached(
                r"
                SELECT identity, latitude, longitude, updated_at
                FROM points WHERE updated_at >= ?1 AND identity != ?2
                ",
            )?;
            let rows = stmt
                .query_map(params![cutoff, center], Self::row_to_raw)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            (center_raw, rows)
        };

        let center_point = Self::raw_to_point(center_raw)?;
        let candidates = rows
            .into_iter()
            .map(Self::raw_to_point)
            .collect::<Result<Vec<_>>>()?;

        let neighbors = rank_neighbors(
            &center_point,
            candidates
                .iter()
                .map(|point| (point.identity.as_str(), &point.coordinate)),
            radius_km,
            limit,
        );

        trace!(
            "Radius query around {} ({} km) matched {}",
            center,
            radius_km,
            neighbors.len()
        );
        Ok(neighbors)
    }

    fn sweep_expired(&self) -> Result<usize> {
        let cutoff = self.live_cutoff_millis(self.clock.now());
        let batch = self.options.batch_size();
        let batch_i64 = i64::try_from(batch).unwrap_or(i64::MAX);

        let mut removed = 0;
        loop {
            // Each batch takes the connection separately so writers can
            // interleave with a long sweep.
            let affected = self.conn()?.execute(
                r"
                DELETE FROM points WHERE identity IN (
                    SELECT identity FROM points WHERE updated_at < ?1 LIMIT ?2
                )
                ",
                params![cutoff, batch_i64],
            )?;
            removed += affected;
            if affected < batch {
                break;
            }
        }

        if removed > 0 {
            info!("Swept {} expired points", removed);
        }
        Ok(removed)
    }

    fn stats(&self) -> Result<IndexStats> {
        let cutoff = self.live_cutoff_millis(self.clock.now());

        let (total, live, oldest, newest): (i64, i64, Option<i64>, Option<i64>) =
            self.conn()?.query_row(
                r"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN updated_at >= ?1 THEN 1 ELSE 0 END), 0),
                    MIN(updated_at),
                    MAX(updated_at)
                FROM points
                ",
                [cutoff],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let total_points = usize::try_from(total).unwrap_or(0);
        let live_points = usize::try_from(live).unwrap_or(0);

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            total_points,
            live_points,
            stale_points: total_points.saturating_sub(live_points),
            oldest_update: oldest.map(millis_to_datetime).transpose()?,
            newest_update: newest.map(millis_to_datetime).transpose()?,
        })
    }
}

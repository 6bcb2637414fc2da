//! The proximity index.
//!
//! [`ProximityIndex`] is the seam between the service boundary and the
//! storage backend. Two backends implement it:
//!
//! - [`MemoryIndex`]: a `HashMap` behind a reader-writer lock
//! - [`SqliteIndex`]: an externally-backed `SQLite` table
//!
//! Every backend tracks a timestamp per identity. Points older than the TTL
//! are invisible to reads and are purged by [`ProximityIndex::sweep_expired`].

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{Backend, Config};
use crate::error::{Error, Result};
use crate::location::{validate_identity, Coordinate, Neighbor, Point};

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Default staleness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default number of points removed per sweep critical section.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 512;

/// Backend-independent index settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// How long a point stays live after its last upsert.
    pub ttl: Duration,

    /// Maximum number of points removed while holding the write side of
    /// the index during a sweep.
    pub sweep_batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl IndexOptions {
    /// The TTL as a signed chrono duration for timestamp arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the TTL is zero or too large to
    /// represent.
    pub(crate) fn chrono_ttl(&self) -> Result<chrono::Duration> {
        if self.ttl.is_zero() {
            return Err(Error::ConfigValidation {
                message: "ttl must be greater than 0".to_string(),
            });
        }
        chrono::Duration::from_std(self.ttl).map_err(|_| Error::ConfigValidation {
            message: format!("ttl out of range: {:?}", self.ttl),
        })
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.sweep_batch_size.max(1)
    }
}

/// Point counts and update bounds for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Name of the backend.
    pub backend: String,
    /// All stored points, live or stale.
    pub total_points: usize,
    /// Points within the TTL.
    pub live_points: usize,
    /// Points past the TTL that have not been swept yet.
    pub stale_points: usize,
    /// Oldest stored update.
    pub oldest_update: Option<DateTime<Utc>>,
    /// Newest stored update.
    pub newest_update: Option<DateTime<Utc>>,
}

/// A concurrent store of last-known positions keyed by identity.
///
/// Implementations must be safe to share across threads. Mutations of one
/// identity never alter the timestamp of another.
pub trait ProximityIndex: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs and status output.
    fn backend_name(&self) -> &'static str;

    /// The staleness window.
    fn ttl(&self) -> Duration;

    /// Insert or overwrite the point for `identity`, stamped with the
    /// current time.
    ///
    /// This is the backend primitive behind [`ProximityIndex::upsert`];
    /// callers holding raw latitude and longitude should use that instead.
    /// Implementations must reject an empty identity themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] without writing anything, or a
    /// backend error if the write could not be applied.
    fn store(&self, identity: &str, coordinate: Coordinate) -> Result<Point>;

    /// Remove the live point for `identity`.
    ///
    /// A stale point that has not been swept yet is purged but still
    /// reported as [`Error::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no live point, or a backend
    /// error.
    fn remove(&self, identity: &str) -> Result<()>;

    /// The live point for `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read failed.
    fn locate(&self, identity: &str) -> Result<Option<Point>>;

    /// Radius search around the live point of `center`.
    ///
    /// Backends implement this without validating `radius_km`; go through
    /// [`ProximityIndex::nearby`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `center` has no live point, or a
    /// backend error.
    fn query_radius(&self, center: &str, radius_km: f64, limit: usize) -> Result<Vec<Neighbor>>;

    /// Purge every point past the TTL and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a backend error. Batches removed before the failure stay
    /// removed.
    fn sweep_expired(&self) -> Result<usize>;

    /// Current counts.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read failed.
    fn stats(&self) -> Result<IndexStats>;

    /// Validate and upsert a raw position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] or [`Error::InvalidCoordinate`]
    /// before touching stored state, or a backend error.
    fn upsert(&self, identity: &str, latitude: f64, longitude: f64) -> Result<Point> {
        validate_identity(identity)?;
        let coordinate = Coordinate::new(latitude, longitude)?;
        self.store(identity, coordinate)
    }

    /// Live points within `radius_km` of `center`, nearest first, excluding
    /// `center` itself and truncated to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] for a negative or non-finite radius,
    /// [`Error::NotFound`] if `center` has no live point, or a backend error.
    fn nearby(&self, center: &str, radius_km: f64, limit: usize) -> Result<Vec<Neighbor>> {
        validate_radius(radius_km)?;
        self.query_radius(center, radius_km, limit)
    }
}

/// Reject radii that cannot bound a search.
///
/// # Errors
///
/// Returns [`Error::InvalidRadius`] if `radius_km` is negative, NaN or
/// infinite.
pub fn validate_radius(radius_km: f64) -> Result<()> {
    if radius_km.is_finite() && radius_km >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidRadius { radius_km })
    }
}

/// Rank candidates around `center`.
///
/// Keeps candidates at `distance <= radius_km`, drops `center` itself, sorts
/// nearest first (ties by identity) and truncates to `limit`. Staleness is
/// the caller's job.
pub(crate) fn rank_neighbors<'a, I>(
    center: &Point,
    candidates: I,
    radius_km: f64,
    limit: usize,
) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a str, &'a Coordinate)>,
{
    let mut neighbors: Vec<Neighbor> = candidates
        .into_iter()
        .filter(|(identity, _)| *identity != center.identity)
        .filter_map(|(identity, coordinate)| {
            let distance_km = center.coordinate.distance_km(coordinate);
            (distance_km <= radius_km).then(|| Neighbor {
                identity: identity.to_string(),
                distance_km,
            })
        })
        .collect();

    neighbors.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.identity.cmp(&b.identity))
    });
    neighbors.truncate(limit);
    neighbors
}

/// Open the backend selected by `config`.
///
/// # Errors
///
/// Returns an error if the options are invalid or the backend cannot be
/// opened.
pub fn open_index(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn ProximityIndex>> {
    let options = config.index_options();
    let index: Arc<dyn ProximityIndex> = match config.index.backend {
        Backend::Memory => Arc::new(MemoryIndex::new(options, clock)?),
        Backend::Sqlite => Arc::new(SqliteIndex::open(config.database_path(), options, clock)?),
    };
    tracing::info!(
        "Opened {} index (ttl {}s)",
        index.backend_name(),
        options.ttl.as_secs()
    );
    Ok(index)
}

/// Behavior every backend must share, run from each backend's tests.
#[cfg(test)]
pub(crate) mod conformance {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;

    pub(crate) const SF: (f64, f64) = (37.7749, -122.4194);
    pub(crate) const OAKLAND: (f64, f64) = (37.8044, -122.2712);

    pub(crate) fn start_clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn identities(neighbors: &[Neighbor]) -> Vec<&str> {
        neighbors.iter().map(|n| n.identity.as_str()).collect()
    }

    /// San Francisco and Oakland, about 13 km apart.
    pub(crate) fn scenario_a(index: &dyn ProximityIndex) {
        index.upsert("alice", SF.0, SF.1).unwrap();
        index.upsert("bob", OAKLAND.0, OAKLAND.1).unwrap();

        let near = index.nearby("alice", 20.0, 100).unwrap();
        assert_eq!(identities(&near), vec!["bob"]);
        assert!(
            near[0].distance_km > 12.5 && near[0].distance_km < 13.8,
            "distance was {}",
            near[0].distance_km
        );

        assert!(index.nearby("alice", 5.0, 100).unwrap().is_empty());
    }

    /// An invalid latitude is rejected and nothing is written.
    pub(crate) fn scenario_b(index: &dyn ProximityIndex) {
        let err = index.upsert("alice", 91.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinate { .. }));
        assert!(index.locate("alice").unwrap().is_none());
        assert_eq!(index.stats().unwrap().total_points, 0);

        index.upsert("alice", 10.0, 10.0).unwrap();
        assert!(index.upsert("alice", 0.0, 181.0).is_err());
        let kept = index.locate("alice").unwrap().unwrap();
        assert!((kept.coordinate.latitude() - 10.0).abs() < 1e-9);
    }

    /// Deleting an identity that was never stored is `NotFound`.
    pub(crate) fn scenario_c(index: &dyn ProximityIndex) {
        let err = index.remove("carol").unwrap_err();
        assert!(err.is_not_found());

        index.upsert("carol", 1.0, 1.0).unwrap();
        index.remove("carol").unwrap();
        assert!(index.locate("carol").unwrap().is_none());
        assert!(index.remove("carol").unwrap_err().is_not_found());
    }

    /// A point not refreshed within the TTL disappears from queries.
    pub(crate) fn scenario_d(index: &dyn ProximityIndex, clock: &ManualClock) {
        index.upsert("dave", SF.0, SF.1).unwrap();
        clock.advance(chrono::Duration::minutes(61));
        index.upsert("erin", OAKLAND.0, OAKLAND.1).unwrap();

        let near = index.nearby("erin", 20_000.0, 100).unwrap();
        assert!(near.is_empty());
        assert!(index.locate("dave").unwrap().is_none());
        assert!(index.nearby("dave", 100.0, 100).unwrap_err().is_not_found());
    }

    /// Repeated upserts keep exactly one point with the latest position.
    pub(crate) fn uniqueness(index: &dyn ProximityIndex, clock: &ManualClock) {
        index.upsert("center", 0.0, 0.0).unwrap();
        index.upsert("mover", 0.0, 0.1).unwrap();
        clock.advance(chrono::Duration::seconds(5));
        index.upsert("mover", 0.0, 0.2).unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let last = index.upsert("mover", 0.0, 0.3).unwrap();

        let near = index.nearby("center", 1000.0, 100).unwrap();
        assert_eq!(identities(&near), vec!["mover"]);

        let located = index.locate("mover").unwrap().unwrap();
        assert!((located.coordinate.longitude() - 0.3).abs() < 1e-9);
        assert_eq!(located.updated_at, last.updated_at);
        assert_eq!(index.stats().unwrap().total_points, 2);
    }

    /// Refreshing one identity leaves another's expiry untouched.
    pub(crate) fn ttl_isolation(index: &dyn ProximityIndex, clock: &ManualClock) {
        index.upsert("a", 0.0, 0.0).unwrap();
        index.upsert("b", 0.0, 0.01).unwrap();

        clock.advance(chrono::Duration::minutes(50));
        index.upsert("a", 0.0, 0.0).unwrap();
        clock.advance(chrono::Duration::minutes(20));

        // b is 70 minutes old, a is 20.
        assert!(index.locate("b").unwrap().is_none());
        assert!(index.locate("a").unwrap().is_some());
        assert!(index.nearby("a", 100.0, 10).unwrap().is_empty());
    }

    /// Distances are symmetric, so two points see each other.
    pub(crate) fn symmetry(index: &dyn ProximityIndex) {
        index.upsert("a", 48.8566, 2.3522).unwrap();
        index.upsert("b", 48.8606, 2.3376).unwrap();

        let from_a = index.nearby("a", 5.0, 10).unwrap();
        let from_b = index.nearby("b", 5.0, 10).unwrap();
        assert_eq!(identities(&from_a), vec!["b"]);
        assert_eq!(identities(&from_b), vec!["a"]);
        assert!((from_a[0].distance_km - from_b[0].distance_km).abs() < 1e-9);
    }

    /// Results exclude the center and come back nearest first.
    pub(crate) fn ordering_and_self_exclusion(index: &dyn ProximityIndex) {
        index.upsert("x", 0.0, 0.0).unwrap();
        index.upsert("far", 0.0, 0.3).unwrap();
        index.upsert("near", 0.0, 0.1).unwrap();
        index.upsert("mid", 0.2, 0.0).unwrap();

        let near = index.nearby("x", 1000.0, 100).unwrap();
        assert_eq!(identities(&near), vec!["near", "mid", "far"]);
        assert!(near.iter().all(|n| n.identity != "x"));
        assert!(near
            .windows(2)
            .all(|pair| pair[0].distance_km <= pair[1].distance_km));
    }

    /// A point exactly at the radius is included; just beyond is not.
    pub(crate) fn inclusive_boundary(index: &dyn ProximityIndex) {
        index.upsert("x", 0.0, 0.0).unwrap();
        index.upsert("edge", 1.0, 0.0).unwrap();

        let exact = crate::geo::haversine_km((0.0, 0.0), (1.0, 0.0));
        let hit = index.nearby("x", exact, 10).unwrap();
        assert_eq!(identities(&hit), vec!["edge"]);
        assert!((hit[0].distance_km - exact).abs() < f64::EPSILON);

        let miss = index.nearby("x", exact - 1e-6, 10).unwrap();
        assert!(miss.is_empty());
    }

    /// `limit` truncates after sorting; zero yields nothing.
    pub(crate) fn limit_truncates(index: &dyn ProximityIndex) {
        index.upsert("x", 0.0, 0.0).unwrap();
        for i in 1..=5 {
            index
                .upsert(&format!("p{i}"), 0.0, f64::from(i) * 0.01)
                .unwrap();
        }

        let near = index.nearby("x", 1000.0, 3).unwrap();
        assert_eq!(identities(&near), vec!["p1", "p2", "p3"]);
        assert_eq!(index.nearby("x", 1000.0, 100).unwrap().len(), 5);
        assert!(index.nearby("x", 1000.0, 0).unwrap().is_empty());
    }

    /// Bad radii and unknown centers are errors, not empty results.
    pub(crate) fn nearby_errors(index: &dyn ProximityIndex) {
        assert!(index.nearby("ghost", 10.0, 10).unwrap_err().is_not_found());

        index.upsert("x", 0.0, 0.0).unwrap();
        assert!(matches!(
            index.nearby("x", -1.0, 10),
            Err(Error::InvalidRadius { .. })
        ));
        assert!(index.nearby("x", f64::NAN, 10).is_err());
        assert!(index.nearby("x", f64::INFINITY, 10).is_err());
        assert!(index.nearby("x", 0.0, 10).unwrap().is_empty());
    }

    /// Removing a stale point purges it and reports `NotFound`.
    pub(crate) fn remove_stale(index: &dyn ProximityIndex, clock: &ManualClock) {
        index.upsert("old", 0.0, 0.0).unwrap();
        clock.advance(chrono::Duration::hours(2));

        assert_eq!(index.stats().unwrap().stale_points, 1);
        assert!(index.remove("old").unwrap_err().is_not_found());
        assert_eq!(index.stats().unwrap().total_points, 0);
    }

    /// Sweeping drops exactly the stale points.
    pub(crate) fn sweep(index: &dyn ProximityIndex, clock: &ManualClock) {
        for i in 0..7 {
            index.upsert(&format!("old{i}"), 0.0, 0.0).unwrap();
        }
        clock.advance(chrono::Duration::minutes(30));
        index.upsert("fresh", 1.0, 1.0).unwrap();
        clock.advance(chrono::Duration::minutes(31));

        let before = index.stats().unwrap();
        assert_eq!(before.total_points, 8);
        assert_eq!(before.live_points, 1);
        assert_eq!(before.stale_points, 7);

        assert_eq!(index.sweep_expired().unwrap(), 7);
        assert_eq!(index.sweep_expired().unwrap(), 0);

        let after = index.stats().unwrap();
        assert_eq!(after.total_points, 1);
        assert_eq!(after.stale_points, 0);
        assert!(index.locate("fresh").unwrap().is_some());
    }

    /// Stats report counts and update bounds.
    pub(crate) fn stats(index: &dyn ProximityIndex, clock: &ManualClock) {
        let empty = index.stats().unwrap();
        assert_eq!(empty.total_points, 0);
        assert!(empty.oldest_update.is_none());
        assert!(empty.newest_update.is_none());

        let first = index.upsert("a", 0.0, 0.0).unwrap();
        clock.advance(chrono::Duration::seconds(10));
        let second = index.upsert("b", 0.0, 0.0).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.backend, index.backend_name());
        assert_eq!(stats.total_points, 2);
        assert_eq!(stats.live_points, 2);
        assert_eq!(stats.oldest_update, Some(first.updated_at));
        assert_eq!(stats.newest_update, Some(second.updated_at));
    }

    /// Empty identities never reach the backend.
    pub(crate) fn rejects_empty_identity(index: &dyn ProximityIndex) {
        assert!(matches!(
            index.upsert("", 0.0, 0.0),
            Err(Error::InvalidIdentity)
        ));
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        assert!(matches!(
            index.store("", origin),
            Err(Error::InvalidIdentity)
        ));
        assert_eq!(index.stats().unwrap().total_points, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(identity: &str, lat: f64, lon: f64) -> Point {
        Point::new(
            identity.to_string(),
            Coordinate::new(lat, lon).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_validate_radius() {
        assert!(validate_radius(0.0).is_ok());
        assert!(validate_radius(50.0).is_ok());
        assert!(validate_radius(-0.1).is_err());
        assert!(validate_radius(f64::NAN).is_err());
        assert!(validate_radius(f64::INFINITY).is_err());
    }

    #[test]
    fn test_rank_neighbors_ties_break_by_identity() {
        let center = point("c", 0.0, 0.0);
        let east = Coordinate::new(0.0, 0.1).unwrap();
        let west = Coordinate::new(0.0, -0.1).unwrap();
        let candidates = vec![("zed", &east), ("abe", &west)];

        let ranked = rank_neighbors(&center, candidates, 100.0, 10);
        assert_eq!(ranked[0].identity, "abe");
        assert_eq!(ranked[1].identity, "zed");
    }

    #[test]
    fn test_rank_neighbors_excludes_center() {
        let center = point("c", 0.0, 0.0);
        let same = center.coordinate;
        let ranked = rank_neighbors(&center, vec![("c", &same)], 1.0, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_rank_neighbors_zero_radius_includes_colocated() {
        let center = point("c", 0.0, 0.0);
        let same = center.coordinate;
        let ranked = rank_neighbors(&center, vec![("twin", &same)], 0.0, 10);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn test_index_options_default() {
        let options = IndexOptions::default();
        assert_eq!(options.ttl, Duration::from_secs(3600));
        assert_eq!(options.sweep_batch_size, 512);
        assert_eq!(options.chrono_ttl().unwrap(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_index_options_zero_ttl_rejected() {
        let options = IndexOptions {
            ttl: Duration::ZERO,
            ..IndexOptions::default()
        };
        assert!(options.chrono_ttl().is_err());
    }

    #[test]
    fn test_index_options_batch_size_floor() {
        let options = IndexOptions {
            sweep_batch_size: 0,
            ..IndexOptions::default()
        };
        assert_eq!(options.batch_size(), 1);
    }

    #[test]
    fn test_open_index_memory() {
        let mut config = Config::default();
        config.index.backend = Backend::Memory;
        let index = open_index(&config, Arc::new(crate::clock::SystemClock)).unwrap();
        assert_eq!(index.backend_name(), "memory");
        assert_eq!(index.ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_default_config_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("geoprox_open_index_{}", std::process::id()));
        let mut config = Config::default();
        config.storage.database_path = Some(dir.join("points.db"));

        let first = open_index(&config, Arc::new(crate::clock::SystemClock)).unwrap();
        assert_eq!(first.backend_name(), "sqlite");
        first.upsert("alice", 37.7749, -122.4194).unwrap();
        first.upsert("bob", 37.8044, -122.2712).unwrap();
        drop(first);

        let second = open_index(&config, Arc::new(crate::clock::SystemClock)).unwrap();
        assert!(second.locate("alice").unwrap().is_some());
        let near = second.nearby("alice", 20.0, 10).unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].identity, "bob");

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! In-memory proximity index.
//!
//! A single `RwLock<HashMap>` guards every point. Writers replace whole
//! [`Point`] values, so a reader can never observe a latitude from one
//! upsert paired with a longitude from another.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::location::{validate_identity, Coordinate, Neighbor, Point};

use super::{rank_neighbors, IndexOptions, IndexStats, ProximityIndex};

/// Proximity index held entirely in process memory.
///
/// Radius queries scan every point, which is fine for the tens of
/// thousands of identities this index is sized for.
#[derive(Debug)]
pub struct MemoryIndex {
    points: RwLock<HashMap<String, Point>>,
    clock: Arc<dyn Clock>,
    options: IndexOptions,
    ttl: chrono::Duration,
}

impl MemoryIndex {
    /// Create an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the TTL is zero or out of range.
    pub fn new(options: IndexOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let ttl = options.chrono_ttl()?;
        Ok(Self {
            points: RwLock::new(HashMap::new()),
            clock,
            options,
            ttl,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Point>>> {
        self.points
            .read()
            .map_err(|_| Error::backend("memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Point>>> {
        self.points
            .write()
            .map_err(|_| Error::backend("memory index lock poisoned"))
    }
}

impl ProximityIndex for MemoryIndex {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn ttl(&self) -> Duration {
        self.options.ttl
    }

    fn store(&self, identity: &str, coordinate: Coordinate) -> Result<Point> {
        validate_identity(identity)?;
        let point = Point::new(identity.to_string(), coordinate, self.clock.now());
        self.write()?.insert(identity.to_string(), point.clone());
        debug!("Stored {} at {}", identity, coordinate);
        Ok(point)
    }

    fn remove(&self, identity: &str) -> Result<()> {
        let now = self.clock.now();
        let removed = self.write()?.remove(identity);
        match removed {
            Some(point) if !point.is_stale(now, self.ttl) => {
                debug!("Removed {}", identity);
                Ok(())
            }
            Some(_) => {
                debug!("Purged stale point for {}", identity);
                Err(Error::not_found(identity))
            }
            None => Err(Error::not_found(identity)),
        }
    }

    fn locate(&self, identity: &str) -> Result<Option<Point>> {
        let now = self.clock.now();
        let points = self.read()?;
        Ok(points
            .get(identity)
            .filter(|point| !point.is_stale(now, self.ttl))
            .cloned())
    }

    fn query_radius(&self, center: &str, radius_km: f64, limit: usize) -> Result<Vec<Neighbor>> {
        let now = self.clock.now();
        let points = self.read()?;

        let center_point = points
            .get(center)
            .filter(|point| !point.is_stale(now, self.ttl))
            .ok_or_else(|| Error::not_found(center))?;

        let live = points
            .values()
            .filter(|point| !point.is_stale(now, self.ttl))
            .map(|point| (point.identity.as_str(), &point.coordinate));
        let neighbors = rank_neighbors(center_point, live, radius_km, limit);

        trace!(
            "Radius query around {} ({} km) matched {}",
            center,
            radius_km,
            neighbors.len()
        );
        Ok(neighbors)
    }

    fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();

        let candidates: Vec<String> = self
            .read()?
            .values()
            .filter(|point| point.is_stale(now, self.ttl))
            .map(|point| point.identity.clone())
            .collect();

        let mut removed = 0;
        for batch in candidates.chunks(self.options.batch_size()) {
            let mut points = self.write()?;
            for identity in batch {
                // Re-check: the point may have been refreshed since the scan.
                if points
                    .get(identity)
                    .is_some_and(|point| point.is_stale(now, self.ttl))
                {
                    points.remove(identity);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("Swept {} expired points", removed);
        }
        Ok(removed)
    }

    fn stats(&self) -> Result<IndexStats> {
        let now = self.clock.now();
        let points = self.read()?;

        let live_points = points
            .values()
            .filter(|point| !point.is_stale(now, self.ttl))
            .count();

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            total_points: points.len(),
            live_points,
            stale_points: points.len() - live_points,
            oldest_update: points.values().map(|point| point.updated_at).min(),
            newest_update: points.values().map(|point| point.updated_at).max(),
        })
    }
}

//! The location service boundary.
//!
//! [`LocationService`] is what a transport shell talks to. It resolves
//! optional query parameters against configured defaults and forwards to a
//! shared [`ProximityIndex`]; it holds no state of its own beyond that.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::{IndexStats, ProximityIndex};
use crate::location::{Neighbor, Point};

/// Parameters of a nearby query. Omitted fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    /// Identity whose live point is the search center.
    pub center: String,

    /// Search radius in kilometers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,

    /// Maximum number of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl NearbyQuery {
    /// A query around `center` using the default radius and limit.
    #[must_use]
    pub fn around(center: impl Into<String>) -> Self {
        Self {
            center: center.into(),
            radius_km: None,
            limit: None,
        }
    }

    /// Set the radius.
    #[must_use]
    pub fn radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    /// Set the limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Defaults applied by [`LocationService`] to incomplete queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryDefaults {
    /// Radius when the query omits one.
    pub radius_km: f64,
    /// Limit when the query omits one.
    pub limit: usize,
    /// Upper bound applied to any requested limit.
    pub max_limit: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for QueryDefaults {
    fn from(config: &IndexConfig) -> Self {
        Self {
            radius_km: config.default_radius_km,
            limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }
}

/// The `update` / `nearby` / `remove` boundary over a shared index.
///
/// Cloning is cheap; every clone talks to the same index.
#[derive(Debug, Clone)]
pub struct LocationService {
    index: Arc<dyn ProximityIndex>,
    defaults: QueryDefaults,
}

impl LocationService {
    /// Wrap an index.
    #[must_use]
    pub fn new(index: Arc<dyn ProximityIndex>, defaults: QueryDefaults) -> Self {
        Self { index, defaults }
    }

    /// The underlying index.
    #[must_use]
    pub fn index(&self) -> &Arc<dyn ProximityIndex> {
        &self.index
    }

    /// The defaults applied to queries.
    #[must_use]
    pub fn defaults(&self) -> QueryDefaults {
        self.defaults
    }

    /// Record the current position of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidCoordinate`] or
    /// [`crate::Error::InvalidIdentity`] without writing anything, or a
    /// backend error.
    pub fn update(&self, identity: &str, latitude: f64, longitude: f64) -> Result<Point> {
        self.index.upsert(identity, latitude, longitude)
    }

    /// Identities near the query center, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the center has no live point,
    /// [`crate::Error::InvalidRadius`] for a bad radius, or a backend error.
    pub fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Neighbor>> {
        let radius_km = query.radius_km.unwrap_or(self.defaults.radius_km);
        let limit = query
            .limit
            .unwrap_or(self.defaults.limit)
            .min(self.defaults.max_limit);

        debug!(
            "Nearby query around {} within {} km (limit {})",
            query.center, radius_km, limit
        );
        self.index.nearby(&query.center, radius_km, limit)
    }

    /// Forget the position of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if there is no live point, or a
    /// backend error.
    pub fn remove(&self, identity: &str) -> Result<()> {
        self.index.remove(identity)
    }

    /// The live point for `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn locate(&self, identity: &str) -> Result<Option<Point>> {
        self.index.locate(identity)
    }

    /// Purge expired points now.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn sweep(&self) -> Result<usize> {
        self.index.sweep_expired()
    }

    /// Index counts for health reporting.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn stats(&self) -> Result<IndexStats> {
        self.index.stats()
    }
}

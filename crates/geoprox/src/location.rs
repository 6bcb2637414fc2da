//! Core location types for geoprox.
//!
//! This module defines the value types that flow through the index: a
//! validated [`Coordinate`], the stored [`Point`] for an identity, and the
//! [`Neighbor`] entries returned by radius queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Valid latitude range in degrees.
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Valid longitude range in degrees.
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A validated geographic coordinate in degrees.
///
/// Constructing one through [`Coordinate::new`] guarantees both components
/// are finite and inside their geographic range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

/// Unvalidated wire form of [`Coordinate`].
#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] if the latitude is outside
    /// `[-90, 90]` or the longitude is outside `[-180, 180]`. NaN fails both.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if LATITUDE_RANGE.contains(&latitude) && LONGITUDE_RANGE.contains(&longitude) {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another coordinate in kilometers.
    #[must_use]
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        crate::geo::haversine_km(
            (self.latitude, self.longitude),
            (other.latitude, other.longitude),
        )
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// The last-known position of an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Opaque identity key.
    pub identity: String,

    /// Where the identity was last seen.
    pub coordinate: Coordinate,

    /// When the position was last upserted.
    pub updated_at: DateTime<Utc>,
}

impl Point {
    /// Create a point stamped at `updated_at`.
    #[must_use]
    pub fn new(identity: String, coordinate: Coordinate, updated_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            coordinate,
            updated_at,
        }
    }

    /// Whether this point has outlived `ttl` as of `now`.
    ///
    /// A point is stale once `now - updated_at` is strictly greater than the
    /// TTL; a point exactly `ttl` old is still live.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > ttl
    }

    /// Age of the point as of `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.updated_at)
    }
}

/// An entry in a radius query result.
///
/// Serialized as `{"userId": ..., "distance": ...}`, the shape location
/// clients already consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Identity of the nearby point.
    #[serde(rename = "userId")]
    pub identity: String,

    /// Great-circle distance from the query center in kilometers.
    #[serde(rename = "distance")]
    pub distance_km: f64,
}

/// Reject empty identities before they reach a backend.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentity`] if `identity` is empty.
pub fn validate_identity(identity: &str) -> Result<()> {
    if identity.is_empty() {
        return Err(Error::InvalidIdentity);
    }
    Ok(())
}

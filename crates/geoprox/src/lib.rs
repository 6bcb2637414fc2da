//! `geoprox` - A proximity index over the last-known positions of identities
//!
//! This library keeps one position per identity, expires positions that have
//! not been refreshed within a TTL, and answers "who is within R kilometers of
//! X" using great-circle distance.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod index;
pub mod location;
pub mod logging;
pub mod service;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use index::{open_index, IndexOptions, IndexStats, MemoryIndex, ProximityIndex, SqliteIndex};
pub use location::{Coordinate, Neighbor, Point};
pub use logging::init_logging;
pub use service::{LocationService, NearbyQuery, QueryDefaults};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};

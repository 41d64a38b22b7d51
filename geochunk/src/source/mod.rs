//! Raw elevation source: SRTM `.hgt` cells.
//!
//! The pyramid only sees a [`ChunkGenerator`](crate::ChunkGenerator). This
//! module supplies one backed by a directory of SRTM cells, with its own
//! bounded cache of memory-mapped files.

pub mod cache;
pub mod generator;
pub mod hgt;

pub use cache::{CacheStats, HgtSourceCache, DEFAULT_SOURCE_CACHE_SIZE};
pub use generator::HgtElevationGenerator;
pub use hgt::{HgtResolution, HgtTile, VOID_VALUE};

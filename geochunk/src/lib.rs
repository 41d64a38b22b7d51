//! # geochunk - Multi-resolution geographic raster chunks
//!
//! Serves raster data (elevation, imagery) as square chunks on a quadtree
//! pyramid of zoom levels, generating missing chunks on demand and
//! persisting every result.
//!
//! ## Features
//!
//! - **Exact**: Coordinates are fixed-point [`Angle`]s, so chunk edges and
//!   bucket arithmetic never drift
//! - **Compact keys**: Every chunk maps to a unique non-negative `i64`
//! - **Generate or fetch**: Source-zoom chunks come from a
//!   [`ChunkGenerator`], coarser zooms are averaged from their children and
//!   finer zooms are upsampled from their parent
//! - **Single flight**: Concurrent requests for one chunk share one build
//!
//! ## Quick Start
//!
//! ```no_run
//! use geochunk::{PyramidSettings, Result};
//!
//! # async fn run() -> Result<()> {
//! let pyramid = PyramidSettings::from_env()?.build_elevation_pyramid()?;
//!
//! // Mount Fuji at zoom 8 (1/4 degree chunks)
//! let chunk = pyramid.chunk_at(35.3606, 138.7274, 8)?;
//! let grid = pyramid.get(&chunk).await?;
//! println!("{} has {} samples", chunk, grid.samples().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Layouts
//!
//! Layout v1 has 64° chunks of 256×256 pixels at zoom 0, halving in size
//! per zoom down to zoom 15. Layout v2 starts at 32° with 128×128 pixels.
//! Records of different layouts live in different blob containers.

pub mod angle;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod filename;
pub mod generator;
pub mod geometry;
pub mod grid;
pub mod key;
pub mod layout;
pub mod pyramid;
pub mod sample;
pub mod source;
pub mod store;

// Re-export main types at crate root for convenience
pub use angle::Angle;
pub use coalesce::{CoalescerStats, InFlightRegistry};
pub use config::PyramidSettings;
pub use error::{ChunkError, NotFoundReason, Result, Stage};
pub use generator::{ChunkGenerator, FnGenerator, GenerateError};
pub use geometry::ChunkGeometry;
pub use grid::{decode_grid, encode_grid, ChunkGrid, RecordError};
pub use key::ChunkKey;
pub use layout::{LayoutVersion, PyramidLayout, Region, MAX_ZOOM};
pub use pyramid::{ChunkPyramid, ChunkPyramidBuilder, PyramidStats};
pub use sample::{Height, Rgb, Sample};
pub use source::{HgtElevationGenerator, HgtSourceCache, HgtTile};
pub use store::{BlobStore, BoxFuture, DiskBlobStore, MemoryBlobStore};

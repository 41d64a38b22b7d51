//! Settings for an elevation pyramid backed by disk and `.hgt` cells.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ChunkError, Result};
use crate::layout::{LayoutVersion, PyramidLayout};
use crate::pyramid::{ChunkPyramid, DEFAULT_SOURCE_ZOOM};
use crate::sample::Height;
use crate::source::{HgtElevationGenerator, HgtSourceCache, DEFAULT_SOURCE_CACHE_SIZE};
use crate::store::DiskBlobStore;

pub const ENV_STORE_DIR: &str = "GEOCHUNK_STORE_DIR";
pub const ENV_HGT_DIR: &str = "GEOCHUNK_HGT_DIR";
pub const ENV_SOURCE_ZOOM: &str = "GEOCHUNK_SOURCE_ZOOM";
pub const ENV_LAYOUT: &str = "GEOCHUNK_LAYOUT";
pub const ENV_SOURCE_CACHE_SIZE: &str = "GEOCHUNK_SOURCE_CACHE_SIZE";

/// Where an elevation pyramid keeps its records and finds its source cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidSettings {
    /// Root of the [`DiskBlobStore`].
    pub store_dir: PathBuf,
    /// Directory of `.hgt` / `.hgt.zip` cells. Defaults to `{store_dir}/hgt`.
    pub hgt_dir: Option<PathBuf>,
    pub source_zoom: u8,
    pub layout: LayoutVersion,
    /// Maximum number of mapped `.hgt` cells.
    pub source_cache_size: u64,
}

impl PyramidSettings {
    /// Settings with defaults for everything but the store directory.
    pub fn new<P: AsRef<Path>>(store_dir: P) -> Self {
        Self {
            store_dir: store_dir.as_ref().to_path_buf(),
            hgt_dir: None,
            source_zoom: DEFAULT_SOURCE_ZOOM,
            layout: LayoutVersion::V1,
            source_cache_size: DEFAULT_SOURCE_CACHE_SIZE,
        }
    }

    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GEOCHUNK_STORE_DIR` | Root directory of persisted chunks | Required |
    /// | `GEOCHUNK_HGT_DIR` | Directory containing .hgt files | None |
    /// | `GEOCHUNK_SOURCE_ZOOM` | Zoom of generated chunks | 6 |
    /// | `GEOCHUNK_LAYOUT` | Layout version (1 or 2) | 1 |
    /// | `GEOCHUNK_SOURCE_CACHE_SIZE` | Maximum .hgt cells in cache | 32 |
    ///
    /// Unparseable numbers fall back to the default.
    ///
    /// # Errors
    ///
    /// Returns an error if `GEOCHUNK_STORE_DIR` is not set, or if
    /// `GEOCHUNK_LAYOUT` names an unknown layout.
    pub fn from_env() -> Result<Self> {
        let store_dir = std::env::var(ENV_STORE_DIR).map_err(|_| {
            ChunkError::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} environment variable not set", ENV_STORE_DIR),
            ))
        })?;

        let mut settings = Self::new(store_dir);
        settings.hgt_dir = std::env::var(ENV_HGT_DIR).ok().map(PathBuf::from);

        if let Some(zoom) = parsed_var(ENV_SOURCE_ZOOM) {
            settings.source_zoom = zoom;
        }
        if let Some(size) = parsed_var(ENV_SOURCE_CACHE_SIZE) {
            settings.source_cache_size = size;
        }
        if let Some(number) = parsed_var::<u32>(ENV_LAYOUT) {
            settings.layout = LayoutVersion::from_number(number).ok_or_else(|| {
                ChunkError::InvalidLayout(format!("unknown layout version {}", number))
            })?;
        }

        Ok(settings)
    }

    pub fn pyramid_layout(&self) -> Arc<PyramidLayout> {
        PyramidLayout::standard(self.layout)
    }

    /// Build an elevation pyramid over a [`DiskBlobStore`] and the `.hgt`
    /// cells in `hgt_dir`, or in `{store_dir}/hgt` when it is unset.
    ///
    /// Generating a chunk whose cells are missing from that directory fails
    /// with [`ChunkError::UpstreamGeneration`]; persisted chunks are still
    /// served.
    pub fn build_elevation_pyramid(&self) -> Result<ChunkPyramid<Height>> {
        let hgt_dir = self
            .hgt_dir
            .clone()
            .unwrap_or_else(|| self.store_dir.join("hgt"));
        let cells = Arc::new(HgtSourceCache::new(hgt_dir, self.source_cache_size));

        ChunkPyramid::builder(
            self.pyramid_layout(),
            DiskBlobStore::new(&self.store_dir),
            HgtElevationGenerator::new(cells),
        )
        .source_zoom(self.source_zoom)
        .build()
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

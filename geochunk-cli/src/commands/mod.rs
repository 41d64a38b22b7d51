use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use geochunk::source::DEFAULT_SOURCE_CACHE_SIZE;
use geochunk::{
    ChunkPyramid, Height, HgtElevationGenerator, HgtSourceCache, LayoutVersion,
    MemoryBlobStore, PyramidLayout, PyramidSettings,
};

pub mod decode;
pub mod key;
pub mod list;
pub mod resolve;
pub mod warm;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct PyramidArgs {
    /// Root directory of persisted chunks
    #[arg(short, long, env = "GEOCHUNK_STORE_DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    /// Directory containing .hgt files
    #[arg(long, env = "GEOCHUNK_HGT_DIR", global = true)]
    pub hgt_dir: Option<PathBuf>,

    /// Pyramid layout version (1 or 2)
    #[arg(short, long, env = "GEOCHUNK_LAYOUT", default_value = "1", global = true)]
    pub layout: u32,

    /// Zoom level generated from .hgt files
    #[arg(long, env = "GEOCHUNK_SOURCE_ZOOM", default_value = "6", global = true)]
    pub source_zoom: u8,

    /// Maximum .hgt cells kept in memory
    #[arg(
        short,
        long,
        env = "GEOCHUNK_SOURCE_CACHE_SIZE",
        default_value_t = DEFAULT_SOURCE_CACHE_SIZE,
        global = true
    )]
    pub cache_size: u64,

    /// Keep chunks in memory instead of the store directory
    #[arg(long, global = true)]
    pub memory: bool,
}

impl PyramidArgs {
    pub fn layout_version(&self) -> Result<LayoutVersion> {
        LayoutVersion::from_number(self.layout)
            .with_context(|| format!("Unknown layout version {} (expected 1 or 2)", self.layout))
    }

    pub fn pyramid_layout(&self) -> Result<Arc<PyramidLayout>> {
        Ok(PyramidLayout::standard(self.layout_version()?))
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        self.store_dir.clone().context(
            "GEOCHUNK_STORE_DIR environment variable not set. Use --store-dir or set GEOCHUNK_STORE_DIR",
        )
    }

    pub fn settings(&self) -> Result<PyramidSettings> {
        let mut settings = PyramidSettings::new(self.store_dir()?);
        settings.hgt_dir = self.hgt_dir.clone();
        settings.layout = self.layout_version()?;
        settings.source_zoom = self.source_zoom;
        settings.source_cache_size = self.cache_size;
        Ok(settings)
    }

    /// Open the elevation pyramid these options describe.
    pub fn open_pyramid(&self) -> Result<ChunkPyramid<Height>> {
        if !self.memory {
            return self
                .settings()?
                .build_elevation_pyramid()
                .context("Failed to create pyramid");
        }

        let hgt_dir = self.hgt_dir.clone().context(
            "--memory needs source data. Use --hgt-dir or set GEOCHUNK_HGT_DIR",
        )?;
        let cells = Arc::new(HgtSourceCache::new(hgt_dir, self.cache_size));
        ChunkPyramid::builder(
            self.pyramid_layout()?,
            MemoryBlobStore::new(),
            HgtElevationGenerator::new(cells),
        )
        .source_zoom(self.source_zoom)
        .build()
        .context("Failed to create pyramid")
    }
}

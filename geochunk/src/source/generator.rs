//! Elevation chunks generated from SRTM cells.

use std::sync::Arc;

use tracing::debug;

use crate::error::ChunkError;
use crate::generator::{ChunkGenerator, GenerateError};
use crate::grid::ChunkGrid;
use crate::key::ChunkKey;
use crate::sample::Height;
use crate::source::cache::HgtSourceCache;
use crate::source::hgt::HgtTile;
use crate::store::BoxFuture;

/// Generates [`Height`] chunks by bilinear sampling of `.hgt` cells.
///
/// Each pixel takes the elevation at its centre. Pixels outside the layout's
/// region, or whose neighbourhood holds void samples, become
/// [`Height::VOID`]. A missing cell fails the whole chunk.
///
/// Sampling runs on tokio's blocking pool since it touches memory-mapped
/// files.
#[derive(Clone)]
pub struct HgtElevationGenerator {
    cells: Arc<HgtSourceCache>,
}

impl HgtElevationGenerator {
    pub fn new(cells: Arc<HgtSourceCache>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &Arc<HgtSourceCache> {
        &self.cells
    }
}

impl ChunkGenerator<Height> for HgtElevationGenerator {
    fn generate<'a>(
        &'a self,
        chunk: &'a ChunkKey,
    ) -> BoxFuture<'a, Result<ChunkGrid<Height>, GenerateError>> {
        let cells = Arc::clone(&self.cells);
        let chunk = chunk.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || sample_chunk(&cells, &chunk))
                .await
                .map_err(|e| GenerateError::new(format!("sampling task failed: {}", e)))?
        })
    }
}

fn sample_chunk(
    cells: &HgtSourceCache,
    chunk: &ChunkKey,
) -> Result<ChunkGrid<Height>, GenerateError> {
    let geometry = chunk.geometry();
    let region = *chunk.layout().region();
    let mut grid = ChunkGrid::new(geometry.clone());

    // Rows of a chunk rarely cross more than a couple of cells
    let mut current: Option<Arc<HgtTile>> = None;

    for i in 0..geometry.lat_steps() as usize {
        let lat = geometry.pixel_lat(i);
        for j in 0..geometry.lon_steps() as usize {
            let lon = geometry.pixel_lon(j);
            if !region.contains(lat, lon) {
                grid.set(i, j, Height::VOID);
                continue;
            }

            let (lat_deg, lon_deg) = (lat.degrees(), lon.degrees());
            let cell_key = (lat_deg.floor() as i32, lon_deg.floor() as i32);
            let tile = match &current {
                Some(tile) if (tile.base_lat(), tile.base_lon()) == cell_key => Arc::clone(tile),
                _ => {
                    let tile = cells.cell(cell_key.0, cell_key.1).map_err(cell_error)?;
                    current = Some(Arc::clone(&tile));
                    tile
                }
            };

            let height = tile
                .elevation_interpolated(lat_deg, lon_deg)?
                .map_or(Height::VOID, |v| Height(v as f32));
            grid.set(i, j, height);
        }
    }

    debug!(chunk = %chunk, "Sampled chunk from source cells");
    Ok(grid)
}

fn cell_error(err: ChunkError) -> GenerateError {
    match err {
        ChunkError::SourceFileNotFound { path } => {
            GenerateError::new(format!("missing source cell {}", path.display()))
        }
        other => other.into(),
    }
}

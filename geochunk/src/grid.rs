//! Chunk sample buffers, aggregation, and the persisted record format.
//!
//! Record layout (little-endian):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | `i32` lat steps |
//! | 4 | 4 | `i32` lon steps |
//! | 8 | `lat·lon·ENCODED_LEN` | samples in storage order |
//!
//! Storage order is lat-major with the longitude axis mirrored, see
//! [`ChunkGeometry::storage_index`].

use thiserror::Error;
use tracing::debug;

use crate::angle::Angle;
use crate::geometry::ChunkGeometry;
use crate::sample::Sample;

/// Size of the record header.
pub const HEADER_LEN: usize = 8;

/// Ways a persisted record can fail to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    TooShort { len: usize },

    #[error("record header is {lat_steps}x{lon_steps}, expected {expected_lat}x{expected_lon}")]
    DimensionMismatch {
        lat_steps: i32,
        lon_steps: i32,
        expected_lat: u32,
        expected_lon: u32,
    },

    #[error("record holds {actual} sample bytes, expected {expected}")]
    LengthMismatch { actual: usize, expected: usize },
}

/// The samples of one chunk together with its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkGrid<T> {
    geometry: ChunkGeometry,
    samples: Vec<T>,
}

impl<T: Sample> ChunkGrid<T> {
    /// A grid filled with `T::default()`.
    pub fn new(geometry: ChunkGeometry) -> Self {
        let samples = vec![T::default(); geometry.pixel_count()];
        Self { geometry, samples }
    }

    /// A grid whose pixels are produced by `f(lat, lon)` at each pixel centre.
    pub fn from_fn(geometry: ChunkGeometry, mut f: impl FnMut(Angle, Angle) -> T) -> Self {
        let mut grid = Self::new(geometry);
        for i in 0..grid.geometry.lat_steps() as usize {
            let lat = grid.geometry.pixel_lat(i);
            for j in 0..grid.geometry.lon_steps() as usize {
                let lon = grid.geometry.pixel_lon(j);
                grid.set(i, j, f(lat, lon));
            }
        }
        grid
    }

    /// Wrap samples already in storage order.
    ///
    /// Returns `None` if the sample count does not match the geometry.
    pub fn from_samples(geometry: ChunkGeometry, samples: Vec<T>) -> Option<Self> {
        if samples.len() != geometry.pixel_count() {
            return None;
        }
        Some(Self { geometry, samples })
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    /// Samples in storage order.
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    /// Sample at geographic pixel `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> T {
        self.samples[self.geometry.storage_index(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let index = self.geometry.storage_index(i, j);
        self.samples[index] = value;
    }

    /// Sample of the pixel containing a point, if it is inside the chunk.
    pub fn sample_at(&self, lat: Angle, lon: Angle) -> Option<T> {
        let (i, j) = self.geometry.pixel_of(lat, lon)?;
        Some(self.get(i, j))
    }

    /// Fold overlapping source grids into this one.
    ///
    /// Every destination pixel centre is looked up in each source by nearest
    /// index. Matches are folded into a per-pixel `f64` accumulator with
    /// `fold(n, acc, sample)`, where `n` counts the samples already folded
    /// into that pixel. Once every source is folded, `finish(n, acc)` turns
    /// the accumulator back into a sample. Pixels no source covers keep
    /// their value. Returns the number of pixels that received at least one
    /// sample.
    pub fn render_chunks_into<F, G>(
        &mut self,
        sources: &[&ChunkGrid<T>],
        fold: F,
        finish: G,
    ) -> usize
    where
        F: Fn(u32, &mut [f64], T),
        G: Fn(u32, &[f64]) -> T,
    {
        let lat_steps = self.geometry.lat_steps() as usize;
        let lon_steps = self.geometry.lon_steps() as usize;
        let width = T::default().to_components().as_ref().len();
        let mut counts = vec![0u32; self.samples.len()];
        let mut acc = vec![0.0f64; self.samples.len() * width];

        for source in sources {
            let src = source.geometry();
            if src.is_empty() || src.is_disjoint(&self.geometry) {
                continue;
            }
            if src.lat_pixel_size() > self.geometry.lat_pixel_size()
                || src.lon_pixel_size() > self.geometry.lon_pixel_size()
            {
                debug!(
                    source_pixel = %src.lat_pixel_size(),
                    dest_pixel = %self.geometry.lat_pixel_size(),
                    "Source coarser than destination, sampling nearest pixel"
                );
            }

            let rows: Vec<Option<usize>> = (0..lat_steps)
                .map(|i| src.lat_index(self.geometry.pixel_lat(i)))
                .collect();
            let cols: Vec<Option<usize>> = (0..lon_steps)
                .map(|j| src.lon_index(self.geometry.pixel_lon(j)))
                .collect();

            for (i, row) in rows.iter().enumerate() {
                let Some(si) = *row else { continue };
                for (j, col) in cols.iter().enumerate() {
                    let Some(sj) = *col else { continue };
                    let dest = self.geometry.storage_index(i, j);
                    let sample = source.samples[src.storage_index(si, sj)];
                    fold(counts[dest], &mut acc[dest * width..(dest + 1) * width], sample);
                    counts[dest] += 1;
                }
            }
        }

        let mut filled = 0;
        for (dest, &n) in counts.iter().enumerate() {
            if n > 0 {
                self.samples[dest] = finish(n, &acc[dest * width..(dest + 1) * width]);
                filled += 1;
            }
        }
        filled
    }

    /// [`ChunkGrid::render_chunks_into`] with the sample type's mean.
    pub fn render_average(&mut self, sources: &[&ChunkGrid<T>]) -> usize {
        self.render_chunks_into(sources, |_, acc, sample| sample.accumulate(acc), T::mean)
    }
}

/// Serialize a grid into a persisted record.
pub fn encode_grid<T: Sample>(grid: &ChunkGrid<T>) -> Vec<u8> {
    let geometry = grid.geometry();
    let mut out = Vec::with_capacity(HEADER_LEN + grid.samples.len() * T::ENCODED_LEN);
    out.extend_from_slice(&(geometry.lat_steps() as i32).to_le_bytes());
    out.extend_from_slice(&(geometry.lon_steps() as i32).to_le_bytes());
    for sample in &grid.samples {
        sample.write_bytes(&mut out);
    }
    out
}

/// Decode a persisted record for a chunk of the given geometry.
///
/// The header must match the geometry's pixel grid and the payload must hold
/// exactly that many samples.
pub fn decode_grid<T: Sample>(
    geometry: &ChunkGeometry,
    bytes: &[u8],
) -> Result<ChunkGrid<T>, RecordError> {
    if bytes.len() < HEADER_LEN {
        return Err(RecordError::TooShort { len: bytes.len() });
    }
    let lat_steps = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let lon_steps = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if lat_steps < 0
        || lon_steps < 0
        || lat_steps as u32 != geometry.lat_steps()
        || lon_steps as u32 != geometry.lon_steps()
    {
        return Err(RecordError::DimensionMismatch {
            lat_steps,
            lon_steps,
            expected_lat: geometry.lat_steps(),
            expected_lon: geometry.lon_steps(),
        });
    }

    let payload = &bytes[HEADER_LEN..];
    let expected = geometry.pixel_count() * T::ENCODED_LEN;
    if payload.len() != expected {
        return Err(RecordError::LengthMismatch {
            actual: payload.len(),
            expected,
        });
    }

    let samples = payload.chunks_exact(T::ENCODED_LEN).map(T::read_bytes).collect();
    Ok(ChunkGrid {
        geometry: geometry.clone(),
        samples,
    })
}

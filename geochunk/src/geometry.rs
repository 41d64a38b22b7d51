//! Chunk geometry: a lat/lon rectangle divided into a pixel grid.
//!
//! Latitude index `i` runs south to north from `lat_lo`. Longitude index `j`
//! runs west to east from `lon_lo`, but samples are *stored* with the
//! longitude axis mirrored. [`ChunkGeometry::storage_index`] is the only
//! place that mirroring is applied; every grid access goes through it.

use crate::angle::Angle;
use crate::error::{ChunkError, Result};

/// A rectangular lat/lon extent with a fixed pixel grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkGeometry {
    lat_steps: u32,
    lon_steps: u32,
    lat_lo: Angle,
    lon_lo: Angle,
    lat_hi: Angle,
    lon_hi: Angle,
}

impl ChunkGeometry {
    /// The zero-size sentinel for uninitialized state.
    pub const EMPTY: ChunkGeometry = ChunkGeometry {
        lat_steps: 0,
        lon_steps: 0,
        lat_lo: Angle::ZERO,
        lon_lo: Angle::ZERO,
        lat_hi: Angle::ZERO,
        lon_hi: Angle::ZERO,
    };

    /// Create a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidGeometry`] if a high corner is below its
    /// low corner or a step count is zero.
    pub fn new(
        lat_lo: Angle,
        lon_lo: Angle,
        lat_hi: Angle,
        lon_hi: Angle,
        lat_steps: u32,
        lon_steps: u32,
    ) -> Result<Self> {
        if lat_hi < lat_lo || lon_hi < lon_lo {
            return Err(ChunkError::InvalidGeometry(format!(
                "high corner ({}, {}) below low corner ({}, {})",
                lat_hi, lon_hi, lat_lo, lon_lo
            )));
        }
        if lat_steps == 0 || lon_steps == 0 {
            return Err(ChunkError::InvalidGeometry(format!(
                "pixel grid {}x{} has no pixels",
                lat_steps, lon_steps
            )));
        }
        Ok(Self {
            lat_steps,
            lon_steps,
            lat_lo,
            lon_lo,
            lat_hi,
            lon_hi,
        })
    }

    /// Returns `true` for the zero-size sentinel.
    pub fn is_empty(&self) -> bool {
        self.lat_steps == 0 || self.lon_steps == 0
    }

    pub fn lat_steps(&self) -> u32 {
        self.lat_steps
    }

    pub fn lon_steps(&self) -> u32 {
        self.lon_steps
    }

    pub fn lat_lo(&self) -> Angle {
        self.lat_lo
    }

    pub fn lon_lo(&self) -> Angle {
        self.lon_lo
    }

    pub fn lat_hi(&self) -> Angle {
        self.lat_hi
    }

    pub fn lon_hi(&self) -> Angle {
        self.lon_hi
    }

    pub fn lat_delta(&self) -> Angle {
        self.lat_hi - self.lat_lo
    }

    pub fn lon_delta(&self) -> Angle {
        self.lon_hi - self.lon_lo
    }

    /// Angular height of one pixel (rounded down to a whole tick).
    pub fn lat_pixel_size(&self) -> Angle {
        if self.lat_steps == 0 {
            return Angle::ZERO;
        }
        self.lat_delta() / self.lat_steps as i64
    }

    /// Angular width of one pixel (rounded down to a whole tick).
    pub fn lon_pixel_size(&self) -> Angle {
        if self.lon_steps == 0 {
            return Angle::ZERO;
        }
        self.lon_delta() / self.lon_steps as i64
    }

    /// Number of pixels in the grid.
    pub fn pixel_count(&self) -> usize {
        self.lat_steps as usize * self.lon_steps as usize
    }

    /// The centre of the extent.
    pub fn center(&self) -> (Angle, Angle) {
        (
            self.lat_lo + self.lat_delta() / 2,
            self.lon_lo + self.lon_delta() / 2,
        )
    }

    /// Half-open containment: low edges are inside, high edges are not.
    pub fn contains(&self, lat: Angle, lon: Angle) -> bool {
        lat >= self.lat_lo && lat < self.lat_hi && lon >= self.lon_lo && lon < self.lon_hi
    }

    /// Returns `true` when the two extents share no interior area.
    pub fn is_disjoint(&self, other: &ChunkGeometry) -> bool {
        self.lat_hi <= other.lat_lo
            || other.lat_hi <= self.lat_lo
            || self.lon_hi <= other.lon_lo
            || other.lon_hi <= self.lon_lo
    }

    /// Latitude of the centre of pixel row `i`.
    pub fn pixel_lat(&self, i: usize) -> Angle {
        self.lat_lo + center_offset(self.lat_delta(), i, self.lat_steps)
    }

    /// Longitude of the centre of pixel column `j` (geographic order).
    pub fn pixel_lon(&self, j: usize) -> Angle {
        self.lon_lo + center_offset(self.lon_delta(), j, self.lon_steps)
    }

    /// Row index containing `lat`, if it is inside the extent.
    pub fn lat_index(&self, lat: Angle) -> Option<usize> {
        axis_index(lat - self.lat_lo, self.lat_delta(), self.lat_steps)
    }

    /// Geographic column index containing `lon`, if it is inside the extent.
    pub fn lon_index(&self, lon: Angle) -> Option<usize> {
        axis_index(lon - self.lon_lo, self.lon_delta(), self.lon_steps)
    }

    /// Pixel `(i, j)` containing the point, if it is inside the extent.
    pub fn pixel_of(&self, lat: Angle, lon: Angle) -> Option<(usize, usize)> {
        Some((self.lat_index(lat)?, self.lon_index(lon)?))
    }

    /// Offset into row-major storage for geographic pixel `(i, j)`.
    ///
    /// Storage is lat-major with the longitude axis reversed.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the pixel is outside the grid.
    pub fn storage_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.lat_steps as usize && j < self.lon_steps as usize);
        let lon_steps = self.lon_steps as usize;
        i * lon_steps + (lon_steps - 1 - j)
    }
}

impl Default for ChunkGeometry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Offset of the centre of cell `index` along an axis of `steps` cells.
fn center_offset(delta: Angle, index: usize, steps: u32) -> Angle {
    let numerator = (2 * index as i128 + 1) * delta.ticks() as i128;
    Angle::from_ticks((numerator / (2 * steps as i128)) as i64)
}

/// Cell index for an offset from the low edge, or `None` outside `[0, delta)`.
fn axis_index(offset: Angle, delta: Angle, steps: u32) -> Option<usize> {
    if steps == 0 || delta.ticks() <= 0 || offset.ticks() < 0 || offset >= delta {
        return None;
    }
    let index = offset.ticks() as i128 * steps as i128 / delta.ticks() as i128;
    Some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(d: f64) -> Angle {
        Angle::from_degrees(d)
    }

    fn one_degree(steps: u32) -> ChunkGeometry {
        ChunkGeometry::new(deg(35.0), deg(138.0), deg(36.0), deg(139.0), steps, steps).unwrap()
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(ChunkGeometry::new(deg(1.0), deg(0.0), deg(0.0), deg(1.0), 4, 4).is_err());
        assert!(ChunkGeometry::new(deg(0.0), deg(0.0), deg(1.0), deg(1.0), 0, 4).is_err());
        assert!(ChunkGeometry::EMPTY.is_empty());
        assert_eq!(ChunkGeometry::default().pixel_count(), 0);
    }

    #[test]
    fn test_pixel_sizes() {
        let g = one_degree(4);
        assert_eq!(g.lat_pixel_size(), deg(0.25));
        assert_eq!(g.lon_pixel_size(), deg(0.25));
        assert_eq!(g.pixel_count(), 16);
        assert_eq!(g.center(), (deg(35.5), deg(138.5)));
    }

    #[test]
    fn test_contains_half_open() {
        let g = one_degree(4);
        assert!(g.contains(deg(35.0), deg(138.0)));
        assert!(g.contains(deg(35.999), deg(138.999)));
        assert!(!g.contains(deg(36.0), deg(138.5)));
        assert!(!g.contains(deg(35.5), deg(139.0)));
        assert!(!g.contains(deg(34.999), deg(138.5)));
    }

    #[test]
    fn test_disjoint() {
        let g = one_degree(4);
        let east = ChunkGeometry::new(deg(35.0), deg(139.0), deg(36.0), deg(140.0), 4, 4).unwrap();
        let overlapping =
            ChunkGeometry::new(deg(35.5), deg(138.5), deg(36.5), deg(139.5), 4, 4).unwrap();
        assert!(g.is_disjoint(&east));
        assert!(!g.is_disjoint(&overlapping));
        assert!(!overlapping.is_disjoint(&g));
    }

    #[test]
    fn test_pixel_centers_round_trip() {
        let g = one_degree(4);
        assert_eq!(g.pixel_lat(0), deg(35.125));
        assert_eq!(g.pixel_lon(3), deg(138.875));
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(g.pixel_of(g.pixel_lat(i), g.pixel_lon(j)), Some((i, j)));
            }
        }
        assert_eq!(g.pixel_of(deg(36.0), deg(138.5)), None);
        assert_eq!(g.lon_index(deg(137.9)), None);
    }

    #[test]
    fn test_negative_extent_indices() {
        let g = ChunkGeometry::new(deg(-1.0), deg(-1.0), deg(0.0), deg(0.0), 2, 2).unwrap();
        assert_eq!(g.lat_index(deg(-0.0001)), Some(1));
        assert_eq!(g.lat_index(deg(-1.0)), Some(0));
        assert_eq!(g.lat_index(deg(0.0)), None);
    }

    #[test]
    fn test_storage_index_mirrors_longitude() {
        let g = ChunkGeometry::new(deg(0.0), deg(0.0), deg(2.0), deg(3.0), 2, 3).unwrap();
        // Westernmost column is stored last in its row.
        assert_eq!(g.storage_index(0, 0), 2);
        assert_eq!(g.storage_index(0, 2), 0);
        assert_eq!(g.storage_index(1, 0), 5);
        assert_eq!(g.storage_index(1, 1), 4);
    }
}

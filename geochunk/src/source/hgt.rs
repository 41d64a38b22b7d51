//! SRTM `.hgt` cell reader.
//!
//! This module provides the [`HgtTile`] struct for reading SRTM `.hgt` files
//! and sampling elevation inside their 1° × 1° cell.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{ChunkError, Result};
use crate::filename::parse_hgt_filename;

/// File size for SRTM1 (1 arc-second, ~30m resolution): 3601 × 3601 × 2 bytes
pub(crate) const SRTM1_SIZE: usize = 3601 * 3601 * 2; // 25,934,402 bytes

/// File size for SRTM3 (3 arc-second, ~90m resolution): 1201 × 1201 × 2 bytes
pub(crate) const SRTM3_SIZE: usize = 1201 * 1201 * 2; // 2,884,802 bytes

const SRTM1_SAMPLES: usize = 3601;
const SRTM3_SAMPLES: usize = 1201;

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// Resolution of an SRTM cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HgtResolution {
    /// SRTM1: 1 arc-second (~30m) resolution
    Srtm1,
    /// SRTM3: 3 arc-second (~90m) resolution
    Srtm3,
}

impl HgtResolution {
    /// Returns the number of samples per row/column for this resolution.
    pub fn samples(&self) -> usize {
        match self {
            HgtResolution::Srtm1 => SRTM1_SAMPLES,
            HgtResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    /// Returns the approximate resolution in meters.
    pub fn meters(&self) -> f64 {
        match self {
            HgtResolution::Srtm1 => 30.0,
            HgtResolution::Srtm3 => 90.0,
        }
    }
}

/// A memory-mapped SRTM cell.
///
/// Samples are 16-bit big-endian integers stored row by row from the north
/// edge to the south edge. The first and last rows and columns lie exactly on
/// the cell's integer-degree boundaries.
pub struct HgtTile {
    data: Mmap,
    samples: usize,
    resolution: HgtResolution,
    /// Southwest corner latitude
    base_lat: i32,
    /// Southwest corner longitude
    base_lon: i32,
}

impl HgtTile {
    /// Load a cell, taking its corner from the file name.
    ///
    /// Files that do not follow the `N35E138.hgt` convention are loaded with
    /// corner `(0, 0)`; use [`HgtTile::from_file_with_coords`] for those.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (lat, lon) = path
            .as_ref()
            .to_str()
            .and_then(parse_hgt_filename)
            .unwrap_or((0, 0));
        Self::from_file_with_coords(path, lat, lon)
    }

    /// Load a cell with an explicit south-west corner.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or memory-mapped
    /// - The file size doesn't match SRTM1 or SRTM3 format
    pub fn from_file_with_coords<P: AsRef<Path>>(
        path: P,
        base_lat: i32,
        base_lon: i32,
    ) -> Result<Self> {
        let file = File::open(&path)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let mmap = unsafe { Mmap::map(&file)? };

        let (samples, resolution) = match mmap.len() {
            SRTM1_SIZE => (SRTM1_SAMPLES, HgtResolution::Srtm1),
            SRTM3_SIZE => (SRTM3_SAMPLES, HgtResolution::Srtm3),
            size => {
                return Err(ChunkError::InvalidSourceFile {
                    path: path.as_ref().to_path_buf(),
                    size,
                })
            }
        };

        Ok(Self {
            data: mmap,
            samples,
            resolution,
            base_lat,
            base_lon,
        })
    }

    /// Fractional (row, col) of a point, row 0 being the north edge.
    fn position(&self, lat: f64, lon: f64) -> Result<(f64, f64)> {
        let north = f64::from(self.base_lat) + 1.0;
        let west = f64::from(self.base_lon);
        let lat_off = north - lat;
        let lon_off = lon - west;

        if !(0.0..=1.0).contains(&lat_off) || !(0.0..=1.0).contains(&lon_off) {
            return Err(ChunkError::key_range(format!(
                "({}, {}) outside cell {}",
                lat,
                lon,
                crate::filename::hgt_cell_filename(self.base_lat, self.base_lon)
            )));
        }

        let last = (self.samples - 1) as f64;
        Ok((lat_off * last, lon_off * last))
    }

    /// Elevation of the grid point nearest to `(lat, lon)`.
    ///
    /// Returns [`VOID_VALUE`] where the cell has no data.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates are outside the cell.
    pub fn elevation(&self, lat: f64, lon: f64) -> Result<i16> {
        let (row, col) = self.position(lat, lon)?;
        Ok(self.sample(row.round() as usize, col.round() as usize))
    }

    /// Bilinear elevation from the four grid points around `(lat, lon)`.
    ///
    /// Returns `None` if any of the four points is void.
    pub fn elevation_interpolated(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        let (row, col) = self.position(lat, lon)?;

        // Keep a full 2x2 neighbourhood on the south and east edges
        let r0 = (row.floor() as usize).min(self.samples - 2);
        let c0 = (col.floor() as usize).min(self.samples - 2);
        let dr = row - r0 as f64;
        let dc = col - c0 as f64;

        let corners = [
            self.sample(r0, c0),
            self.sample(r0, c0 + 1),
            self.sample(r0 + 1, c0),
            self.sample(r0 + 1, c0 + 1),
        ];
        if corners.contains(&VOID_VALUE) {
            return Ok(None);
        }
        let [nw, ne, sw, se] = corners.map(f64::from);

        let north = nw * (1.0 - dc) + ne * dc;
        let south = sw * (1.0 - dc) + se * dc;
        Ok(Some(north * (1.0 - dr) + south * dr))
    }

    fn sample(&self, row: usize, col: usize) -> i16 {
        let row = row.min(self.samples - 1);
        let col = col.min(self.samples - 1);
        let offset = (row * self.samples + col) * 2;
        i16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    pub fn resolution(&self) -> HgtResolution {
        self.resolution
    }

    /// Returns the number of samples per row/column.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn base_lat(&self) -> i32 {
        self.base_lat
    }

    pub fn base_lon(&self) -> i32 {
        self.base_lon
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    /// SRTM3 bytes with 1000m in the north-west corner, `center` at the
    /// centre and 100m in the south-east corner.
    pub(crate) fn srtm3_bytes(center: i16) -> Vec<u8> {
        let mut data = vec![0u8; SRTM3_SIZE];
        data[0..2].copy_from_slice(&1000i16.to_be_bytes());

        let center_offset = (600 * SRTM3_SAMPLES + 600) * 2;
        data[center_offset..center_offset + 2].copy_from_slice(&center.to_be_bytes());

        let se_offset = (1200 * SRTM3_SAMPLES + 1200) * 2;
        data[se_offset..se_offset + 2].copy_from_slice(&100i16.to_be_bytes());
        data
    }

    fn create_test_file(center: i16) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&srtm3_bytes(center)).unwrap();
        file
    }

    #[test]
    fn test_load_srtm3_file() {
        let file = create_test_file(500);
        let tile = HgtTile::from_file(file.path()).unwrap();
        assert_eq!(tile.resolution(), HgtResolution::Srtm3);
        assert_eq!(tile.samples(), SRTM3_SAMPLES);
    }

    #[test]
    fn test_corner_from_filename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("S13W078.hgt");
        std::fs::write(&path, srtm3_bytes(0)).unwrap();
        let tile = HgtTile::from_file(&path).unwrap();
        assert_eq!((tile.base_lat(), tile.base_lon()), (-13, -78));
    }

    #[test]
    fn test_invalid_file_size() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 1000]).unwrap();

        match HgtTile::from_file(file.path()) {
            Err(ChunkError::InvalidSourceFile { size, .. }) => assert_eq!(size, 1000),
            Err(e) => panic!("Expected InvalidSourceFile, got {e}"),
            Ok(_) => panic!("Expected InvalidSourceFile"),
        }
    }

    #[test]
    fn test_nearest_corners_and_center() {
        let file = create_test_file(500);
        let tile = HgtTile::from_file_with_coords(file.path(), 35, 138).unwrap();

        assert_eq!(tile.elevation(36.0, 138.0).unwrap(), 1000);
        assert_eq!(tile.elevation(35.0, 139.0).unwrap(), 100);
        assert_eq!(tile.elevation(35.5, 138.5).unwrap(), 500);
        assert_eq!(tile.elevation(35.2, 138.2).unwrap(), 0);
    }

    #[test]
    fn test_outside_cell() {
        let file = create_test_file(500);
        let tile = HgtTile::from_file_with_coords(file.path(), 35, 138).unwrap();
        assert!(tile.elevation(36.5, 138.5).is_err());
        assert!(tile.elevation_interpolated(35.5, 137.9).is_err());
    }

    #[test]
    fn test_interpolated() {
        let file = create_test_file(500);
        let tile = HgtTile::from_file_with_coords(file.path(), 35, 138).unwrap();

        // On a grid point the interpolation is exact
        assert_eq!(tile.elevation_interpolated(35.5, 138.5).unwrap(), Some(500.0));

        // Half a sample east of the centre: halfway to the zero neighbour
        let half = 0.5 / 1200.0;
        let v = tile
            .elevation_interpolated(35.5, 138.5 + half)
            .unwrap()
            .unwrap();
        assert!((v - 250.0).abs() < 1e-6);

        // South-east corner uses the clamped neighbourhood
        assert_eq!(tile.elevation_interpolated(35.0, 139.0).unwrap(), Some(100.0));
    }

    #[test]
    fn test_interpolated_void() {
        let file = create_test_file(VOID_VALUE);
        let tile = HgtTile::from_file_with_coords(file.path(), 35, 138).unwrap();
        assert_eq!(tile.elevation_interpolated(35.5, 138.5).unwrap(), None);
        assert_eq!(tile.elevation(35.5, 138.5).unwrap(), VOID_VALUE);
    }

    #[test]
    fn test_resolution_info() {
        assert_eq!(HgtResolution::Srtm1.samples(), 3601);
        assert_eq!(HgtResolution::Srtm3.samples(), 1201);
        assert_eq!(HgtResolution::Srtm1.meters(), 30.0);
        assert_eq!(HgtResolution::Srtm3.meters(), 90.0);
    }
}

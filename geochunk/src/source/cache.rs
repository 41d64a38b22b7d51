//! Bounded cache of loaded SRTM cells.
//!
//! [`HgtSourceCache`] resolves a point to its 1° cell, loads the cell from
//! `{data_dir}/{name}.hgt` (extracting `{name}.hgt.zip` on first use) and
//! keeps at most `capacity` cells mapped, evicting the least recently used.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, info};

use crate::error::{ChunkError, Result};
use crate::filename::{hgt_cell_filename, parse_hgt_filename};
use crate::source::hgt::{HgtTile, VOID_VALUE};

/// Default number of cells kept mapped.
pub const DEFAULT_SOURCE_CACHE_SIZE: u64 = 32;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cells currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses (cells loaded from disk).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// LRU cache of memory-mapped `.hgt` cells keyed by south-west corner.
pub struct HgtSourceCache {
    data_dir: PathBuf,
    cells: Cache<(i32, i32), Arc<HgtTile>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl HgtSourceCache {
    /// Create a cache over `data_dir` holding at most `capacity` cells.
    ///
    /// An SRTM3 cell maps ~2.8MB, an SRTM1 cell ~25MB. Eviction is driven
    /// by capacity alone, least recently used first; there is no clock.
    pub fn new<P: AsRef<Path>>(data_dir: P, capacity: u64) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cells: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// The cell containing `(lat, lon)`.
    pub fn cell_for(&self, lat: f64, lon: f64) -> Result<Arc<HgtTile>> {
        self.cell(lat.floor() as i32, lon.floor() as i32)
    }

    /// The cell with south-west corner `(lat, lon)`, loaded on demand.
    ///
    /// # Errors
    ///
    /// - [`ChunkError::SourceFileNotFound`] if neither `.hgt` nor `.hgt.zip`
    ///   exists for the cell.
    /// - [`ChunkError::InvalidSourceFile`] if the file has an unknown size.
    pub fn cell(&self, lat: i32, lon: i32) -> Result<Arc<HgtTile>> {
        let key = (lat, lon);
        if let Some(tile) = self.cells.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(tile);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        // Concurrent misses for one cell share a single load
        self.cells
            .try_get_with(key, || self.load(lat, lon))
            .map_err(|e| (*e).clone())
    }

    fn load(&self, lat: i32, lon: i32) -> Result<Arc<HgtTile>> {
        let filename = hgt_cell_filename(lat, lon);
        let path = self.data_dir.join(&filename);

        if !path.exists() {
            let zip_path = self.data_dir.join(format!("{}.zip", filename));
            if !zip_path.exists() {
                return Err(ChunkError::SourceFileNotFound { path });
            }
            self.extract_hgt_from_zip(&zip_path, &filename)?;
        }

        let tile = HgtTile::from_file_with_coords(&path, lat, lon)?;
        debug!(cell = %filename, resolution = ?tile.resolution(), "Loaded source cell");
        Ok(Arc::new(tile))
    }

    /// Extract an .hgt file from a local .hgt.zip archive.
    fn extract_hgt_from_zip(&self, zip_path: &Path, filename: &str) -> Result<()> {
        let invalid = |e: zip::result::ZipError| io::Error::new(io::ErrorKind::InvalidData, e);

        let file = std::fs::File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(invalid)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(invalid)?;
            let entry_name = entry.name().to_string();
            if entry_name.ends_with(".hgt") || entry_name == filename {
                // Extract beside the target and rename so readers never map a
                // partial file
                let out_path = self.data_dir.join(filename);
                let temp_path = self
                    .data_dir
                    .join(format!(".{}.{}.tmp", filename, std::process::id()));
                let mut out_file = std::fs::File::create(&temp_path)?;
                if let Err(e) = io::copy(&mut entry, &mut out_file) {
                    let _ = std::fs::remove_file(&temp_path);
                    return Err(e.into());
                }
                std::fs::rename(&temp_path, &out_path)?;
                info!(archive = %zip_path.display(), cell = %filename, "Extracted source cell");
                return Ok(());
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("No .hgt file found in {}", zip_path.display()),
        )
        .into())
    }

    /// Nearest-sample elevation at a point, `None` for void data.
    pub fn elevation(&self, lat: f64, lon: f64) -> Result<Option<i16>> {
        let v = self.cell_for(lat, lon)?.elevation(lat, lon)?;
        Ok(if v == VOID_VALUE { None } else { Some(v) })
    }

    /// Bilinear elevation at a point, `None` if any neighbour is void.
    pub fn elevation_interpolated(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        self.cell_for(lat, lon)?.elevation_interpolated(lat, lon)
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.cells.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the maximum cache size.
    pub fn cache_capacity(&self) -> u64 {
        self.cells.policy().max_capacity().unwrap_or(0)
    }

    /// Clear all cells from the cache.
    pub fn clear_cache(&self) {
        self.cells.invalidate_all();
    }

    /// Scan the data directory for `.hgt` and `.hgt.zip` files.
    ///
    /// Returns the sorted corners of every cell present in either form.
    pub fn scan_cells(&self) -> Vec<(i32, i32)> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let cells: HashSet<(i32, i32)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') {
                    return None;
                }
                parse_hgt_filename(&name)
            })
            .collect();

        let mut result: Vec<(i32, i32)> = cells.into_iter().collect();
        result.sort_unstable();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::hgt::tests::srtm3_bytes;
    use crate::source::hgt::SRTM3_SIZE;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_tile(dir: &Path, filename: &str, center_elevation: i16) {
        fs::write(dir.join(filename), srtm3_bytes(center_elevation)).unwrap();
    }

    #[test]
    fn test_cache_basic() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "N35E138.hgt", 500);

        let cache = HgtSourceCache::new(temp_dir.path(), 10);
        assert_eq!(cache.elevation(35.5, 138.5).unwrap(), Some(500));
        assert_eq!(cache.elevation_interpolated(35.5, 138.5).unwrap(), Some(500.0));
    }

    #[test]
    fn test_cache_hit() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "N35E138.hgt", 500);

        let cache = HgtSourceCache::new(temp_dir.path(), 10);
        cache.elevation(35.5, 138.5).unwrap();
        cache.elevation(35.6, 138.6).unwrap();
        cache.elevation(35.7, 138.7).unwrap();

        let stats = cache.cache_stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 2);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = HgtSourceCache::new(temp_dir.path(), 10);

        match cache.cell(10, 20) {
            Err(ChunkError::SourceFileNotFound { path }) => {
                assert!(path.ends_with("N10E020.hgt"));
            }
            Err(e) => panic!("Expected SourceFileNotFound, got {e}"),
            Ok(_) => panic!("Expected SourceFileNotFound"),
        }
    }

    #[test]
    fn test_void_data_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "N35E138.hgt", VOID_VALUE);

        let cache = HgtSourceCache::new(temp_dir.path(), 10);
        assert_eq!(cache.elevation(35.5, 138.5).unwrap(), None);
        assert_eq!(cache.elevation_interpolated(35.5, 138.5).unwrap(), None);
    }

    #[test]
    fn test_negative_cell() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "S13W078.hgt", 250);

        let cache = HgtSourceCache::new(temp_dir.path(), 10);
        let tile = cache.cell_for(-12.5, -77.5).unwrap();
        assert_eq!((tile.base_lat(), tile.base_lon()), (-13, -78));
        assert_eq!(cache.elevation(-12.5, -77.5).unwrap(), Some(250));
    }

    #[test]
    fn test_hgt_zip_extraction() {
        let temp_dir = TempDir::new().unwrap();

        let hgt_data = vec![0u8; SRTM3_SIZE];
        let zip_path = temp_dir.path().join("N40E010.hgt.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip_writer.start_file("N40E010.hgt", options).unwrap();
        zip_writer.write_all(&hgt_data).unwrap();
        zip_writer.finish().unwrap();

        let cache = HgtSourceCache::new(temp_dir.path(), 10);
        assert_eq!(cache.elevation(40.5, 10.5).unwrap(), Some(0));
        assert!(temp_dir.path().join("N40E010.hgt").exists());
        assert_eq!(cache.scan_cells(), vec![(40, 10)]);
    }

    #[test]
    fn test_cache_capacity_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "N35E138.hgt", 500);

        let cache = HgtSourceCache::new(temp_dir.path(), 5);
        assert_eq!(cache.cache_capacity(), 5);

        cache.elevation(35.5, 138.5).unwrap();
        cache.clear_cache();
        cache.elevation(35.5, 138.5).unwrap();
        assert_eq!(cache.cache_stats().miss_count, 2);
    }

    #[test]
    fn test_scan_cells() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), "N35E138.hgt", 0);
        create_test_tile(temp_dir.path(), "S01W001.hgt", 0);
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();

        let cache = HgtSourceCache::new(temp_dir.path(), 5);
        assert_eq!(cache.scan_cells(), vec![(-1, -1), (35, 138)]);

        let empty = HgtSourceCache::new(temp_dir.path().join("missing"), 5);
        assert!(empty.scan_cells().is_empty());
    }
}

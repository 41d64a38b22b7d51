//! Versioned pyramid layouts.
//!
//! A layout fixes, for every zoom level, the angular frame size of a chunk
//! and its pixel count, together with the reference origin that bucket
//! indices are measured from. Each zoom level subdivides the previous one by
//! a whole ratio, so every chunk has exactly `ratio²` children.
//!
//! Two built-in layouts exist:
//!
//! | Version | Zoom 0 frame | Zoom 15 frame | Pixels |
//! |---------|--------------|---------------|--------|
//! | 1       | 64°          | 1/512°        | 256    |
//! | 2       | 32°          | 1/1024°       | 128    |
//!
//! Both use the origin `(0°, 0°)` and model the whole globe.

use std::sync::{Arc, OnceLock};

use crate::angle::{Angle, TICKS_PER_DEGREE};
use crate::error::{ChunkError, Result};

/// Highest zoom level any layout may define.
pub const MAX_ZOOM: u8 = 15;

/// Number of zoom levels in every layout.
pub const ZOOM_LEVELS: usize = MAX_ZOOM as usize + 1;

/// Largest encoded bucket coordinate on either axis (exclusive).
pub(crate) const AXIS_SPAN: i64 = 1 << 32;

/// Built-in layout versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutVersion {
    /// 64° chunks at zoom 0, halving per level, 256 px.
    V1,
    /// 32° chunks at zoom 0, halving per level, 128 px.
    V2,
}

impl LayoutVersion {
    /// Returns the numeric version tag.
    pub fn number(self) -> u32 {
        match self {
            LayoutVersion::V1 => 1,
            LayoutVersion::V2 => 2,
        }
    }

    /// Look up a built-in version by its numeric tag.
    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(LayoutVersion::V1),
            2 => Some(LayoutVersion::V2),
            _ => None,
        }
    }
}

/// The modeled bounding region, inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub lat_lo: Angle,
    pub lon_lo: Angle,
    pub lat_hi: Angle,
    pub lon_hi: Angle,
}

impl Region {
    /// The whole globe.
    pub const GLOBE: Region = Region {
        lat_lo: Angle::from_whole_degrees(-90),
        lon_lo: Angle::from_whole_degrees(-180),
        lat_hi: Angle::from_whole_degrees(90),
        lon_hi: Angle::from_whole_degrees(180),
    };

    /// Check whether a point lies in the region.
    pub fn contains(&self, lat: Angle, lon: Angle) -> bool {
        lat >= self.lat_lo && lat <= self.lat_hi && lon >= self.lon_lo && lon <= self.lon_hi
    }
}

/// Frame sizes, pixel counts and key offsets for one pyramid version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidLayout {
    version: u32,
    origin_lat: Angle,
    origin_lon: Angle,
    region: Region,
    frames: [Angle; ZOOM_LEVELS],
    pixels: [u32; ZOOM_LEVELS],
    bucket_offsets: [i64; ZOOM_LEVELS],
}

impl PyramidLayout {
    /// Returns a shared built-in layout.
    pub fn standard(version: LayoutVersion) -> Arc<PyramidLayout> {
        static V1: OnceLock<Arc<PyramidLayout>> = OnceLock::new();
        static V2: OnceLock<Arc<PyramidLayout>> = OnceLock::new();

        let (cell, top_exponent, pixels) = match version {
            LayoutVersion::V1 => (&V1, 6, 256),
            LayoutVersion::V2 => (&V2, 5, 128),
        };
        cell.get_or_init(|| Arc::new(Self::halving(version.number(), top_exponent, pixels)))
            .clone()
    }

    /// Look up a built-in layout by numeric version.
    pub fn for_version(version: u32) -> Option<Arc<PyramidLayout>> {
        LayoutVersion::from_number(version).map(Self::standard)
    }

    /// Halving layout whose zoom-0 frame is `2^top_exponent` degrees.
    fn halving(version: u32, top_exponent: u32, pixels: u32) -> Self {
        let mut frames = [Angle::ZERO; ZOOM_LEVELS];
        for (zoom, frame) in frames.iter_mut().enumerate() {
            let zoom = zoom as u32;
            *frame = if zoom <= top_exponent {
                Angle::from_whole_degrees(1 << (top_exponent - zoom))
            } else {
                Angle::from_ticks(TICKS_PER_DEGREE >> (zoom - top_exponent))
            };
        }
        Self {
            version,
            origin_lat: Angle::ZERO,
            origin_lon: Angle::ZERO,
            region: Region::GLOBE,
            bucket_offsets: bucket_offsets(&Region::GLOBE, &frames),
            frames,
            pixels: [pixels; ZOOM_LEVELS],
        }
    }

    /// Build a custom layout.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidLayout`] unless:
    /// - `frames` and `pixels` have exactly [`ZOOM_LEVELS`] entries,
    /// - every frame and pixel count is positive,
    /// - each frame is a whole multiple of the next finer one,
    /// - the origin lies inside `region`,
    /// - every bucket in the region packs into a 64-bit key.
    pub fn custom(
        version: u32,
        origin: (Angle, Angle),
        region: Region,
        frames: &[Angle],
        pixels: &[u32],
    ) -> Result<Self> {
        if frames.len() != ZOOM_LEVELS || pixels.len() != ZOOM_LEVELS {
            return Err(ChunkError::InvalidLayout(format!(
                "expected {} zoom levels, got {} frames and {} pixel counts",
                ZOOM_LEVELS,
                frames.len(),
                pixels.len()
            )));
        }
        if region.lat_hi <= region.lat_lo || region.lon_hi <= region.lon_lo {
            return Err(ChunkError::InvalidLayout("region has no area".to_string()));
        }
        if !region.contains(origin.0, origin.1) {
            return Err(ChunkError::InvalidLayout(format!(
                "origin ({}, {}) outside the modeled region",
                origin.0, origin.1
            )));
        }
        for zoom in 0..ZOOM_LEVELS {
            if frames[zoom].ticks() <= 0 || pixels[zoom] == 0 {
                return Err(ChunkError::InvalidLayout(format!(
                    "zoom {} has frame {} and {} pixels",
                    zoom, frames[zoom], pixels[zoom]
                )));
            }
            if zoom + 1 < ZOOM_LEVELS {
                let (coarse, fine) = (frames[zoom].ticks(), frames[zoom + 1].ticks());
                if fine <= 0 || coarse % fine != 0 {
                    return Err(ChunkError::InvalidLayout(format!(
                        "frame at zoom {} is not a whole multiple of zoom {}",
                        zoom,
                        zoom + 1
                    )));
                }
            }
        }

        let mut frame_table = [Angle::ZERO; ZOOM_LEVELS];
        frame_table.copy_from_slice(frames);
        let mut pixel_table = [0u32; ZOOM_LEVELS];
        pixel_table.copy_from_slice(pixels);
        let bucket_offsets = bucket_offsets(&region, &frame_table);

        for (zoom, &offset) in bucket_offsets.iter().enumerate() {
            // Every bucket in [-offset, offset) must pack.
            let widest = 2 * offset;
            if widest >= AXIS_SPAN || crate::key::pack(widest, widest, zoom as u8).is_none() {
                return Err(ChunkError::InvalidLayout(format!(
                    "zoom {} needs {} buckets per axis, more than a 64-bit key can pack",
                    zoom, widest
                )));
            }
        }

        Ok(Self {
            version,
            origin_lat: origin.0,
            origin_lon: origin.1,
            region,
            frames: frame_table,
            pixels: pixel_table,
            bucket_offsets,
        })
    }

    /// Returns the version tag.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the reference origin `(lat, lon)`.
    pub fn origin(&self) -> (Angle, Angle) {
        (self.origin_lat, self.origin_lon)
    }

    /// Returns the modeled region.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Angular size of a chunk at `zoom`.
    ///
    /// # Panics
    ///
    /// Panics if `zoom > MAX_ZOOM`.
    pub fn frame_size(&self, zoom: u8) -> Angle {
        self.frames[zoom as usize]
    }

    /// Pixels per axis of a chunk at `zoom`.
    ///
    /// # Panics
    ///
    /// Panics if `zoom > MAX_ZOOM`.
    pub fn pixel_count(&self, zoom: u8) -> u32 {
        self.pixels[zoom as usize]
    }

    /// Offset added to signed bucket indices at `zoom` before packing.
    pub(crate) fn bucket_offset(&self, zoom: u8) -> i64 {
        self.bucket_offsets[zoom as usize]
    }

    /// Children per axis of a chunk at `zoom`, or `None` at [`MAX_ZOOM`].
    pub fn child_ratio(&self, zoom: u8) -> Option<i64> {
        if zoom >= MAX_ZOOM {
            return None;
        }
        Some(self.frames[zoom as usize].ticks() / self.frames[zoom as usize + 1].ticks())
    }
}

/// `3 × numPossibleBuckets` per zoom, where the count spans the wider axis.
fn bucket_offsets(region: &Region, frames: &[Angle; ZOOM_LEVELS]) -> [i64; ZOOM_LEVELS] {
    let span = (region.lat_hi - region.lat_lo).max(region.lon_hi - region.lon_lo);
    let mut offsets = [0i64; ZOOM_LEVELS];
    for (offset, frame) in offsets.iter_mut().zip(frames.iter()) {
        let frame = frame.ticks().max(1);
        let buckets = (span.ticks() + frame - 1) / frame;
        *offset = 3 * buckets;
    }
    offsets
}

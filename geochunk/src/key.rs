//! Chunk keys: a geometry plus a zoom level and a packed 64-bit key.
//!
//! A key is built either from a point query ([`ChunkKey::containing`]) or by
//! decoding a stored integer ([`ChunkKey::from_key`]). Both paths go through
//! the same bucket arithmetic, so re-encoding a decoded chunk always yields
//! the original key.
//!
//! Packing: `key = (enc_lat + enc_lon · 2^32) · 16 + zoom`, where each
//! `enc = bucket_offset + bucket` is a non-negative 32-bit value. Every zoom
//! owns its own residue class mod 16, so keys never collide across levels.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::angle::Angle;
use crate::error::{ChunkError, Result};
use crate::filename;
use crate::geometry::ChunkGeometry;
use crate::layout::{PyramidLayout, AXIS_SPAN, MAX_ZOOM, ZOOM_LEVELS};

/// Pack two encoded bucket coordinates and a zoom into one key.
pub(crate) fn pack(enc_lat: i64, enc_lon: i64, zoom: u8) -> Option<i64> {
    if !(0..AXIS_SPAN).contains(&enc_lat) || !(0..AXIS_SPAN).contains(&enc_lon) {
        return None;
    }
    enc_lon
        .checked_mul(AXIS_SPAN)?
        .checked_add(enc_lat)?
        .checked_mul(ZOOM_LEVELS as i64)?
        .checked_add(zoom as i64)
}

/// One chunk of a versioned pyramid.
#[derive(Clone)]
pub struct ChunkKey {
    layout: Arc<PyramidLayout>,
    zoom: u8,
    key: i64,
    lat_bucket: i64,
    lon_bucket: i64,
    geometry: ChunkGeometry,
}

impl ChunkKey {
    /// The chunk at `zoom` whose extent contains the point.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::KeyRangeExceeded`] if the zoom is above
    /// [`MAX_ZOOM`], the point lies outside the layout's modeled region, or
    /// the bucket indices do not fit the key packing. No I/O happens.
    pub fn containing(
        layout: &Arc<PyramidLayout>,
        lat: Angle,
        lon: Angle,
        zoom: u8,
    ) -> Result<ChunkKey> {
        check_zoom(zoom)?;
        if !layout.region().contains(lat, lon) {
            return Err(ChunkError::key_range(format!(
                "point ({}, {}) outside the modeled region",
                lat, lon
            )));
        }
        Self::locate(layout, lat, lon, zoom)
    }

    /// Like [`ChunkKey::containing`] for decimal degrees.
    ///
    /// Non-finite coordinates are rejected as out of range.
    pub fn from_degrees(
        layout: &Arc<PyramidLayout>,
        lat: f64,
        lon: f64,
        zoom: u8,
    ) -> Result<ChunkKey> {
        let (Some(lat_angle), Some(lon_angle)) =
            (Angle::try_from_degrees(lat), Angle::try_from_degrees(lon))
        else {
            return Err(ChunkError::key_range(format!(
                "point ({}, {}) is not a finite coordinate",
                lat, lon
            )));
        };
        Self::containing(layout, lat_angle, lon_angle, zoom)
    }

    /// Decode a packed key.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::KeyRangeExceeded`] if the key is negative, its
    /// buckets fall outside the layout's offset range, or the decoded chunk
    /// does not touch the modeled region.
    pub fn from_key(layout: &Arc<PyramidLayout>, key: i64) -> Result<ChunkKey> {
        if key < 0 {
            return Err(ChunkError::key_range(format!("key {} is negative", key)));
        }
        let zoom = (key % ZOOM_LEVELS as i64) as u8;
        let packed = key / ZOOM_LEVELS as i64;
        let enc_lat = packed % AXIS_SPAN;
        let enc_lon = packed / AXIS_SPAN;

        let offset = layout.bucket_offset(zoom);
        let lat_bucket = enc_lat - offset;
        let lon_bucket = enc_lon - offset;
        if !(-offset..offset).contains(&lat_bucket) || !(-offset..offset).contains(&lon_bucket) {
            return Err(ChunkError::key_range(format!(
                "key {} decodes to buckets ({}, {}) outside ±{} at zoom {}",
                key, lat_bucket, lon_bucket, offset, zoom
            )));
        }

        let chunk = Self::from_buckets(layout, lat_bucket, lon_bucket, zoom)?;
        if !chunk.touches_region() {
            return Err(ChunkError::key_range(format!(
                "key {} decodes to a chunk outside the modeled region",
                key
            )));
        }
        Ok(chunk)
    }

    /// The chunk whose lower-left corner is exactly `(lat_lo, lon_lo)`.
    ///
    /// Used to turn parsed blob filenames back into keys.
    pub fn from_corner(
        layout: &Arc<PyramidLayout>,
        lat_lo: Angle,
        lon_lo: Angle,
        zoom: u8,
    ) -> Result<ChunkKey> {
        check_zoom(zoom)?;
        let chunk = Self::locate(layout, lat_lo, lon_lo, zoom)?;
        if chunk.geometry.lat_lo() != lat_lo || chunk.geometry.lon_lo() != lon_lo {
            return Err(ChunkError::key_range(format!(
                "({}, {}) is not a chunk corner at zoom {}",
                lat_lo, lon_lo, zoom
            )));
        }
        if !chunk.touches_region() {
            return Err(ChunkError::key_range(format!(
                "chunk at ({}, {}) lies outside the modeled region",
                lat_lo, lon_lo
            )));
        }
        Ok(chunk)
    }

    /// Bucket a point without checking the modeled region.
    ///
    /// Parent and child lookups sample points that may sit just past the
    /// region edge for border chunks.
    fn locate(layout: &Arc<PyramidLayout>, lat: Angle, lon: Angle, zoom: u8) -> Result<ChunkKey> {
        let (origin_lat, origin_lon) = layout.origin();
        let frame = layout.frame_size(zoom);
        let lat_bucket = (lat - origin_lat)
            .floor_div(frame)
            .ok_or_else(|| ChunkError::key_range(format!("zero frame size at zoom {}", zoom)))?;
        let lon_bucket = (lon - origin_lon)
            .floor_div(frame)
            .ok_or_else(|| ChunkError::key_range(format!("zero frame size at zoom {}", zoom)))?;
        Self::from_buckets(layout, lat_bucket, lon_bucket, zoom)
    }

    fn from_buckets(
        layout: &Arc<PyramidLayout>,
        lat_bucket: i64,
        lon_bucket: i64,
        zoom: u8,
    ) -> Result<ChunkKey> {
        let offset = layout.bucket_offset(zoom);
        let key = offset
            .checked_add(lat_bucket)
            .zip(offset.checked_add(lon_bucket))
            .and_then(|(enc_lat, enc_lon)| pack(enc_lat, enc_lon, zoom))
            .ok_or_else(|| {
                ChunkError::key_range(format!(
                    "buckets ({}, {}) at zoom {} overflow the key packing",
                    lat_bucket, lon_bucket, zoom
                ))
            })?;

        let (origin_lat, origin_lon) = layout.origin();
        let frame = layout.frame_size(zoom);
        let corner = |origin: Angle, bucket: i64| -> Option<(Angle, Angle)> {
            let lo = origin.checked_add(frame.checked_mul(bucket)?)?;
            let hi = lo.checked_add(frame)?;
            Some((lo, hi))
        };
        let ((lat_lo, lat_hi), (lon_lo, lon_hi)) = corner(origin_lat, lat_bucket)
            .zip(corner(origin_lon, lon_bucket))
            .ok_or_else(|| {
                ChunkError::key_range(format!(
                    "corners of buckets ({}, {}) at zoom {} overflow",
                    lat_bucket, lon_bucket, zoom
                ))
            })?;
        let pixels = layout.pixel_count(zoom);
        let geometry = ChunkGeometry::new(lat_lo, lon_lo, lat_hi, lon_hi, pixels, pixels)?;

        Ok(ChunkKey {
            layout: Arc::clone(layout),
            zoom,
            key,
            lat_bucket,
            lon_bucket,
            geometry,
        })
    }

    /// Returns the packed key.
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn version(&self) -> u32 {
        self.layout.version()
    }

    pub fn layout(&self) -> &Arc<PyramidLayout> {
        &self.layout
    }

    /// Signed `(lat, lon)` bucket indices relative to the layout origin.
    pub fn buckets(&self) -> (i64, i64) {
        (self.lat_bucket, self.lon_bucket)
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    /// Angular size of this chunk.
    pub fn frame_size(&self) -> Angle {
        self.layout.frame_size(self.zoom)
    }

    /// Half-open containment of a point.
    pub fn contains(&self, lat: Angle, lon: Angle) -> bool {
        self.geometry.contains(lat, lon)
    }

    pub fn center(&self) -> (Angle, Angle) {
        self.geometry.center()
    }

    /// Returns `true` if this chunk lies in the modeled region or on its
    /// closed upper edge. Chunks starting exactly at the north or east edge
    /// hold the points on that edge but no area.
    pub fn touches_region(&self) -> bool {
        let region = self.layout.region();
        self.geometry.lat_lo() <= region.lat_hi
            && self.geometry.lat_hi() > region.lat_lo
            && self.geometry.lon_lo() <= region.lon_hi
            && self.geometry.lon_hi() > region.lon_lo
    }

    /// Returns `true` if this chunk shares a non-zero area with the modeled
    /// region.
    pub fn overlaps_region(&self) -> bool {
        let region = self.layout.region();
        self.geometry.lat_lo() < region.lat_hi
            && self.geometry.lat_hi() > region.lat_lo
            && self.geometry.lon_lo() < region.lon_hi
            && self.geometry.lon_hi() > region.lon_lo
    }

    /// The chunk one zoom level coarser that contains this one, or `None`
    /// at zoom 0.
    pub fn parent(&self) -> Result<Option<ChunkKey>> {
        if self.zoom == 0 {
            return Ok(None);
        }
        let (lat, lon) = self.center();
        Self::locate(&self.layout, lat, lon, self.zoom - 1).map(Some)
    }

    /// The `ratio²` chunks one zoom level finer that tile this one, in
    /// south-to-north, west-to-east order. Empty at [`MAX_ZOOM`].
    pub fn children(&self) -> Result<Vec<ChunkKey>> {
        let Some(ratio) = self.layout.child_ratio(self.zoom) else {
            return Ok(Vec::new());
        };
        let child_zoom = self.zoom + 1;
        let child_frame = self.layout.frame_size(child_zoom);
        let half = child_frame / 2;

        let mut children = Vec::with_capacity((ratio * ratio) as usize);
        for i in 0..ratio {
            let lat = self.geometry.lat_lo() + child_frame * i + half;
            for j in 0..ratio {
                let lon = self.geometry.lon_lo() + child_frame * j + half;
                children.push(Self::locate(&self.layout, lat, lon, child_zoom)?);
            }
        }
        Ok(children)
    }

    /// Blob name for this chunk holding samples of `kind`.
    pub fn filename(&self, kind: &str) -> String {
        filename::chunk_filename(self, kind)
    }
}

fn check_zoom(zoom: u8) -> Result<()> {
    if zoom > MAX_ZOOM {
        return Err(ChunkError::key_range(format!(
            "zoom {} above maximum {}",
            zoom, MAX_ZOOM
        )));
    }
    Ok(())
}

impl PartialEq for ChunkKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.version() == other.version()
    }
}

impl Eq for ChunkKey {}

impl Hash for ChunkKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version().hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkKey")
            .field("version", &self.version())
            .field("zoom", &self.zoom)
            .field("key", &self.key)
            .field("lat_lo", &self.geometry.lat_lo())
            .field("lon_lo", &self.geometry.lon_lo())
            .finish()
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&filename::chunk_stem(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutVersion;
    use std::collections::{HashMap, HashSet};

    fn v1() -> Arc<PyramidLayout> {
        PyramidLayout::standard(LayoutVersion::V1)
    }

    fn deg(d: f64) -> Angle {
        Angle::from_degrees(d)
    }

    #[test]
    fn test_containing_round_trip() {
        let layout = v1();
        let points = [
            (35.3606, 138.7274),
            (-12.3, -77.1),
            (0.0, 0.0),
            (-0.0001, -0.0001),
            (89.9999, 179.9999),
            (-90.0, -180.0),
            (90.0, 180.0),
        ];
        for version in [LayoutVersion::V1, LayoutVersion::V2] {
            let layout = PyramidLayout::standard(version);
            for (lat, lon) in points {
                for zoom in 0..=MAX_ZOOM {
                    let chunk = ChunkKey::from_degrees(&layout, lat, lon, zoom).unwrap();
                    assert!(chunk.contains(deg(lat), deg(lon)), "{:?} {} {}", chunk, lat, lon);

                    let decoded = ChunkKey::from_key(&layout, chunk.key()).unwrap();
                    assert_eq!(decoded, chunk);
                    assert_eq!(decoded.geometry(), chunk.geometry());

                    let (clat, clon) = decoded.center();
                    let again = ChunkKey::locate(&layout, clat, clon, zoom).unwrap();
                    assert_eq!(again.key(), chunk.key());
                }
            }
        }
        assert_eq!(layout.version(), 1);
    }

    #[test]
    fn test_zero_is_a_bucket_boundary() {
        let layout = v1();
        let at_zero = ChunkKey::from_degrees(&layout, 0.0, 0.0, 6).unwrap();
        let below = ChunkKey::from_degrees(&layout, -0.0001, -0.0001, 6).unwrap();
        assert_ne!(at_zero.key(), below.key());
        assert_eq!(at_zero.buckets(), (0, 0));
        assert_eq!(below.buckets(), (-1, -1));
        assert_eq!(below.geometry().lat_lo(), deg(-1.0));
        assert_eq!(below.geometry().lat_hi(), Angle::ZERO);
    }

    #[test]
    fn test_bucketing_is_monotonic() {
        let layout = v1();
        let mut last = i64::MIN;
        for step in -900..900 {
            let lat = step as f64 * 0.1;
            let chunk = ChunkKey::from_degrees(&layout, lat, 0.0, 8).unwrap();
            assert!(chunk.buckets().0 >= last);
            last = chunk.buckets().0;
        }
    }

    #[test]
    fn test_no_collisions() {
        let layout = v1();
        let mut seen: HashMap<i64, ((i64, i64), u8)> = HashMap::new();
        for zoom in [0u8, 1, 5, 6, 7] {
            for lat in (-90..90).step_by(7) {
                for lon in (-180..180).step_by(11) {
                    let chunk =
                        ChunkKey::from_degrees(&layout, lat as f64, lon as f64, zoom).unwrap();
                    let triple = (chunk.buckets(), zoom);
                    let previous = seen.entry(chunk.key()).or_insert(triple);
                    assert_eq!(*previous, triple, "key {} collides", chunk.key());
                }
            }
        }
        assert!(seen.len() > 1000);
    }

    #[test]
    fn test_zoom_in_low_bits() {
        let layout = v1();
        for zoom in 0..=MAX_ZOOM {
            let chunk = ChunkKey::from_degrees(&layout, 10.0, 20.0, zoom).unwrap();
            assert_eq!(chunk.key() % 16, zoom as i64);
        }
    }

    #[test]
    fn test_out_of_range() {
        let layout = v1();
        let err = ChunkKey::from_degrees(&layout, 91.0, 0.0, 3).unwrap_err();
        assert!(matches!(err, ChunkError::KeyRangeExceeded { .. }));
        assert!(ChunkKey::from_degrees(&layout, 0.0, -180.5, 3).is_err());
        assert!(ChunkKey::from_degrees(&layout, f64::NAN, 0.0, 3).is_err());
        assert!(ChunkKey::from_degrees(&layout, 0.0, 0.0, MAX_ZOOM + 1).is_err());
        assert!(ChunkKey::from_key(&layout, -16).is_err());
        assert!(ChunkKey::from_key(&layout, i64::MAX).is_err());
    }

    #[test]
    fn test_children_tile_parent() {
        for version in [LayoutVersion::V1, LayoutVersion::V2] {
            let layout = PyramidLayout::standard(version);
            for zoom in [0u8, 3, 6, 14] {
                let parent = ChunkKey::from_degrees(&layout, -33.9, 151.2, zoom).unwrap();
                let children = parent.children().unwrap();
                let ratio = layout.child_ratio(zoom).unwrap();
                assert_eq!(children.len() as i64, ratio * ratio);

                let distinct: HashSet<i64> = children.iter().map(|c| c.key()).collect();
                assert_eq!(distinct.len(), children.len());

                let area: i128 = children
                    .iter()
                    .map(|c| {
                        c.geometry().lat_delta().ticks() as i128
                            * c.geometry().lon_delta().ticks() as i128
                    })
                    .sum();
                let parent_area = parent.geometry().lat_delta().ticks() as i128
                    * parent.geometry().lon_delta().ticks() as i128;
                assert_eq!(area, parent_area);

                for child in &children {
                    assert_eq!(child.zoom(), zoom + 1);
                    assert!(!child.geometry().is_disjoint(parent.geometry()));
                    assert!(child.geometry().lat_lo() >= parent.geometry().lat_lo());
                    assert!(child.geometry().lon_hi() <= parent.geometry().lon_hi());
                    assert_eq!(child.parent().unwrap(), Some(parent.clone()));
                }
            }
        }
    }

    #[test]
    fn test_bounds_have_no_relatives() {
        let layout = v1();
        let top = ChunkKey::from_degrees(&layout, 1.0, 1.0, 0).unwrap();
        assert_eq!(top.parent().unwrap(), None);
        let leaf = ChunkKey::from_degrees(&layout, 1.0, 1.0, MAX_ZOOM).unwrap();
        assert!(leaf.children().unwrap().is_empty());
    }

    #[test]
    fn test_border_chunk_children() {
        // The zoom 0 chunk [64°, 128°) reaches past the pole.
        let layout = v1();
        let polar = ChunkKey::from_degrees(&layout, 80.0, 10.0, 0).unwrap();
        let children = polar.children().unwrap();
        assert_eq!(children.len(), 4);
        assert_eq!(children.iter().filter(|c| c.touches_region()).count(), 2);
        assert_eq!(children.iter().filter(|c| c.overlaps_region()).count(), 2);
    }

    #[test]
    fn test_edge_chunks_have_no_area() {
        let layout = v1();
        let pole = ChunkKey::from_degrees(&layout, 90.0, 10.0, 5).unwrap();
        assert_eq!(pole.geometry().lat_lo(), deg(90.0));
        assert!(pole.touches_region());
        assert!(!pole.overlaps_region());

        let antimeridian = ChunkKey::from_degrees(&layout, 10.0, 180.0, 5).unwrap();
        assert!(antimeridian.touches_region());
        assert!(!antimeridian.overlaps_region());

        // Zoom 4 chunk [88°, 92°) has two children above the pole
        let polar = ChunkKey::from_degrees(&layout, 89.0, 10.0, 4).unwrap();
        let children = polar.children().unwrap();
        assert_eq!(children.iter().filter(|c| c.touches_region()).count(), 4);
        assert_eq!(children.iter().filter(|c| c.overlaps_region()).count(), 2);
    }

    #[test]
    fn test_from_corner() {
        let layout = v1();
        let chunk = ChunkKey::from_degrees(&layout, 35.4, 138.2, 7).unwrap();
        let g = chunk.geometry();
        let again = ChunkKey::from_corner(&layout, g.lat_lo(), g.lon_lo(), 7).unwrap();
        assert_eq!(again, chunk);
        assert!(ChunkKey::from_corner(&layout, deg(35.1), g.lon_lo(), 7).is_err());
    }
}

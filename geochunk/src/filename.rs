//! Filename utilities.
//!
//! Two naming schemes live here: the blob names of persisted chunks and the
//! SRTM `.hgt` cell names of the raw elevation source.
//!
//! # Chunk names
//!
//! A chunk is named after its lower-left corner and zoom, followed by the
//! layout version and sample kind:
//!
//! ```text
//! N35d30m00s000000E138d00m00s00000007.v1.height
//! └──── latitude ───┘└──── longitude ───┘└┘ └┘ └────┘
//!                                       zoom ver  kind
//! ```
//!
//! Each corner is `{sign}{deg}d{min:02}m{sec:02}s{micro:06}` with `N`/`S` or
//! `E`/`W` for the sign. Degrees are zero-padded to 2 (lat) or 3 (lon)
//! digits but may be wider for border chunks reaching past the poles.
//!
//! # Cell names
//!
//! SRTM files follow `{N|S}{lat}{E|W}{lon}.hgt`, named after the
//! **southwest corner** of the 1° × 1° cell.

use crate::angle::{Angle, TICKS_PER_ARC_MINUTE, TICKS_PER_ARC_SECOND, TICKS_PER_DEGREE};
use crate::key::ChunkKey;

/// A parsed chunk blob name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkName {
    pub lat_lo: Angle,
    pub lon_lo: Angle,
    pub zoom: u8,
    /// Layout version, if the name carried a `.v{n}` suffix.
    pub version: Option<u32>,
    /// Sample kind, if the name carried one.
    pub kind: Option<String>,
}

/// The version-free part of a chunk name: corner and zoom.
pub fn chunk_stem(chunk: &ChunkKey) -> String {
    let geometry = chunk.geometry();
    let mut name = String::with_capacity(40);
    push_angle(&mut name, geometry.lat_lo(), ('N', 'S'), 2);
    push_angle(&mut name, geometry.lon_lo(), ('E', 'W'), 3);
    name.push_str(&format!("{:02}", chunk.zoom()));
    name
}

/// Full blob name of a chunk holding samples of `kind`.
///
/// # Examples
///
/// ```
/// use geochunk::{ChunkKey, LayoutVersion, PyramidLayout};
/// use geochunk::filename::chunk_filename;
///
/// let layout = PyramidLayout::standard(LayoutVersion::V1);
/// let chunk = ChunkKey::from_degrees(&layout, 35.7, 138.2, 7).unwrap();
/// assert_eq!(
///     chunk_filename(&chunk, "height"),
///     "N35d30m00s000000E138d00m00s00000007.v1.height"
/// );
/// ```
pub fn chunk_filename(chunk: &ChunkKey, kind: &str) -> String {
    format!("{}.v{}.{}", chunk_stem(chunk), chunk.version(), kind)
}

fn push_angle(out: &mut String, angle: Angle, signs: (char, char), width: usize) {
    let ticks = angle.ticks();
    out.push(if ticks >= 0 { signs.0 } else { signs.1 });
    let t = ticks.unsigned_abs();
    let degrees = t / TICKS_PER_DEGREE as u64;
    let minutes = t % TICKS_PER_DEGREE as u64 / TICKS_PER_ARC_MINUTE as u64;
    let seconds = t % TICKS_PER_ARC_MINUTE as u64 / TICKS_PER_ARC_SECOND as u64;
    let micros = t % TICKS_PER_ARC_SECOND as u64;
    out.push_str(&format!(
        "{:0width$}d{:02}m{:02}s{:06}",
        degrees,
        minutes,
        seconds,
        micros,
        width = width
    ));
}

/// Parse a chunk blob name.
///
/// Accepts the bare stem, the full name, or either with a leading path.
/// Returns `None` if the name does not follow the convention.
pub fn parse_chunk_filename(filename: &str) -> Option<ChunkName> {
    let name = base_name(filename);
    let (stem, suffix) = match name.split_once('.') {
        Some((stem, suffix)) => (stem, Some(suffix)),
        None => (name, None),
    };

    let (lat_lo, rest) = parse_angle(stem, ('N', 'S'))?;
    let (lon_lo, rest) = parse_angle(rest, ('E', 'W'))?;
    if rest.len() != 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let zoom: u8 = rest.parse().ok()?;

    let (version, kind) = match suffix {
        None => (None, None),
        Some(suffix) => {
            let (version, kind) = match suffix.split_once('.') {
                Some((version, kind)) => (version, Some(kind)),
                None => (suffix, None),
            };
            let version: u32 = version.strip_prefix('v')?.parse().ok()?;
            if kind.is_some_and(str::is_empty) {
                return None;
            }
            (Some(version), kind.map(str::to_string))
        }
    };

    Some(ChunkName {
        lat_lo,
        lon_lo,
        zoom,
        version,
        kind,
    })
}

/// Parse `{sign}{deg}d{mm}m{ss}s{uuuuuu}` off the front of `s`.
fn parse_angle(s: &str, signs: (char, char)) -> Option<(Angle, &str)> {
    let mut chars = s.chars();
    let sign = match chars.next()? {
        c if c == signs.0 => 1,
        c if c == signs.1 => -1,
        _ => return None,
    };
    let rest = chars.as_str();

    let (degrees, rest) = rest.split_once('d')?;
    let (minutes, rest) = split_digits(rest, 2, 'm')?;
    let (seconds, rest) = split_digits(rest, 2, 's')?;
    if rest.len() < 6 || !rest.is_char_boundary(6) {
        return None;
    }
    let (micros, rest) = rest.split_at(6);

    if degrees.is_empty() || !degrees.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !micros.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let degrees: i64 = degrees.parse().ok()?;
    let (minutes, seconds): (i64, i64) = (minutes.parse().ok()?, seconds.parse().ok()?);
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    let micros: i64 = micros.parse().ok()?;

    let magnitude = degrees
        .checked_mul(TICKS_PER_DEGREE)?
        .checked_add(minutes * TICKS_PER_ARC_MINUTE + seconds * TICKS_PER_ARC_SECOND + micros)?;
    Some((Angle::from_ticks(sign * magnitude), rest))
}

fn split_digits(s: &str, width: usize, terminator: char) -> Option<(&str, &str)> {
    if s.len() <= width || !s.is_char_boundary(width) {
        return None;
    }
    let (digits, rest) = s.split_at(width);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rest = rest.strip_prefix(terminator)?;
    Some((digits, rest))
}

fn base_name(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit('\\').next().unwrap_or(name)
}

/// The SRTM `.hgt` filename of the 1° cell containing a point.
///
/// # Examples
///
/// ```
/// use geochunk::filename::hgt_filename;
///
/// assert_eq!(hgt_filename(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(hgt_filename(-12.3, -77.1), "S13W078.hgt");
/// assert_eq!(hgt_filename(0.5, -0.5), "N00W001.hgt");
/// ```
pub fn hgt_filename(lat: f64, lon: f64) -> String {
    hgt_cell_filename(lat.floor() as i32, lon.floor() as i32)
}

/// The SRTM `.hgt` filename of the cell with south-west corner `(lat, lon)`.
pub fn hgt_cell_filename(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };

    format!(
        "{}{:02}{}{:03}.hgt",
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs()
    )
}

/// Parse an SRTM filename into the cell's south-west corner.
///
/// # Examples
///
/// ```
/// use geochunk::filename::parse_hgt_filename;
///
/// assert_eq!(parse_hgt_filename("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(parse_hgt_filename("/path/to/S12W077.hgt"), Some((-12, -77)));
/// assert_eq!(parse_hgt_filename("invalid"), None);
/// ```
pub fn parse_hgt_filename(filename: &str) -> Option<(i32, i32)> {
    let name = base_name(filename);
    let name = name.strip_suffix(".zip").unwrap_or(name);
    let name = name.strip_suffix(".hgt").unwrap_or(name);

    // N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }
    let bytes = name.as_bytes();

    let lat_sign = match bytes[0] {
        b'N' | b'n' => 1,
        b'S' | b's' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;

    let lon_sign = match bytes[3] {
        b'E' | b'e' => 1,
        b'W' | b'w' => -1,
        _ => return None,
    };
    let lon: i32 = name[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}

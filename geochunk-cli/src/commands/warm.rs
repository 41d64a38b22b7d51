use std::time::Instant;

use anyhow::{bail, Context, Result};
use geochunk::{Angle, ChunkKey, PyramidLayout};
use indicatif::{ProgressBar, ProgressStyle};

use super::PyramidArgs;

/// Chunks of `zoom` overlapping the box, clipped to the layout's region.
fn chunks_in_box(
    layout: &std::sync::Arc<PyramidLayout>,
    (min_lat, min_lon, max_lat, max_lon): (f64, f64, f64, f64),
    zoom: u8,
) -> Result<Vec<ChunkKey>> {
    let region = *layout.region();
    let clamp = |v: f64, lo: Angle, hi: Angle| v.clamp(lo.degrees(), hi.degrees());
    let south = clamp(min_lat, region.lat_lo, region.lat_hi);
    let north = clamp(max_lat, region.lat_lo, region.lat_hi);
    let west = clamp(min_lon, region.lon_lo, region.lon_hi);
    let east = clamp(max_lon, region.lon_lo, region.lon_hi);

    let first = ChunkKey::from_degrees(layout, south, west, zoom)?;
    let last = ChunkKey::from_degrees(layout, north, east, zoom)?;
    let (lat_first, lon_first) = first.buckets();
    let (lat_last, lon_last) = last.buckets();

    // Walk corners: border chunks have centres outside the region
    let frame = layout.frame_size(zoom);
    let mut chunks = Vec::new();
    for lat_bucket in lat_first..=lat_last {
        for lon_bucket in lon_first..=lon_last {
            let lat_lo = first.geometry().lat_lo() + frame * (lat_bucket - lat_first);
            let lon_lo = first.geometry().lon_lo() + frame * (lon_bucket - lon_first);
            let chunk = ChunkKey::from_corner(layout, lat_lo, lon_lo, zoom)?;
            if chunk.overlaps_region() {
                chunks.push(chunk);
            }
        }
    }
    Ok(chunks)
}

pub async fn run(args: &PyramidArgs, bounds: (f64, f64, f64, f64), zoom: u8) -> Result<()> {
    let (min_lat, min_lon, max_lat, max_lon) = bounds;
    if min_lat > max_lat || min_lon > max_lon {
        bail!(
            "Invalid bounding box: ({}, {}) to ({}, {})",
            min_lat,
            min_lon,
            max_lat,
            max_lon
        );
    }

    let pyramid = args.open_pyramid()?;
    let chunks = chunks_in_box(pyramid.layout(), bounds, zoom)
        .context("Failed to enumerate chunks in bounding box")?;

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut failed = 0u64;
    for chunk in &chunks {
        if let Err(e) = pyramid.get(chunk).await {
            failed += 1;
            tracing::warn!(chunk = %chunk, error = %e, "Failed to build chunk");
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let stats = pyramid.stats();
    println!();
    println!("Summary:");
    println!("  Chunks requested: {}", chunks.len());
    println!("  Failed: {}", failed);
    println!("  Already persisted: {}", stats.hits);
    println!("  Generated: {}", stats.generated);
    println!("  Aggregated: {}", stats.aggregated);
    println!("  Interpolated: {}", stats.interpolated);
    println!("  Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geochunk::LayoutVersion;

    #[test]
    fn test_chunks_in_box() {
        let layout = PyramidLayout::standard(LayoutVersion::V1);

        // Zoom 6 chunks are 1 degree
        let chunks = chunks_in_box(&layout, (35.2, 138.2, 36.8, 139.9), 6).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.zoom() == 6));

        let single = chunks_in_box(&layout, (35.5, 138.5, 35.5, 138.5), 6).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_chunks_in_box_clamped_to_region() {
        let layout = PyramidLayout::standard(LayoutVersion::V1);
        let chunks = chunks_in_box(&layout, (80.0, 170.0, 120.0, 200.0), 3).unwrap();
        // 8 degree chunks: lat [80, 88) and [88, 96), lon [168, 176) and [176, 184)
        assert_eq!(chunks.len(), 4);

        // 1 degree chunks starting at 90N or 180E hold no area
        let chunks = chunks_in_box(&layout, (89.5, 179.5, 95.0, 185.0), 6).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].geometry().lat_lo(), Angle::from_degrees(89.0));
    }
}

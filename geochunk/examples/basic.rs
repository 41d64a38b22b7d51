//! Basic example: serve elevation chunks from a directory of `.hgt` files.
//!
//! Run with: cargo run --example basic -- /path/to/hgt/files /path/to/chunk/store

use std::env;
use std::sync::Arc;

use geochunk::{
    ChunkError, ChunkPyramid, DiskBlobStore, Height, HgtElevationGenerator, HgtSourceCache,
    LayoutVersion, PyramidLayout,
};

#[tokio::main]
async fn main() -> Result<(), ChunkError> {
    let mut args = env::args().skip(1);
    let (Some(hgt_dir), Some(store_dir)) = (args.next(), args.next()) else {
        eprintln!("Usage: cargo run --example basic -- /path/to/hgt/files /path/to/chunk/store");
        std::process::exit(1);
    };

    // Keep up to 10 source cells mapped
    let cells = Arc::new(HgtSourceCache::new(&hgt_dir, 10));
    let pyramid = ChunkPyramid::<Height>::builder(
        PyramidLayout::standard(LayoutVersion::V1),
        DiskBlobStore::new(&store_dir),
        HgtElevationGenerator::new(cells.clone()),
    )
    .build()?;

    let locations = [
        ("Mount Fuji, Japan", 35.3606, 138.7274),
        ("Mount Everest, Nepal", 27.9881, 86.9250),
        ("Denali, Alaska", 63.0695, -151.0074),
    ];

    println!("Elevation by zoom (source zoom {}):", pyramid.source_zoom());
    println!("{:-<60}", "");

    for (name, lat, lon) in &locations {
        for zoom in [4, 6, 9] {
            match pyramid.sample_at(*lat, *lon, zoom).await {
                Ok(height) => match height.meters() {
                    Some(m) => println!("{} @ z{}: {:.0}m", name, zoom, m),
                    None => println!("{} @ z{}: void", name, zoom),
                },
                Err(e @ ChunkError::UpstreamGeneration { .. }) => {
                    println!("{} @ z{}: source not available locally ({})", name, zoom, e);
                    break;
                }
                Err(e) => println!("{} @ z{}: error - {}", name, zoom, e),
            }
        }
    }

    let stats = pyramid.stats();
    println!("\nPyramid statistics:");
    println!("  Store hits: {}", stats.hits);
    println!("  Generated: {}", stats.generated);
    println!("  Aggregated: {}", stats.aggregated);
    println!("  Interpolated: {}", stats.interpolated);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    let cell_stats = cells.cache_stats();
    println!("  Cached source cells: {}", cell_stats.entry_count);

    Ok(())
}

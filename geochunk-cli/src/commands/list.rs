use std::collections::BTreeMap;

use anyhow::{Context, Result};
use geochunk::filename::parse_chunk_filename;
use geochunk::{ChunkKey, DiskBlobStore, Height, Sample};

use super::PyramidArgs;

pub async fn run(args: &PyramidArgs, zoom: Option<u8>) -> Result<()> {
    let dir = args.store_dir()?;
    let layout = args.pyramid_layout()?;

    if !dir.exists() {
        anyhow::bail!("Store directory does not exist: {}", dir.display());
    }

    let container = format!("{}-v{}", Height::KIND, layout.version());
    let store = DiskBlobStore::new(&dir);
    let names = store
        .list(&container)
        .await
        .context("Failed to read store directory")?;

    let mut per_zoom: BTreeMap<u8, usize> = BTreeMap::new();
    let mut unparsed = 0usize;

    println!("{:<48} {:>4} {:>22}", "CHUNK", "ZOOM", "KEY");
    println!("{}", "-".repeat(76));

    for name in &names {
        let Some(parsed) = parse_chunk_filename(name) else {
            unparsed += 1;
            continue;
        };
        if zoom.is_some_and(|z| z != parsed.zoom) {
            continue;
        }

        let key = ChunkKey::from_corner(&layout, parsed.lat_lo, parsed.lon_lo, parsed.zoom)
            .map(|chunk| chunk.key().to_string())
            .unwrap_or_else(|_| "?".to_string());
        *per_zoom.entry(parsed.zoom).or_default() += 1;

        println!("{:<48} {:>4} {:>22}", name, parsed.zoom, key);
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total chunks: {}", per_zoom.values().sum::<usize>());
    for (z, count) in &per_zoom {
        println!("  Zoom {:>2}: {}", z, count);
    }
    if unparsed > 0 {
        println!("  Unrecognized files: {}", unparsed);
    }
    println!("  Container: {}", dir.join(&container).display());

    Ok(())
}

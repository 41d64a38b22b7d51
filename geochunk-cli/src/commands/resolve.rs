use anyhow::{Context, Result};
use geochunk::{Angle, Height};
use serde::Serialize;

use super::PyramidArgs;

#[derive(Serialize)]
struct ResolveResponse {
    lat: f64,
    lon: f64,
    zoom: u8,
    key: i64,
    filename: String,
    elevation: Option<f32>,
    min: Option<f32>,
    max: Option<f32>,
    mean: Option<f64>,
    void_pixels: usize,
    total_pixels: usize,
}

pub async fn run(args: &PyramidArgs, lat: f64, lon: f64, zoom: u8, json: bool) -> Result<()> {
    let pyramid = args.open_pyramid()?;
    let chunk = pyramid
        .chunk_at(lat, lon, zoom)
        .with_context(|| format!("No chunk contains ({}, {}) at zoom {}", lat, lon, zoom))?;

    let grid = pyramid
        .get(&chunk)
        .await
        .with_context(|| format!("Failed to resolve chunk {}", chunk))?;

    let elevation = grid
        .sample_at(Angle::from_degrees(lat), Angle::from_degrees(lon))
        .and_then(Height::meters);

    let heights: Vec<f32> = grid.samples().iter().filter_map(|h| h.meters()).collect();
    let min = heights.iter().copied().reduce(f32::min);
    let max = heights.iter().copied().reduce(f32::max);
    let mean = if heights.is_empty() {
        None
    } else {
        Some(heights.iter().map(|&h| h as f64).sum::<f64>() / heights.len() as f64)
    };

    let response = ResolveResponse {
        lat,
        lon,
        zoom,
        key: chunk.key(),
        filename: pyramid.filename(&chunk).to_string(),
        elevation,
        min,
        max,
        mean,
        void_pixels: grid.samples().len() - heights.len(),
        total_pixels: grid.samples().len(),
    };

    if json {
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    println!("Chunk:     {} (key {})", response.filename, response.key);
    match response.elevation {
        Some(elev) => println!("Elevation: {:.1}m", elev),
        None => println!("Elevation: void"),
    }
    if let (Some(min), Some(max), Some(mean)) = (min, max, mean) {
        println!("Range:     {:.1}m to {:.1}m (mean {:.1}m)", min, max, mean);
    }
    println!(
        "Void:      {} of {} pixels",
        response.void_pixels, response.total_pixels
    );

    let stats = pyramid.stats();
    println!(
        "Pyramid:   {} hits, {} generated, {} aggregated, {} interpolated",
        stats.hits, stats.generated, stats.aggregated, stats.interpolated
    );

    Ok(())
}

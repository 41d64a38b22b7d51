use anyhow::{Context, Result};
use geochunk::{ChunkKey, Height, Sample};
use serde::Serialize;

use super::PyramidArgs;

#[derive(Serialize)]
pub struct ChunkDescription {
    key: i64,
    zoom: u8,
    layout: u32,
    lat_lo: f64,
    lon_lo: f64,
    lat_hi: f64,
    lon_hi: f64,
    pixels: u32,
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<i64>,
    children: Vec<i64>,
}

impl ChunkDescription {
    pub fn new(chunk: &ChunkKey) -> Result<Self> {
        let geometry = chunk.geometry();
        let parent = chunk.parent().context("Failed to compute parent chunk")?;
        let children = chunk.children().context("Failed to compute child chunks")?;

        Ok(Self {
            key: chunk.key(),
            zoom: chunk.zoom(),
            layout: chunk.version(),
            lat_lo: geometry.lat_lo().degrees(),
            lon_lo: geometry.lon_lo().degrees(),
            lat_hi: geometry.lat_hi().degrees(),
            lon_hi: geometry.lon_hi().degrees(),
            pixels: geometry.lat_steps(),
            filename: chunk.filename(Height::KIND),
            parent: parent.map(|p| p.key()),
            children: children
                .iter()
                .filter(|c| c.overlaps_region())
                .map(ChunkKey::key)
                .collect(),
        })
    }

    pub fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
            return Ok(());
        }

        println!("Key:       {}", self.key);
        println!("Zoom:      {} (layout v{})", self.zoom, self.layout);
        println!("Latitude:  {:.6} to {:.6}", self.lat_lo, self.lat_hi);
        println!("Longitude: {:.6} to {:.6}", self.lon_lo, self.lon_hi);
        println!("Pixels:    {0}x{0}", self.pixels);
        println!("Filename:  {}", self.filename);
        match self.parent {
            Some(parent) => println!("Parent:    {}", parent),
            None => println!("Parent:    none"),
        }
        if self.children.is_empty() {
            println!("Children:  none");
        } else {
            let keys: Vec<String> = self.children.iter().map(i64::to_string).collect();
            println!("Children:  {}", keys.join(", "));
        }
        Ok(())
    }
}

pub fn run(args: &PyramidArgs, lat: f64, lon: f64, zoom: u8, json: bool) -> Result<()> {
    let layout = args.pyramid_layout()?;
    let chunk = ChunkKey::from_degrees(&layout, lat, lon, zoom)
        .with_context(|| format!("No chunk contains ({}, {}) at zoom {}", lat, lon, zoom))?;
    ChunkDescription::new(&chunk)?.print(json)
}

use std::io::Write;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geochunk::{
    decode_grid, encode_grid, ChunkGenerator, ChunkGrid, ChunkKey, ChunkPyramid, FnGenerator,
    GenerateError, Height, HgtElevationGenerator, HgtSourceCache, LayoutVersion,
    MemoryBlobStore, PyramidLayout,
};
use tempfile::TempDir;

const SRTM3_SAMPLES: usize = 1201;
const SRTM3_SIZE: usize = SRTM3_SAMPLES * SRTM3_SAMPLES * 2;

/// Create a synthetic SRTM3 cell with a simple elevation gradient.
fn create_tile(dir: &std::path::Path, filename: &str) {
    let mut data = vec![0u8; SRTM3_SIZE];
    for row in 0..SRTM3_SAMPLES {
        for col in 0..SRTM3_SAMPLES {
            let elev = ((row + col) % 4000) as i16;
            let offset = (row * SRTM3_SAMPLES + col) * 2;
            data[offset..offset + 2].copy_from_slice(&elev.to_be_bytes());
        }
    }
    let path = dir.join(filename);
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&data).unwrap();
}

fn terrain(chunk: &ChunkKey) -> ChunkGrid<Height> {
    ChunkGrid::from_fn(chunk.geometry().clone(), |lat, lon| {
        Height((lat.degrees() * 10.0 + lon.degrees()) as f32)
    })
}

fn bench_key_encoding(c: &mut Criterion) {
    let layout = PyramidLayout::standard(LayoutVersion::V1);

    c.bench_function("key_from_degrees", |b| {
        b.iter(|| {
            black_box(
                ChunkKey::from_degrees(&layout, black_box(35.3606), black_box(138.7274), 11)
                    .unwrap(),
            );
        });
    });

    let key = ChunkKey::from_degrees(&layout, 35.3606, 138.7274, 11)
        .unwrap()
        .key();
    c.bench_function("key_decode", |b| {
        b.iter(|| black_box(ChunkKey::from_key(&layout, black_box(key)).unwrap()));
    });

    let chunk = ChunkKey::from_key(&layout, key).unwrap();
    c.bench_function("key_children_and_parent", |b| {
        b.iter(|| {
            let children = chunk.children().unwrap();
            black_box(children[0].parent().unwrap());
        });
    });
}

fn bench_render_average(c: &mut Criterion) {
    let layout = PyramidLayout::standard(LayoutVersion::V1);
    let parent = ChunkKey::from_degrees(&layout, 35.5, 138.5, 5).unwrap();
    let children: Vec<ChunkGrid<Height>> =
        parent.children().unwrap().iter().map(terrain).collect();
    let sources: Vec<&ChunkGrid<Height>> = children.iter().collect();

    c.bench_function("render_average_4_children_256px", |b| {
        b.iter(|| {
            let mut grid = ChunkGrid::<Height>::new(parent.geometry().clone());
            black_box(grid.render_average(black_box(&sources)));
        });
    });
}

fn bench_record_codec(c: &mut Criterion) {
    let layout = PyramidLayout::standard(LayoutVersion::V1);
    let chunk = ChunkKey::from_degrees(&layout, 35.5, 138.5, 6).unwrap();
    let grid = terrain(&chunk);
    let bytes = encode_grid(&grid);

    c.bench_function("encode_grid_256px", |b| {
        b.iter(|| black_box(encode_grid(black_box(&grid))));
    });
    c.bench_function("decode_grid_256px", |b| {
        b.iter(|| black_box(decode_grid::<Height>(chunk.geometry(), black_box(&bytes)).unwrap()));
    });
}

fn bench_hgt_generation(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    create_tile(tmp.path(), "N35E138.hgt");
    let cells = Arc::new(HgtSourceCache::new(tmp.path(), 4));
    let generator = HgtElevationGenerator::new(cells);
    let layout = PyramidLayout::standard(LayoutVersion::V1);
    let chunk = ChunkKey::from_degrees(&layout, 35.5, 138.5, 6).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();

    // Warm the cell cache
    rt.block_on(generator.generate(&chunk)).unwrap();

    c.bench_function("hgt_generate_256px", |b| {
        b.iter(|| black_box(rt.block_on(generator.generate(&chunk)).unwrap()));
    });
}

fn bench_pyramid_hit(c: &mut Criterion) {
    let generator = FnGenerator::new(
        |chunk: &ChunkKey| -> Result<ChunkGrid<Height>, GenerateError> { Ok(terrain(chunk)) },
    );
    let pyramid = ChunkPyramid::<Height>::builder(
        PyramidLayout::standard(LayoutVersion::V1),
        MemoryBlobStore::new(),
        generator,
    )
    .build()
    .unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let chunk = pyramid.chunk_at(35.5, 138.5, 6).unwrap();

    // Persist once so every iteration is a store hit
    rt.block_on(pyramid.resolve(&chunk)).unwrap();

    c.bench_function("pyramid_resolve_hit", |b| {
        b.iter(|| black_box(rt.block_on(pyramid.resolve(&chunk)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_key_encoding,
    bench_render_average,
    bench_record_codec,
    bench_hgt_generation,
    bench_pyramid_hit,
);
criterion_main!(benches);

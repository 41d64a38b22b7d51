//! The chunk pyramid: persisted lookup with on-miss generation.
//!
//! A [`ChunkPyramid`] serves chunks of one sample type and one layout. On a
//! miss it builds the chunk according to its zoom relative to the source
//! zoom:
//!
//! | Zoom                  | Path                 | Built from                |
//! |-----------------------|----------------------|---------------------------|
//! | `== source_zoom`      | [`resolve`]          | the raw generator         |
//! | `< source_zoom`       | [`resolve`]          | online mean of children   |
//! | `> source_zoom`       | [`resolve_finer`]    | nearest-index upsample    |
//!
//! Every built chunk is written to the blob store before it is returned.
//! Failures anywhere in the recursion fail the whole request and nothing
//! partial is persisted. Concurrent requests for the same chunk share one
//! build through an [`InFlightRegistry`].
//!
//! [`resolve`]: ChunkPyramid::resolve
//! [`resolve_finer`]: ChunkPyramid::resolve_finer

use std::cmp::Ordering as ZoomOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::angle::Angle;
use crate::coalesce::{wait_for, Flight, InFlightRegistry};
use crate::error::{ChunkError, NotFoundReason, Result};
use crate::generator::ChunkGenerator;
use crate::grid::{decode_grid, encode_grid, ChunkGrid};
use crate::key::ChunkKey;
use crate::layout::{PyramidLayout, MAX_ZOOM};
use crate::sample::Sample;
use crate::store::{BlobStore, BoxFuture};

/// Default number of memoized chunk filenames.
pub const DEFAULT_FILENAME_CACHE_SIZE: u64 = 10_000;

/// Default source zoom (1° chunks in layout v1).
pub const DEFAULT_SOURCE_ZOOM: u8 = 6;

/// Which way a missing chunk is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    /// Generate at the source zoom, aggregate children below it.
    Coarser,
    /// Upsample from the parent above the source zoom.
    Finer,
}

type Shared<T> = Result<Arc<ChunkGrid<T>>>;

/// Counters describing how requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PyramidStats {
    /// Chunks read from the blob store.
    pub hits: u64,
    /// Chunks absent from the blob store.
    pub misses: u64,
    /// Chunks produced by the raw generator.
    pub generated: u64,
    /// Chunks built from their children.
    pub aggregated: u64,
    /// Chunks upsampled from their parent.
    pub interpolated: u64,
    /// Requests that joined another caller's build.
    pub coalesced: u64,
}

impl PyramidStats {
    /// Fraction of lookups served from the store (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A persisted multi-resolution pyramid of `T` samples.
pub struct ChunkPyramid<T: Sample> {
    layout: Arc<PyramidLayout>,
    source_zoom: u8,
    container: String,
    store: Arc<dyn BlobStore>,
    generator: Arc<dyn ChunkGenerator<T>>,
    /// Packed key to blob name.
    filenames: Cache<i64, Arc<str>>,
    in_flight: InFlightRegistry<(i64, Direction), Shared<T>>,
    hits: AtomicU64,
    misses: AtomicU64,
    generated: AtomicU64,
    aggregated: AtomicU64,
    interpolated: AtomicU64,
}

impl<T: Sample> ChunkPyramid<T> {
    /// Create a builder.
    pub fn builder(
        layout: Arc<PyramidLayout>,
        store: impl BlobStore + 'static,
        generator: impl ChunkGenerator<T> + 'static,
    ) -> ChunkPyramidBuilder<T> {
        ChunkPyramidBuilder::new(layout, store, generator)
    }

    pub fn layout(&self) -> &Arc<PyramidLayout> {
        &self.layout
    }

    pub fn source_zoom(&self) -> u8 {
        self.source_zoom
    }

    /// Blob container holding this pyramid's records, `{kind}-v{version}`.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Blob name of a chunk. Memoized by packed key.
    pub fn filename(&self, chunk: &ChunkKey) -> Arc<str> {
        self.filenames
            .get_with(chunk.key(), || Arc::from(chunk.filename(T::KIND)))
    }

    /// The chunk of this pyramid's layout containing a point.
    pub fn chunk_at(&self, lat: f64, lon: f64, zoom: u8) -> Result<ChunkKey> {
        ChunkKey::from_degrees(&self.layout, lat, lon, zoom)
    }

    pub fn stats(&self) -> PyramidStats {
        PyramidStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            aggregated: self.aggregated.load(Ordering::Relaxed),
            interpolated: self.interpolated.load(Ordering::Relaxed),
            coalesced: self.in_flight.stats().coalesced_requests,
        }
    }

    /// Number of chunk builds currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.in_flight_count()
    }

    /// Returns `true` if the chunk is already persisted.
    pub async fn exists(&self, chunk: &ChunkKey) -> Result<bool> {
        self.check_layout(chunk)?;
        let name = self.filename(chunk);
        self.store
            .exists(&self.container, &name)
            .await
            .map_err(|e| persistence(&name, e))
    }

    /// Fetch or build a chunk at or below the source zoom.
    ///
    /// # Errors
    ///
    /// - [`ChunkError::NotFound`] if the chunk is finer than the source zoom
    ///   and not already persisted.
    /// - [`ChunkError::UpstreamGeneration`] if the generator fails for this
    ///   chunk or any descendant.
    /// - [`ChunkError::CorruptRecord`] or [`ChunkError::Persistence`] for
    ///   store problems.
    pub async fn resolve(&self, chunk: &ChunkKey) -> Result<Arc<ChunkGrid<T>>> {
        self.check_layout(chunk)?;
        self.load_or_build(chunk.clone(), Direction::Coarser).await
    }

    /// Fetch or build a chunk finer than the source zoom by upsampling its
    /// parent.
    ///
    /// # Errors
    ///
    /// [`ChunkError::NotFound`] if the chunk is at or coarser than the source
    /// zoom and not already persisted. Otherwise as [`ChunkPyramid::resolve`].
    pub async fn resolve_finer(&self, chunk: &ChunkKey) -> Result<Arc<ChunkGrid<T>>> {
        self.check_layout(chunk)?;
        self.load_or_build(chunk.clone(), Direction::Finer).await
    }

    /// Fetch or build any chunk, picking [`resolve`](Self::resolve) or
    /// [`resolve_finer`](Self::resolve_finer) by zoom.
    pub async fn get(&self, chunk: &ChunkKey) -> Result<Arc<ChunkGrid<T>>> {
        self.check_layout(chunk)?;
        self.load_or_build(chunk.clone(), self.direction_for(chunk.zoom()))
            .await
    }

    /// [`ChunkPyramid::get`] that gives up when `token` is cancelled.
    ///
    /// Cancelling drops the whole recursive build: pending child and parent
    /// requests are dropped with it and nothing further is persisted.
    /// Followers of an abandoned build retry on their own.
    pub async fn resolve_cancellable(
        &self,
        chunk: &ChunkKey,
        token: &CancellationToken,
    ) -> Result<Arc<ChunkGrid<T>>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let name = self.filename(chunk);
                debug!(chunk = %name, "Chunk request cancelled");
                Err(ChunkError::Cancelled {
                    chunk: name.to_string(),
                })
            }
            result = self.get(chunk) => result,
        }
    }

    /// Sample at a point, resolving the containing chunk at `zoom`.
    pub async fn sample_at(&self, lat: f64, lon: f64, zoom: u8) -> Result<T> {
        let chunk = self.chunk_at(lat, lon, zoom)?;
        let grid = self.get(&chunk).await?;
        grid.sample_at(Angle::from_degrees(lat), Angle::from_degrees(lon))
            .ok_or_else(|| {
                ChunkError::key_range(format!("({}, {}) not inside chunk {}", lat, lon, chunk))
            })
    }

    fn direction_for(&self, zoom: u8) -> Direction {
        if zoom > self.source_zoom {
            Direction::Finer
        } else {
            Direction::Coarser
        }
    }

    fn check_layout(&self, chunk: &ChunkKey) -> Result<()> {
        if Arc::ptr_eq(chunk.layout(), &self.layout) || **chunk.layout() == *self.layout {
            return Ok(());
        }
        Err(ChunkError::InvalidLayout(format!(
            "chunk {} belongs to layout v{}, pyramid serves v{}",
            chunk,
            chunk.version(),
            self.layout.version()
        )))
    }

    /// Single-flight entry point shared by both directions.
    fn load_or_build(&self, chunk: ChunkKey, direction: Direction) -> BoxFuture<'_, Shared<T>> {
        Box::pin(async move {
            loop {
                match self.in_flight.register((chunk.key(), direction)) {
                    Flight::Leader(guard) => {
                        let result = self.read_or_build(&chunk, direction).await;
                        guard.complete(result.clone());
                        return result;
                    }
                    Flight::Follower(receiver) => {
                        if let Some(result) = wait_for(receiver).await {
                            return result;
                        }
                        // Leader dropped without finishing
                    }
                }
            }
        })
    }

    async fn read_or_build(&self, chunk: &ChunkKey, direction: Direction) -> Shared<T> {
        let name = self.filename(chunk);

        if let Some(grid) = self.read(chunk, &name).await? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(chunk = %name, "Chunk cache hit");
            return Ok(Arc::new(grid));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(chunk = %name, zoom = chunk.zoom(), "Chunk cache miss");

        let grid = match direction {
            Direction::Coarser => self.build_coarser(chunk, &name).await?,
            Direction::Finer => self.build_finer(chunk, &name).await?,
        };
        self.persist(chunk, &name, &grid).await?;
        Ok(Arc::new(grid))
    }

    async fn read(&self, chunk: &ChunkKey, name: &str) -> Result<Option<ChunkGrid<T>>> {
        let bytes = self
            .store
            .try_read(&self.container, name)
            .await
            .map_err(|e| persistence(name, e))?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        decode_grid(chunk.geometry(), &bytes)
            .map(Some)
            .map_err(|source| {
                warn!(chunk = %name, error = %source, "Persisted chunk is corrupt");
                ChunkError::CorruptRecord {
                    chunk: name.to_string(),
                    source,
                }
            })
    }

    async fn build_coarser(&self, chunk: &ChunkKey, name: &str) -> Result<ChunkGrid<T>> {
        match chunk.zoom().cmp(&self.source_zoom) {
            ZoomOrdering::Greater => Err(not_found(name, NotFoundReason::NoSourceData)),
            ZoomOrdering::Equal => self.generate(chunk, name).await,
            ZoomOrdering::Less => self.aggregate(chunk, name).await,
        }
    }

    async fn generate(&self, chunk: &ChunkKey, name: &str) -> Result<ChunkGrid<T>> {
        debug!(chunk = %name, "Generating chunk from raw source");
        let grid = self.generator.generate(chunk).await.map_err(|e| {
            warn!(chunk = %name, error = %e, "Chunk generation failed");
            ChunkError::UpstreamGeneration {
                chunk: name.to_string(),
                message: e.0,
            }
        })?;

        if grid.geometry() != chunk.geometry() {
            let got = grid.geometry();
            return Err(ChunkError::UpstreamGeneration {
                chunk: name.to_string(),
                message: format!(
                    "generator returned a {}x{} grid at ({}, {}), expected {}x{} at ({}, {})",
                    got.lat_steps(),
                    got.lon_steps(),
                    got.lat_lo(),
                    got.lon_lo(),
                    chunk.geometry().lat_steps(),
                    chunk.geometry().lon_steps(),
                    chunk.geometry().lat_lo(),
                    chunk.geometry().lon_lo()
                ),
            });
        }

        self.generated.fetch_add(1, Ordering::Relaxed);
        Ok(grid)
    }

    async fn aggregate(&self, chunk: &ChunkKey, name: &str) -> Result<ChunkGrid<T>> {
        // Border chunks have children with no area inside the modeled region.
        let children: Vec<ChunkKey> = chunk
            .children()?
            .into_iter()
            .filter(ChunkKey::overlaps_region)
            .collect();
        debug!(chunk = %name, children = children.len(), "Aggregating chunk from children");

        let grids = try_join_all(
            children
                .into_iter()
                .map(|child| self.load_or_build(child, Direction::Coarser)),
        )
        .await?;

        let sources: Vec<&ChunkGrid<T>> = grids.iter().map(Arc::as_ref).collect();
        let mut grid = ChunkGrid::new(chunk.geometry().clone());
        grid.render_average(&sources);

        self.aggregated.fetch_add(1, Ordering::Relaxed);
        Ok(grid)
    }

    async fn build_finer(&self, chunk: &ChunkKey, name: &str) -> Result<ChunkGrid<T>> {
        if chunk.zoom() <= self.source_zoom {
            return Err(not_found(name, NotFoundReason::NotFinerThanSource));
        }
        let parent = chunk
            .parent()?
            .ok_or_else(|| not_found(name, NotFoundReason::NoParent))?;
        let direction = self.direction_for(parent.zoom());
        debug!(chunk = %name, parent = %parent, "Upsampling chunk from parent");

        let parent_grid = self.load_or_build(parent, direction).await?;
        let mut grid = ChunkGrid::new(chunk.geometry().clone());
        grid.render_average(&[parent_grid.as_ref()]);

        self.interpolated.fetch_add(1, Ordering::Relaxed);
        Ok(grid)
    }

    async fn persist(&self, chunk: &ChunkKey, name: &str, grid: &ChunkGrid<T>) -> Result<()> {
        let bytes = encode_grid(grid);
        let len = bytes.len();
        self.store
            .write(&self.container, name, bytes)
            .await
            .map_err(|e| {
                warn!(chunk = %name, error = %e, "Failed to persist chunk");
                persistence(name, e)
            })?;
        info!(chunk = %name, zoom = chunk.zoom(), bytes = len, "Persisted chunk");
        Ok(())
    }
}

fn not_found(name: &str, reason: NotFoundReason) -> ChunkError {
    ChunkError::NotFound {
        chunk: name.to_string(),
        reason,
    }
}

fn persistence(name: &str, err: std::io::Error) -> ChunkError {
    ChunkError::Persistence {
        chunk: name.to_string(),
        source: Arc::new(err),
    }
}

/// Builder for [`ChunkPyramid`].
///
/// # Example
///
/// ```
/// use geochunk::{
///     ChunkGrid, ChunkKey, ChunkPyramidBuilder, FnGenerator, GenerateError, Height,
///     LayoutVersion, MemoryBlobStore, PyramidLayout,
/// };
///
/// let generator = FnGenerator::new(
///     |chunk: &ChunkKey| -> Result<ChunkGrid<Height>, GenerateError> {
///         Ok(ChunkGrid::new(chunk.geometry().clone()))
///     },
/// );
/// let pyramid = ChunkPyramidBuilder::<Height>::new(
///     PyramidLayout::standard(LayoutVersion::V1),
///     MemoryBlobStore::new(),
///     generator,
/// )
/// .source_zoom(6)
/// .build()
/// .unwrap();
/// assert_eq!(pyramid.container(), "height-v1");
/// ```
pub struct ChunkPyramidBuilder<T: Sample> {
    layout: Arc<PyramidLayout>,
    store: Arc<dyn BlobStore>,
    generator: Arc<dyn ChunkGenerator<T>>,
    source_zoom: u8,
    filename_cache_size: u64,
}

impl<T: Sample> ChunkPyramidBuilder<T> {
    pub fn new(
        layout: Arc<PyramidLayout>,
        store: impl BlobStore + 'static,
        generator: impl ChunkGenerator<T> + 'static,
    ) -> Self {
        Self {
            layout,
            store: Arc::new(store),
            generator: Arc::new(generator),
            source_zoom: DEFAULT_SOURCE_ZOOM,
            filename_cache_size: DEFAULT_FILENAME_CACHE_SIZE,
        }
    }

    /// Zoom at which the generator supplies raw data. Default is 6.
    pub fn source_zoom(mut self, zoom: u8) -> Self {
        self.source_zoom = zoom;
        self
    }

    /// Maximum memoized filenames. Default is 10,000.
    pub fn filename_cache_size(mut self, size: u64) -> Self {
        self.filename_cache_size = size;
        self
    }

    /// Build the [`ChunkPyramid`].
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidLayout`] if the source zoom is above
    /// [`MAX_ZOOM`].
    pub fn build(self) -> Result<ChunkPyramid<T>> {
        if self.source_zoom > MAX_ZOOM {
            return Err(ChunkError::InvalidLayout(format!(
                "source zoom {} above maximum {}",
                self.source_zoom, MAX_ZOOM
            )));
        }
        let container = format!("{}-v{}", T::KIND, self.layout.version());
        Ok(ChunkPyramid {
            layout: self.layout,
            source_zoom: self.source_zoom,
            container,
            store: self.store,
            generator: self.generator,
            filenames: Cache::builder()
                .max_capacity(self.filename_cache_size)
                .build(),
            in_flight: InFlightRegistry::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generated: AtomicU64::new(0),
            aggregated: AtomicU64::new(0),
            interpolated: AtomicU64::new(0),
        })
    }
}

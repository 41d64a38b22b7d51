//! Raw-data generators.
//!
//! A generator produces the samples of a chunk at the pyramid's source zoom
//! from some external source. Every other zoom is derived from its output.

use std::sync::Arc;

use thiserror::Error;

use crate::error::ChunkError;
use crate::grid::ChunkGrid;
use crate::key::ChunkKey;
use crate::sample::Sample;
use crate::store::BoxFuture;

/// A generator failure, reported to callers as
/// [`ChunkError::UpstreamGeneration`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GenerateError(pub String);

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        GenerateError(message.into())
    }
}

impl From<ChunkError> for GenerateError {
    fn from(err: ChunkError) -> Self {
        GenerateError(err.to_string())
    }
}

impl From<std::io::Error> for GenerateError {
    fn from(err: std::io::Error) -> Self {
        GenerateError(err.to_string())
    }
}

/// Produces raw samples for chunks at the source zoom.
///
/// The returned grid must have exactly the requested chunk's geometry.
pub trait ChunkGenerator<T: Sample>: Send + Sync {
    fn generate<'a>(&'a self, chunk: &'a ChunkKey)
        -> BoxFuture<'a, Result<ChunkGrid<T>, GenerateError>>;
}

impl<T: Sample, G: ChunkGenerator<T> + ?Sized> ChunkGenerator<T> for Arc<G> {
    fn generate<'a>(
        &'a self,
        chunk: &'a ChunkKey,
    ) -> BoxFuture<'a, Result<ChunkGrid<T>, GenerateError>> {
        (**self).generate(chunk)
    }
}

/// Wraps a synchronous closure as a generator.
///
/// # Example
///
/// ```
/// use geochunk::{ChunkGrid, ChunkKey, FnGenerator, GenerateError, Height};
///
/// let flat = FnGenerator::new(
///     |chunk: &ChunkKey| -> Result<ChunkGrid<Height>, GenerateError> {
///         Ok(ChunkGrid::from_fn(chunk.geometry().clone(), |_, _| Height(0.0)))
///     },
/// );
/// # let _ = flat;
/// ```
pub struct FnGenerator<F> {
    f: F,
}

impl<F> FnGenerator<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F> ChunkGenerator<T> for FnGenerator<F>
where
    T: Sample,
    F: Fn(&ChunkKey) -> Result<ChunkGrid<T>, GenerateError> + Send + Sync,
{
    fn generate<'a>(
        &'a self,
        chunk: &'a ChunkKey,
    ) -> BoxFuture<'a, Result<ChunkGrid<T>, GenerateError>> {
        let result = (self.f)(chunk);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutVersion, PyramidLayout};
    use crate::sample::Height;

    #[tokio::test]
    async fn test_fn_generator() {
        let layout = PyramidLayout::standard(LayoutVersion::V2);
        let chunk = ChunkKey::from_degrees(&layout, 12.0, 34.0, 8).unwrap();
        let generator = FnGenerator::new(|chunk: &ChunkKey| -> Result<_, GenerateError> {
            Ok(ChunkGrid::from_fn(chunk.geometry().clone(), |lat, _| {
                Height(lat.degrees() as f32)
            }))
        });

        let grid: ChunkGrid<Height> = generator.generate(&chunk).await.unwrap();
        assert_eq!(grid.geometry(), chunk.geometry());
        assert!(grid.get(0, 0).0 >= 12.0 - 0.125);
    }

    #[tokio::test]
    async fn test_generator_error_through_arc() {
        let generator: Arc<dyn ChunkGenerator<Height>> =
            Arc::new(FnGenerator::new(
                |_: &ChunkKey| -> Result<ChunkGrid<Height>, GenerateError> {
                    Err(GenerateError::new("no data"))
                },
            ));
        let layout = PyramidLayout::standard(LayoutVersion::V1);
        let chunk = ChunkKey::from_degrees(&layout, 0.0, 0.0, 6).unwrap();
        let err = generator.generate(&chunk).await.unwrap_err();
        assert_eq!(err.to_string(), "no data");
    }

    #[test]
    fn test_generate_error_conversions() {
        let err: GenerateError = ChunkError::SourceFileNotFound {
            path: "N35E138.hgt".into(),
        }
        .into();
        assert!(err.0.contains("N35E138.hgt"));

        let err: GenerateError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.0, "disk");
    }
}

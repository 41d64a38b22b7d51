//! Error types for the geochunk library.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::grid::RecordError;

/// Why a chunk could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The chunk is finer than the source zoom and was requested on the
    /// aggregation path, where no raw data exists.
    NoSourceData,
    /// The chunk is at or coarser than the source zoom and was requested on
    /// the upsampling path.
    NotFinerThanSource,
    /// The chunk sits at zoom 0 and has no parent to upsample from.
    NoParent,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoSourceData => write!(f, "no raw data finer than the source zoom"),
            NotFoundReason::NotFinerThanSource => {
                write!(f, "upsampling requested at or below the source zoom")
            }
            NotFoundReason::NoParent => write!(f, "zoom 0 has no parent chunk"),
        }
    }
}

/// The pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Building or decoding a chunk key.
    KeyEncoding,
    /// Deciding how to build a missing chunk.
    Lookup,
    /// The external raw-data generator.
    Generation,
    /// Blob store reads and writes.
    Persistence,
    /// Decoding a persisted record.
    Decode,
    /// The caller gave up on the request.
    Cancellation,
    /// Raw source files (`.hgt` cells).
    Source,
    /// Static configuration (layouts, geometry).
    Configuration,
}

/// Errors that can occur while building or serving chunks.
///
/// The type is `Clone` so that a single failure can be handed to every
/// caller waiting on the same chunk.
#[derive(Error, Debug, Clone)]
pub enum ChunkError {
    /// No persisted record exists and there is no way to build one.
    #[error("chunk {chunk} not found: {reason}")]
    NotFound {
        chunk: String,
        reason: NotFoundReason,
    },

    /// The raw-data generator failed. Nothing was persisted.
    #[error("generation of chunk {chunk} failed: {message}")]
    UpstreamGeneration { chunk: String, message: String },

    /// A persisted record could not be decoded.
    #[error("persisted chunk {chunk} is corrupt: {source}")]
    CorruptRecord {
        chunk: String,
        #[source]
        source: RecordError,
    },

    /// A coordinate, zoom or bucket index falls outside what the key packing
    /// can represent.
    #[error("key range exceeded: {detail}")]
    KeyRangeExceeded { detail: String },

    /// The blob store failed to read or write a record.
    #[error("blob store failure for chunk {chunk}: {source}")]
    Persistence {
        chunk: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A frame-size table violates the nesting rules.
    #[error("invalid pyramid layout: {0}")]
    InvalidLayout(String),

    /// A chunk geometry violates its invariants.
    #[error("invalid chunk geometry: {0}")]
    InvalidGeometry(String),

    /// The request was cancelled before it completed.
    #[error("resolution of chunk {chunk} was cancelled")]
    Cancelled { chunk: String },

    /// IO error when reading raw source files.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// A raw `.hgt` file has a size that matches neither SRTM1 nor SRTM3.
    #[error("Invalid source file size: {size} bytes in {path} (expected 25934402 for SRTM1 or 2884802 for SRTM3)")]
    InvalidSourceFile { path: PathBuf, size: usize },

    /// The required raw `.hgt` file was not found.
    #[error("source file not found: {path}")]
    SourceFileNotFound { path: PathBuf },
}

impl From<std::io::Error> for ChunkError {
    fn from(err: std::io::Error) -> Self {
        ChunkError::Io(Arc::new(err))
    }
}

impl ChunkError {
    pub(crate) fn key_range(detail: impl Into<String>) -> Self {
        ChunkError::KeyRangeExceeded {
            detail: detail.into(),
        }
    }

    /// Returns the stage this error originated from.
    pub fn stage(&self) -> Stage {
        match self {
            ChunkError::NotFound { .. } => Stage::Lookup,
            ChunkError::UpstreamGeneration { .. } => Stage::Generation,
            ChunkError::CorruptRecord { .. } => Stage::Decode,
            ChunkError::KeyRangeExceeded { .. } => Stage::KeyEncoding,
            ChunkError::Persistence { .. } => Stage::Persistence,
            ChunkError::InvalidLayout(_) | ChunkError::InvalidGeometry(_) => Stage::Configuration,
            ChunkError::Cancelled { .. } => Stage::Cancellation,
            ChunkError::Io(_)
            | ChunkError::InvalidSourceFile { .. }
            | ChunkError::SourceFileNotFound { .. } => Stage::Source,
        }
    }

    /// Returns the chunk filename this error refers to, if any.
    pub fn chunk(&self) -> Option<&str> {
        match self {
            ChunkError::NotFound { chunk, .. }
            | ChunkError::UpstreamGeneration { chunk, .. }
            | ChunkError::CorruptRecord { chunk, .. }
            | ChunkError::Persistence { chunk, .. }
            | ChunkError::Cancelled { chunk } => Some(chunk),
            _ => None,
        }
    }
}

/// Result type alias using [`ChunkError`].
pub type Result<T> = std::result::Result<T, ChunkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChunkError::NotFound {
            chunk: "N00d00m00s000000E000d00m00s00000007.v1.height".to_string(),
            reason: NotFoundReason::NoSourceData,
        };
        assert!(err.to_string().contains("N00d00m00s000000"));
        assert!(err.to_string().contains("no raw data"));

        let err = ChunkError::key_range("latitude 91 outside region");
        assert!(err.to_string().contains("91"));

        let err = ChunkError::SourceFileNotFound {
            path: PathBuf::from("N35E138.hgt"),
        };
        assert!(err.to_string().contains("N35E138.hgt"));
    }

    #[test]
    fn test_error_stage() {
        let err = ChunkError::UpstreamGeneration {
            chunk: "c".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.stage(), Stage::Generation);
        assert_eq!(err.chunk(), Some("c"));

        let err = ChunkError::key_range("overflow");
        assert_eq!(err.stage(), Stage::KeyEncoding);
        assert_eq!(err.chunk(), None);

        let err: ChunkError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.stage(), Stage::Source);
    }

    #[test]
    fn test_error_is_clone() {
        let err = ChunkError::Persistence {
            chunk: "c".to_string(),
            source: Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "full")),
        };
        let copy = err.clone();
        assert_eq!(copy.to_string(), err.to_string());
    }
}

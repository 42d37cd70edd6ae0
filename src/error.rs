use std::fmt::Debug;
use thiserror::Error;

use tiff::tags::CompressionMethod;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CogWindowError {
    /// General error.
    #[error("General error: {0}")]
    General(String),

    /// Invalid reader configuration. Raised before any I/O happens.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The requested overview level does not exist.
    #[error("Overview level {level} does not exist ({available} levels available)")]
    InvalidOverviewLevel { level: usize, available: usize },

    /// The storage collaborator could not deliver a byte range.
    #[error("Failed to fetch bytes {start}-{end} from {location}: {source}")]
    Fetch {
        location: String,
        start: u64,
        end: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A tile could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported compression {0:?}")]
    UnsupportedCompression(CompressionMethod),

    /// A decoded tile (or mask) does not have the expected dimensions.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The requested bounds do not intersect the image.
    #[error("Partial read is outside bounds of the image")]
    OutOfBounds,

    #[error("Tile {x} {y} does not exist at overview level {z}")]
    TileNotFound { x: i64, y: i64, z: usize },

    #[error("Unsupported storage scheme: {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    InvalidPath(#[from] object_store::path::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Jpeg(#[from] jpeg::Error),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    /// A background decode task panicked or was cancelled.
    #[error("Decode task failed: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, CogWindowError>;

pub mod affine;
mod cog;
mod compression;
pub mod config;
mod decoder;
pub mod error;
pub mod geometry;
mod header;
pub mod ifd;
pub mod mosaic;
pub mod overview;
pub mod partial_reads;
pub mod postprocess;
pub mod resample;
pub mod sample;
pub mod source;

#[cfg(test)]
mod testing;

pub use cog::{COGReader, PartialRead};
pub use config::{ReaderConfig, ZoomLevelStrategy};
pub use decoder::TileEncoding;
pub use error::{CogWindowError, Result};
pub use geometry::{Bounds, OutputShape, TileMetadata};
pub use header::CogHeader;
pub use mosaic::MaskedArray;
pub use resample::ResampleMethod;
pub use source::{CachedRangeReader, ObjectStoreReader, RangeReader, RequestStats};

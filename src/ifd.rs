use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use ndarray::{Array2, Array3};
use tiff::tags::CompressionMethod;

use crate::decoder::{decode_mask, decode_tile, TileEncoding};
use crate::error::{CogWindowError, Result};
use crate::sample::Sample;

/// Byte location of every tile of one directory (`TileOffsets` + `TileByteCounts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOffsets {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    grid_width: usize,
    grid_height: usize,
}

impl TileOffsets {
    pub fn try_new(
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
        grid_width: usize,
        grid_height: usize,
    ) -> Result<Self> {
        let expected = grid_width * grid_height;
        if offsets.len() != expected || byte_counts.len() != expected {
            return Err(CogWindowError::ShapeMismatch {
                expected: vec![expected, expected],
                actual: vec![offsets.len(), byte_counts.len()],
            });
        }
        Ok(Self {
            offsets,
            byte_counts,
            grid_width,
            grid_height,
        })
    }

    /// Number of tiles per row.
    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    /// Number of tile rows.
    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    /// Whether a tile coordinate lies inside the grid.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.grid_width && (y as usize) < self.grid_height
    }

    /// Flat tile index of the tile at column `x`, row `y`.
    pub fn tile_index(&self, x: usize, y: usize) -> usize {
        y * self.grid_width + x
    }

    pub fn offset(&self, index: usize) -> Result<u64> {
        self.offsets
            .get(index)
            .copied()
            .ok_or_else(|| self.missing(index))
    }

    pub fn byte_count(&self, index: usize) -> Result<u64> {
        self.byte_counts
            .get(index)
            .copied()
            .ok_or_else(|| self.missing(index))
    }

    /// `(start, length_minus_one)` of a single tile.
    pub fn range(&self, index: usize) -> Result<(u64, u64)> {
        let start = self.offset(index)?;
        let count = self.byte_count(index)?;
        if count == 0 {
            return Err(CogWindowError::Decode(format!("tile {index} has no bytes")));
        }
        Ok((start, count - 1))
    }

    /// `(start, length_minus_one)` of one request spanning tiles `first..=last`.
    pub fn merged_range(&self, first: usize, last: usize) -> Result<(u64, u64)> {
        let start = self.offset(first)?;
        let end = self.offset(last)? + self.byte_count(last)?;
        if end <= start {
            return Err(CogWindowError::Decode(format!(
                "tiles {first}..={last} are not laid out in increasing byte order"
            )));
        }
        Ok((start, end - start - 1))
    }

    /// Slice one tile out of a merged response that starts at byte `row_start`.
    pub fn extract(&self, merged: &Bytes, index: usize, row_start: u64) -> Result<Bytes> {
        let offset = self.offset(index)?;
        let count = self.byte_count(index)? as usize;
        let start = offset.checked_sub(row_start).ok_or_else(|| {
            CogWindowError::Decode(format!("tile {index} starts before the merged range"))
        })? as usize;
        if start + count > merged.len() {
            return Err(CogWindowError::Decode(format!(
                "tile {index} ({start}+{count}) runs past the merged range ({} bytes)",
                merged.len()
            )));
        }
        Ok(merged.slice(start..start + count))
    }

    fn missing(&self, index: usize) -> CogWindowError {
        CogWindowError::Decode(format!(
            "tile index {index} outside of {}x{} tile grid",
            self.grid_width, self.grid_height
        ))
    }
}

/// An image directory: where the tiles of one resolution level live and how to decode them.
pub trait TileDirectory: Send + Sync {
    type Sample: Sample;

    fn image_width(&self) -> usize;
    fn image_height(&self) -> usize;
    fn tile_width(&self) -> usize;
    fn tile_height(&self) -> usize;
    fn bands(&self) -> usize;
    fn tiles(&self) -> &TileOffsets;

    /// Decode the bytes of one tile into a `(bands, tile_height, tile_width)` array.
    fn decode_tile(&self, bytes: Bytes) -> Result<Array3<Self::Sample>>;
}

/// The internal mask directory that accompanies an image directory.
pub trait MaskDirectory: Send + Sync {
    fn tile_width(&self) -> usize;
    fn tile_height(&self) -> usize;
    fn tiles(&self) -> &TileOffsets;

    /// Decode one mask tile; `true` marks a pixel that is masked out.
    fn decode_mask_tile(&self, bytes: Bytes) -> Result<Array2<bool>>;
}

/// An ImageFileDirectory representing Image content
#[derive(Debug, Clone)]
pub struct ImageIFD<T> {
    image_width: usize,
    image_height: usize,
    tile_width: usize,
    tile_height: usize,
    bands: usize,
    encoding: TileEncoding,
    tiles: TileOffsets,
    sample: PhantomData<T>,
}

impl<T: Sample> ImageIFD<T> {
    pub fn new(
        image_size: (usize, usize),
        tile_size: (usize, usize),
        bands: usize,
        tiles: TileOffsets,
    ) -> Self {
        Self {
            image_width: image_size.0,
            image_height: image_size.1,
            tile_width: tile_size.0,
            tile_height: tile_size.1,
            bands,
            encoding: TileEncoding::default(),
            tiles,
            sample: PhantomData,
        }
    }

    pub fn with_encoding(mut self, encoding: TileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn encoding(&self) -> &TileEncoding {
        &self.encoding
    }
}

impl<T: Sample> TileDirectory for ImageIFD<T> {
    type Sample = T;

    fn image_width(&self) -> usize {
        self.image_width
    }

    fn image_height(&self) -> usize {
        self.image_height
    }

    fn tile_width(&self) -> usize {
        self.tile_width
    }

    fn tile_height(&self) -> usize {
        self.tile_height
    }

    fn bands(&self) -> usize {
        self.bands
    }

    fn tiles(&self) -> &TileOffsets {
        &self.tiles
    }

    fn decode_tile(&self, bytes: Bytes) -> Result<Array3<T>> {
        decode_tile(
            bytes,
            &self.encoding,
            self.bands,
            self.tile_width,
            self.tile_height,
        )
    }
}

/// An ImageFileDirectory representing Mask content
#[derive(Debug, Clone)]
pub struct MaskIFD {
    tile_width: usize,
    tile_height: usize,
    compression: CompressionMethod,
    tiles: TileOffsets,
}

impl MaskIFD {
    pub fn new(
        tile_size: (usize, usize),
        compression: CompressionMethod,
        tiles: TileOffsets,
    ) -> Self {
        Self {
            tile_width: tile_size.0,
            tile_height: tile_size.1,
            compression,
            tiles,
        }
    }
}

impl MaskDirectory for MaskIFD {
    fn tile_width(&self) -> usize {
        self.tile_width
    }

    fn tile_height(&self) -> usize {
        self.tile_height
    }

    fn tiles(&self) -> &TileOffsets {
        &self.tiles
    }

    fn decode_mask_tile(&self, bytes: Bytes) -> Result<Array2<bool>> {
        decode_mask(bytes, self.compression, self.tile_width, self.tile_height)
    }
}

pub type SharedTileDirectory<T> = Arc<dyn TileDirectory<Sample = T>>;
pub type SharedMaskDirectory = Arc<dyn MaskDirectory>;

/// A collection of all the IFD
///
/// Image directories are ordered from the native resolution (level 0) to the
/// coarsest overview. When the image carries an internal mask there is exactly
/// one mask directory per image directory.
#[derive(Clone)]
pub struct ImageFileDirectories<T> {
    image_ifds: Vec<SharedTileDirectory<T>>,
    mask_ifds: Option<Vec<SharedMaskDirectory>>,
}

impl<T: Sample> ImageFileDirectories<T> {
    pub fn try_new(
        image_ifds: Vec<SharedTileDirectory<T>>,
        mask_ifds: Option<Vec<SharedMaskDirectory>>,
    ) -> Result<Self> {
        if image_ifds.is_empty() {
            return Err(CogWindowError::Config(
                "an image needs at least one image directory".to_string(),
            ));
        }
        let mask_ifds = mask_ifds.filter(|masks| !masks.is_empty());
        if let Some(masks) = &mask_ifds {
            if masks.len() != image_ifds.len() {
                return Err(CogWindowError::Config(format!(
                    "{} mask directories for {} image directories",
                    masks.len(),
                    image_ifds.len()
                )));
            }
            for (level, (image, mask)) in image_ifds.iter().zip(masks).enumerate() {
                if image.tiles().grid_width() != mask.tiles().grid_width()
                    || image.tiles().grid_height() != mask.tiles().grid_height()
                    || image.tile_width() != mask.tile_width()
                    || image.tile_height() != mask.tile_height()
                {
                    return Err(CogWindowError::Config(format!(
                        "mask directory at level {level} does not match its image tiling"
                    )));
                }
            }
        }
        Ok(Self {
            image_ifds,
            mask_ifds,
        })
    }

    /// Number of resolution levels, native included.
    pub fn len(&self) -> usize {
        self.image_ifds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_ifds.is_empty()
    }

    pub fn is_masked(&self) -> bool {
        self.mask_ifds.is_some()
    }

    pub fn image(&self, level: usize) -> Result<&SharedTileDirectory<T>> {
        self.image_ifds
            .get(level)
            .ok_or(CogWindowError::InvalidOverviewLevel {
                level,
                available: self.image_ifds.len(),
            })
    }

    pub fn mask(&self, level: usize) -> Result<Option<&SharedMaskDirectory>> {
        match &self.mask_ifds {
            Some(masks) => masks
                .get(level)
                .map(Some)
                .ok_or(CogWindowError::InvalidOverviewLevel {
                    level,
                    available: masks.len(),
                }),
            None => Ok(None),
        }
    }

    pub fn images(&self) -> &[SharedTileDirectory<T>] {
        &self.image_ifds
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn offsets() -> TileOffsets {
        // 3x2 grid, tiles laid out row-major with varying sizes
        TileOffsets::try_new(
            vec![100, 110, 125, 130, 150, 151],
            vec![10, 15, 5, 20, 1, 9],
            3,
            2,
        )
        .unwrap()
    }

    #[test]
    fn rejects_wrong_table_length() {
        let err = TileOffsets::try_new(vec![0, 1], vec![1, 1, 1], 3, 1).unwrap_err();
        assert!(matches!(err, CogWindowError::ShapeMismatch { .. }));
    }

    #[test]
    fn single_tile_range() {
        let tiles = offsets();
        assert_eq!(tiles.tile_index(1, 1), 4);
        assert_eq!(tiles.range(1).unwrap(), (110, 14));
        assert!(tiles.range(6).is_err());
    }

    #[test]
    fn merged_range_spans_the_row() {
        let tiles = offsets();
        // row 0: 100..=129
        assert_eq!(tiles.merged_range(0, 2).unwrap(), (100, 29));
        // row 1, last two tiles: 150..=159
        assert_eq!(tiles.merged_range(4, 5).unwrap(), (150, 9));
        assert_eq!(tiles.merged_range(3, 3).unwrap(), tiles.range(3).unwrap());
    }

    #[test]
    fn extracts_tiles_from_merged_bytes() {
        let tiles = offsets();
        let merged = Bytes::from((100u8..130).collect::<Vec<_>>());
        let first = (100u8..110).collect::<Vec<_>>();
        let second = (110u8..125).collect::<Vec<_>>();
        assert_eq!(tiles.extract(&merged, 0, 100).unwrap().as_ref(), &first[..]);
        assert_eq!(tiles.extract(&merged, 1, 100).unwrap().as_ref(), &second[..]);
        assert_eq!(tiles.extract(&merged, 2, 100).unwrap().as_ref(), &[125, 126, 127, 128, 129]);
        assert!(tiles.extract(&merged, 3, 100).is_err());
    }

    #[test]
    fn grid_membership() {
        let tiles = offsets();
        assert!(tiles.contains(2, 1));
        assert!(!tiles.contains(3, 1));
        assert!(!tiles.contains(-1, 0));
        assert!(!tiles.contains(0, 2));
    }

    #[test]
    fn mask_count_must_match_images() {
        let image: SharedTileDirectory<u8> =
            Arc::new(ImageIFD::<u8>::new((3, 2), (1, 1), 1, offsets()));
        let mask: SharedMaskDirectory =
            Arc::new(MaskIFD::new((1, 1), CompressionMethod::None, offsets()));
        assert!(
            ImageFileDirectories::try_new(vec![image.clone()], Some(vec![mask.clone()])).is_ok()
        );
        let err = ImageFileDirectories::try_new(vec![image.clone(), image], Some(vec![mask]))
            .err()
            .unwrap();
        assert!(matches!(err, CogWindowError::Config(_)));
        assert!(ImageFileDirectories::<u8>::try_new(vec![], None).is_err());
    }

    #[test]
    fn unknown_level_is_invalid_overview() {
        let image: SharedTileDirectory<u8> =
            Arc::new(ImageIFD::<u8>::new((3, 2), (1, 1), 1, offsets()));
        let ifds = ImageFileDirectories::try_new(vec![image], None).unwrap();
        assert!(ifds.image(0).is_ok());
        assert!(matches!(
            ifds.image(1),
            Err(CogWindowError::InvalidOverviewLevel { level: 1, available: 1 })
        ));
        assert!(ifds.mask(0).unwrap().is_none());
    }
}

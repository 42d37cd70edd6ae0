use ndarray::{s, Array3};

use crate::error::{CogWindowError, Result};
use crate::geometry::TileMetadata;
use crate::sample::Sample;

/// Pixel values plus an optional validity mask of the same shape (`true` = valid).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedArray<T> {
    pub data: Array3<T>,
    pub mask: Option<Array3<bool>>,
}

impl<T> MaskedArray<T> {
    pub fn new(data: Array3<T>, mask: Option<Array3<bool>>) -> Result<Self> {
        if let Some(mask) = &mask {
            if mask.dim() != data.dim() {
                return Err(CogWindowError::ShapeMismatch {
                    expected: data.shape().to_vec(),
                    actual: mask.shape().to_vec(),
                });
            }
        }
        Ok(Self { data, mask })
    }

    /// `(bands, rows, cols)`
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
}

/// The fused buffer covering every tile of a partial read.
///
/// Each tile owns a disjoint slot addressed by its position in the tile range,
/// so tiles can be stitched in any order.
#[derive(Debug)]
pub struct Mosaic<T> {
    data: Array3<T>,
    mask: Option<Array3<bool>>,
    tile_width: usize,
    tile_height: usize,
    tiles_wide: usize,
    tiles_high: usize,
}

impl<T: Sample> Mosaic<T> {
    /// A zeroed buffer; the mask, when requested, starts out all valid.
    pub fn new(meta: &TileMetadata, with_mask: bool) -> Self {
        let shape = meta.mosaic_shape();
        Self {
            data: Array3::from_elem(shape, T::default()),
            mask: with_mask.then(|| Array3::from_elem(shape, true)),
            tile_width: meta.tile_width,
            tile_height: meta.tile_height,
            tiles_wide: meta.tiles_wide(),
            tiles_high: meta.tiles_high(),
        }
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array3<bool>> {
        self.mask.as_ref()
    }

    /// Write a decoded tile into slot `(grid_x, grid_y)`.
    ///
    /// The tile's mask overwrites the slot's mask when both are present.
    pub fn stitch(&mut self, tile: MaskedArray<T>, grid_x: usize, grid_y: usize) -> Result<()> {
        let expected = (self.data.dim().0, self.tile_height, self.tile_width);
        if tile.data.dim() != expected {
            return Err(CogWindowError::ShapeMismatch {
                expected: vec![expected.0, expected.1, expected.2],
                actual: tile.data.shape().to_vec(),
            });
        }
        let (rows, cols) = self.slot(grid_x, grid_y)?;
        self.data.slice_mut(s![.., rows.0..rows.1, cols.0..cols.1]).assign(&tile.data);
        if let (Some(mask), Some(tile_mask)) = (self.mask.as_mut(), tile.mask.as_ref()) {
            if tile_mask.dim() != expected {
                return Err(CogWindowError::ShapeMismatch {
                    expected: vec![expected.0, expected.1, expected.2],
                    actual: tile_mask.shape().to_vec(),
                });
            }
            mask.slice_mut(s![.., rows.0..rows.1, cols.0..cols.1]).assign(tile_mask);
        }
        Ok(())
    }

    /// Mark slot `(grid_x, grid_y)` as holding no data.
    pub fn invalidate(&mut self, grid_x: usize, grid_y: usize) -> Result<()> {
        let (rows, cols) = self.slot(grid_x, grid_y)?;
        if let Some(mask) = self.mask.as_mut() {
            mask.slice_mut(s![.., rows.0..rows.1, cols.0..cols.1]).fill(false);
        }
        Ok(())
    }

    pub fn into_inner(self) -> MaskedArray<T> {
        MaskedArray {
            data: self.data,
            mask: self.mask,
        }
    }

    fn slot(&self, grid_x: usize, grid_y: usize) -> Result<((usize, usize), (usize, usize))> {
        if grid_x >= self.tiles_wide || grid_y >= self.tiles_high {
            return Err(CogWindowError::General(format!(
                "slot ({grid_x}, {grid_y}) outside of {}x{} tile range",
                self.tiles_wide, self.tiles_high
            )));
        }
        Ok((
            (grid_y * self.tile_height, (grid_y + 1) * self.tile_height),
            (grid_x * self.tile_width, (grid_x + 1) * self.tile_width),
        ))
    }
}

use crate::affine::AffineTransform;
use crate::error::{CogWindowError, Result};
use crate::sample::DataType;

/// Snaps pixel coordinates that land a hair short of a tile edge onto that edge.
const TILE_EDGE_EPSILON: f64 = 1e-6;

/// A world-space bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Whether two boxes overlap. Boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        other.left < self.right
            && other.right > self.left
            && other.top > self.bottom
            && other.bottom < self.top
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Requested output size of a partial read, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub width: usize,
    pub height: usize,
}

impl OutputShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Assortment of metadata for a particular partial read
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetadata {
    /// top left corner of the partial read, relative to the fused tile buffer
    pub origin_x: usize,
    pub origin_y: usize,
    /// width and height of the partial read (# of pixels)
    pub width: usize,
    pub height: usize,
    /// width and height of each block (# of pixels)
    pub tile_width: usize,
    pub tile_height: usize,
    /// inclusive range of internal x/y blocks which intersect the partial read
    pub xmin: i64,
    pub xmax: i64,
    pub ymin: i64,
    pub ymax: i64,
    /// expected number of bands
    pub bands: usize,
    pub dtype: DataType,
    /// overview level (where 0 is source)
    pub overview_level: usize,
    /// pixel-center world coordinates of the partial read's columns and rows
    pub x_coord: Vec<f64>,
    pub y_coord: Vec<f64>,
}

impl TileMetadata {
    /// Work out which tiles of an overview level cover `bounds`, and where the
    /// requested window sits inside the fused tile buffer.
    pub fn compute(
        bounds: &Bounds,
        geotransform: &AffineTransform,
        tile_size: (usize, usize),
        bands: usize,
        dtype: DataType,
        overview_level: usize,
    ) -> Result<Self> {
        let (tile_width, tile_height) = tile_size;
        if tile_width == 0 || tile_height == 0 {
            return Err(CogWindowError::Config(format!(
                "invalid tile size {tile_width}x{tile_height}"
            )));
        }
        let inverse = geotransform.inverse().ok_or_else(|| {
            CogWindowError::Config(format!("geotransform {geotransform:?} is not invertible"))
        })?;

        // request bounds in pixel coordinates of the overview
        let (tlx, tly) = inverse.apply(bounds.left, bounds.top);
        let (brx, bry) = inverse.apply(bounds.right, bounds.bottom);

        let tile_index =
            |pixel: f64, size: usize| ((pixel + TILE_EDGE_EPSILON) / size as f64).floor() as i64;
        let xmin = tile_index(tlx, tile_width);
        let xmax = tile_index(brx, tile_width);
        let ymin = tile_index(tly, tile_height);
        let ymax = tile_index(bry, tile_height);
        if xmax < xmin || ymax < ymin {
            return Err(CogWindowError::OutOfBounds);
        }

        // geotransform of the fused tile buffer
        let (fused_x, fused_y) = geotransform.apply(
            (xmin * tile_width as i64) as f64,
            (ymin * tile_height as i64) as f64,
        );
        let fused = geotransform.with_origin(fused_x, fused_y);
        let fused_inverse = fused.inverse().ok_or_else(|| {
            CogWindowError::Config(format!("geotransform {fused:?} is not invertible"))
        })?;
        let (origin_x, origin_y) = fused_inverse.apply(bounds.left, bounds.top);
        let origin_x = origin_x.round().max(0.0) as usize;
        let origin_y = origin_y.round().max(0.0) as usize;

        let width = (brx - tlx).round().max(0.0) as usize;
        let height = (bry - tly).round().max(0.0) as usize;

        let x_coord = (0..width)
            .map(|q| fused_x + (origin_x as f64 + 0.5 + q as f64) * geotransform.a())
            .collect();
        let y_coord = (0..height)
            .map(|q| fused_y + (origin_y as f64 + 0.5 + q as f64) * geotransform.e())
            .collect();

        Ok(Self {
            origin_x,
            origin_y,
            width,
            height,
            tile_width,
            tile_height,
            xmin,
            xmax,
            ymin,
            ymax,
            bands,
            dtype,
            overview_level,
            x_coord,
            y_coord,
        })
    }

    /// Number of tile columns in the fused buffer.
    pub fn tiles_wide(&self) -> usize {
        (self.xmax - self.xmin + 1) as usize
    }

    /// Number of tile rows in the fused buffer.
    pub fn tiles_high(&self) -> usize {
        (self.ymax - self.ymin + 1) as usize
    }

    /// `(bands, rows, cols)` of the fused buffer.
    pub fn mosaic_shape(&self) -> (usize, usize, usize) {
        (
            self.bands,
            self.tiles_high() * self.tile_height,
            self.tiles_wide() * self.tile_width,
        )
    }

    /// Every tile of the range as `(tile_x, tile_y, grid_x, grid_y)`, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = (i64, i64, usize, usize)> + '_ {
        (self.ymin..=self.ymax).flat_map(move |y| {
            (self.xmin..=self.xmax).map(move |x| {
                (x, y, (x - self.xmin) as usize, (y - self.ymin) as usize)
            })
        })
    }
}

//! Builds small tiled images in memory for tests.

use std::io::Write;
use std::sync::Arc;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::Array3;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use tiff::tags::CompressionMethod;

use crate::affine::AffineTransform;
use crate::decoder::TileEncoding;
use crate::header::CogHeader;
use crate::ifd::{
    ImageFileDirectories, ImageIFD, MaskIFD, SharedMaskDirectory, SharedTileDirectory, TileOffsets,
};
use crate::source::{ObjectStoreReader, RangeReader};

/// A synthetic `u8` image with chunky tiles laid out row-major, each image tile
/// followed by its mask tile when the image carries an internal mask.
#[derive(Debug, Clone)]
pub(crate) struct SyntheticCog {
    width: usize,
    height: usize,
    tile_size: usize,
    bands: usize,
    overviews: usize,
    nodata: Option<f64>,
    masked: bool,
    compression: CompressionMethod,
}

impl SyntheticCog {
    pub fn new(width: usize, height: usize, tile_size: usize, bands: usize) -> Self {
        Self {
            width,
            height,
            tile_size,
            bands,
            overviews: 0,
            nodata: None,
            masked: false,
            compression: CompressionMethod::None,
        }
    }

    pub fn with_overviews(mut self, overviews: usize) -> Self {
        self.overviews = overviews;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_internal_mask(mut self) -> Self {
        self.masked = true;
        self
    }

    pub fn with_deflate(mut self) -> Self {
        self.compression = CompressionMethod::Deflate;
        self
    }

    pub fn geotransform(&self) -> AffineTransform {
        AffineTransform::new(10.0, 0.0, 1000.0, 0.0, -10.0, 5000.0)
    }

    /// Overviews round up, as GDAL writes them.
    pub fn level_size(&self, level: usize) -> (usize, usize) {
        let decimation = 1 << level;
        (self.width.div_ceil(decimation), self.height.div_ceil(decimation))
    }

    pub fn grid_size(&self, level: usize) -> (usize, usize) {
        let (width, height) = self.level_size(level);
        (width.div_ceil(self.tile_size), height.div_ceil(self.tile_size))
    }

    /// Value of a pixel at an overview level, never zero.
    pub fn pixel(level: usize, band: usize, row: usize, col: usize) -> u8 {
        ((band * 50 + row * 3 + col * 7 + level * 11) % 250 + 1) as u8
    }

    /// Validity of a pixel in the internal mask.
    pub fn valid(row: usize, col: usize) -> bool {
        (row + col) % 5 != 0
    }

    /// Expected `(bands, rows, cols)` window of an overview level.
    pub fn window(
        &self,
        level: usize,
        row0: usize,
        col0: usize,
        rows: usize,
        cols: usize,
    ) -> Array3<u8> {
        Array3::from_shape_fn((self.bands, rows, cols), |(b, r, c)| {
            Self::pixel(level, b, row0 + r, col0 + c)
        })
    }

    pub fn valid_window(&self, row0: usize, col0: usize, rows: usize, cols: usize) -> Array3<bool> {
        Array3::from_shape_fn((self.bands, rows, cols), |(_, r, c)| {
            Self::valid(row0 + r, col0 + c)
        })
    }

    fn image_tile(&self, level: usize, tile_x: usize, tile_y: usize) -> Vec<u8> {
        let size = self.tile_size;
        let mut out = Vec::with_capacity(size * size * self.bands);
        for r in 0..size {
            for c in 0..size {
                for b in 0..self.bands {
                    out.push(Self::pixel(level, b, tile_y * size + r, tile_x * size + c));
                }
            }
        }
        self.compress(out)
    }

    fn mask_tile(&self, tile_x: usize, tile_y: usize) -> Vec<u8> {
        let size = self.tile_size;
        let row_bytes = size.div_ceil(8);
        let mut out = vec![0u8; row_bytes * size];
        for r in 0..size {
            for c in 0..size {
                if Self::valid(tile_y * size + r, tile_x * size + c) {
                    out[r * row_bytes + c / 8] |= 0x80 >> (c % 8);
                }
            }
        }
        self.compress(out)
    }

    fn compress(&self, raw: Vec<u8>) -> Vec<u8> {
        match self.compression {
            CompressionMethod::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&raw).unwrap();
                encoder.finish().unwrap()
            }
            _ => raw,
        }
    }

    fn build(&self) -> (Vec<u8>, CogHeader<u8>) {
        // stand-in for the file header
        let mut file = b"II*\0".to_vec();
        file.resize(16, 0);

        let mut images: Vec<SharedTileDirectory<u8>> = vec![];
        let mut masks: Vec<SharedMaskDirectory> = vec![];
        for level in 0..=self.overviews {
            let (grid_width, grid_height) = self.grid_size(level);
            let mut image_offsets = vec![];
            let mut image_counts = vec![];
            let mut mask_offsets = vec![];
            let mut mask_counts = vec![];
            for tile_y in 0..grid_height {
                for tile_x in 0..grid_width {
                    let tile = self.image_tile(level, tile_x, tile_y);
                    image_offsets.push(file.len() as u64);
                    image_counts.push(tile.len() as u64);
                    file.extend_from_slice(&tile);
                    if self.masked {
                        let mask = self.mask_tile(tile_x, tile_y);
                        mask_offsets.push(file.len() as u64);
                        mask_counts.push(mask.len() as u64);
                        file.extend_from_slice(&mask);
                    }
                }
            }

            let tiles =
                TileOffsets::try_new(image_offsets, image_counts, grid_width, grid_height).unwrap();
            let encoding = TileEncoding {
                compression: self.compression,
                ..Default::default()
            };
            images.push(Arc::new(
                ImageIFD::<u8>::new(
                    self.level_size(level),
                    (self.tile_size, self.tile_size),
                    self.bands,
                    tiles,
                )
                .with_encoding(encoding),
            ));
            if self.masked {
                let tiles =
                    TileOffsets::try_new(mask_offsets, mask_counts, grid_width, grid_height)
                        .unwrap();
                masks.push(Arc::new(MaskIFD::new(
                    (self.tile_size, self.tile_size),
                    self.compression,
                    tiles,
                )));
            }
        }

        let ifds = ImageFileDirectories::try_new(images, Some(masks)).unwrap();
        let header = CogHeader::try_new(self.geotransform(), ifds, self.nodata).unwrap();
        (file, header)
    }

    pub fn header(&self) -> CogHeader<u8> {
        self.build().1
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().0
    }

    pub async fn reader(&self) -> Arc<dyn RangeReader> {
        let store = Arc::new(InMemory::new());
        let path = Path::from("synthetic.tif");
        store.put(&path, self.bytes().into()).await.unwrap();
        Arc::new(ObjectStoreReader::new(store, path))
    }
}

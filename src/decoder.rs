use std::io::{Cursor, Read};

use bytes::Bytes;
use ndarray::{Array2, Array3};
use tiff::tags::{CompressionMethod, PhotometricInterpretation};
use tiff::{TiffError, TiffUnsupportedError};

use crate::compression::decompress;
use crate::error::{CogWindowError, Result};
use crate::sample::{Endianness, Sample};

/// How the tiles of one directory are encoded.
#[derive(Debug, Clone)]
pub struct TileEncoding {
    pub compression: CompressionMethod,
    pub photometric_interpretation: PhotometricInterpretation,
    /// Shared JPEG quantization/huffman tables (`JPEGTables` tag).
    pub jpeg_tables: Option<Vec<u8>>,
    pub byte_order: Endianness,
}

impl Default for TileEncoding {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::None,
            photometric_interpretation: PhotometricInterpretation::BlackIsZero,
            jpeg_tables: None,
            byte_order: Endianness::LittleEndian,
        }
    }
}

/// Decode one pixel-interleaved tile into a band-major `(bands, height, width)` array.
pub(crate) fn decode_tile<T: Sample>(
    buf: Bytes,
    encoding: &TileEncoding,
    bands: usize,
    tile_width: usize,
    tile_height: usize,
) -> Result<Array3<T>> {
    let raw = match encoding.compression {
        CompressionMethod::ModernJPEG => decode_modern_jpeg(
            buf,
            encoding.photometric_interpretation,
            encoding.jpeg_tables.as_ref(),
        )?,
        method => decompress(buf, method)?,
    };

    let samples = T::read_samples(&raw, encoding.byte_order)?;
    let expected = bands * tile_width * tile_height;
    if samples.len() != expected {
        return Err(CogWindowError::ShapeMismatch {
            expected: vec![bands, tile_height, tile_width],
            actual: vec![samples.len()],
        });
    }

    let interleaved = Array3::from_shape_vec((tile_height, tile_width, bands), samples)
        .map_err(|err| CogWindowError::Decode(err.to_string()))?;
    Ok(interleaved
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned())
}

/// Decode one tile of a 1-bit internal mask.
///
/// Bits are packed MSB first and each row is padded to a whole byte. A zero bit
/// marks a pixel as masked out; the returned array is `true` where the pixel is
/// masked out.
pub(crate) fn decode_mask(
    buf: Bytes,
    compression: CompressionMethod,
    tile_width: usize,
    tile_height: usize,
) -> Result<Array2<bool>> {
    let raw = decompress(buf, compression)?;
    let row_bytes = tile_width.div_ceil(8);
    if raw.len() < row_bytes * tile_height {
        return Err(CogWindowError::ShapeMismatch {
            expected: vec![tile_height, row_bytes],
            actual: vec![raw.len()],
        });
    }

    Ok(Array2::from_shape_fn((tile_height, tile_width), |(row, col)| {
        let byte = raw[row * row_bytes + col / 8];
        byte & (0x80 >> (col % 8)) == 0
    }))
}

fn decode_modern_jpeg(
    buf: Bytes,
    photometric_interpretation: PhotometricInterpretation,
    jpeg_tables: Option<&Vec<u8>>,
) -> Result<Vec<u8>> {
    // JPEG compression in TIFF allows saving quantization and/or huffman tables in one central
    // location. These `jpeg_tables` are simply prepended to the remaining jpeg image data. Because
    // these `jpeg_tables` start with a `SOI` (HEX: `0xFFD8`) or __start of image__ marker which is
    // also at the beginning of the remaining JPEG image data and would confuse the JPEG renderer,
    // one of these has to be taken off. In this case the first two bytes of the remaining JPEG
    // data is removed because it follows `jpeg_tables`. Similary, `jpeg_tables` ends with a `EOI`
    // (HEX: `0xFFD9`) or __end of image__ marker, this has to be removed as well (last two bytes
    // of `jpeg_tables`).
    let reader = Cursor::new(buf);

    let jpeg_reader: Box<dyn Read + '_> = match jpeg_tables {
        Some(jpeg_tables) if jpeg_tables.len() >= 2 => {
            let mut reader = reader;
            reader.read_exact(&mut [0; 2])?;

            Box::new(Cursor::new(&jpeg_tables[..jpeg_tables.len() - 2]).chain(reader))
        }
        _ => Box::new(reader),
    };

    let mut decoder = jpeg::Decoder::new(jpeg_reader);

    match photometric_interpretation {
        PhotometricInterpretation::RGB => decoder.set_color_transform(jpeg::ColorTransform::RGB),
        PhotometricInterpretation::WhiteIsZero
        | PhotometricInterpretation::BlackIsZero
        | PhotometricInterpretation::TransparencyMask => {
            decoder.set_color_transform(jpeg::ColorTransform::None)
        }
        PhotometricInterpretation::CMYK => decoder.set_color_transform(jpeg::ColorTransform::CMYK),
        PhotometricInterpretation::YCbCr => {
            decoder.set_color_transform(jpeg::ColorTransform::YCbCr)
        }
        photometric_interpretation => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::UnsupportedInterpretation(photometric_interpretation),
            )
            .into());
        }
    }

    let data = decoder.decode()?;
    Ok(data)
}

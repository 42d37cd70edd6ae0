use std::io::{Cursor, Read};

use bytes::Bytes;
use tiff::tags::CompressionMethod;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use crate::error::{CogWindowError, Result};

/// Undo the byte-level compression of a single tile.
///
/// JPEG is not handled here because its output depends on the photometric
/// interpretation; see [`crate::decoder`].
pub(crate) fn decompress(buf: Bytes, compression: CompressionMethod) -> Result<Vec<u8>> {
    match compression {
        CompressionMethod::None => Ok(buf.to_vec()),
        CompressionMethod::Deflate | CompressionMethod::OldDeflate => inflate(buf),
        CompressionMethod::LZW => decode_lzw(&buf),
        CompressionMethod::PackBits => unpack_bits(&buf),
        method => Err(CogWindowError::UnsupportedCompression(method)),
    }
}

fn inflate(buf: Bytes) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(Cursor::new(buf));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn decode_lzw(buf: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let mut out = Vec::new();
    // Some writers omit the end-of-information code, so running out of input is fine.
    decoder
        .into_vec(&mut out)
        .decode_all(buf)
        .status
        .map_err(|err| CogWindowError::Decode(format!("LZW: {err}")))?;
    Ok(out)
}

fn unpack_bits(buf: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(buf.len() * 2);
    let mut pos = 0;
    while pos < buf.len() {
        let header = buf[pos] as i8;
        pos += 1;
        match header {
            0..=127 => {
                let count = header as usize + 1;
                let literal = buf.get(pos..pos + count).ok_or_else(|| {
                    CogWindowError::Decode("PackBits literal run past end of tile".to_string())
                })?;
                out.extend_from_slice(literal);
                pos += count;
            }
            -127..=-1 => {
                let value = *buf.get(pos).ok_or_else(|| {
                    CogWindowError::Decode("PackBits repeat run past end of tile".to_string())
                })?;
                out.extend(std::iter::repeat(value).take((1 - header as isize) as usize));
                pos += 1;
            }
            // -128 is a no-op
            _ => {}
        }
    }
    Ok(out)
}

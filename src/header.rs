use bytes::Bytes;
use ndarray::Axis;

use crate::affine::AffineTransform;
use crate::error::{CogWindowError, Result};
use crate::geometry::Bounds;
use crate::ifd::ImageFileDirectories;
use crate::mosaic::MaskedArray;
use crate::sample::Sample;

/// Everything a partial read needs to know about an image, as produced by the
/// header parser: the native geotransform, the image (and mask) directories and
/// the nodata value.
#[derive(Clone)]
pub struct CogHeader<T> {
    geotransform: AffineTransform,
    ifds: ImageFileDirectories<T>,
    nodata: Option<f64>,
}

impl<T: Sample> CogHeader<T> {
    pub fn try_new(
        geotransform: AffineTransform,
        ifds: ImageFileDirectories<T>,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if geotransform.inverse().is_none() {
            return Err(CogWindowError::Config(format!(
                "geotransform {geotransform:?} is not invertible"
            )));
        }
        Ok(Self {
            geotransform,
            ifds,
            nodata,
        })
    }

    pub fn ifds(&self) -> &ImageFileDirectories<T> {
        &self.ifds
    }

    /// Check if the image has an internal mask
    pub fn is_masked(&self) -> bool {
        self.ifds.is_masked()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Whether partial reads carry a validity mask.
    pub fn add_mask(&self) -> bool {
        self.is_masked() || self.nodata.is_some()
    }

    /// Decimation factor of each overview relative to the native image.
    ///
    /// Overview sizes are rounded up when written, so factors are generally not
    /// integers and match the pixel size of [`Self::geotransform`] at each level.
    pub fn overviews(&self) -> Vec<f64> {
        let native_width = self.ifds.images()[0].image_width() as f64;
        self.ifds.images()[1..]
            .iter()
            .map(|ifd| native_width / ifd.image_width().max(1) as f64)
            .collect()
    }

    /// World bounds of the native image.
    pub fn native_bounds(&self) -> Bounds {
        let native = &self.ifds.images()[0];
        let (x0, y0) = self.geotransform.apply(0.0, 0.0);
        let (x1, y1) = self
            .geotransform
            .apply(native.image_width() as f64, native.image_height() as f64);
        Bounds::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Geotransform of the image at an overview level (0 is native).
    pub fn geotransform(&self, level: usize) -> Result<AffineTransform> {
        let ifd = self.ifds.image(level)?;
        if level == 0 {
            return Ok(self.geotransform);
        }
        let (left, top) = self.geotransform.apply(0.0, 0.0);
        let native = &self.ifds.images()[0];
        let (right, bottom) = self
            .geotransform
            .apply(native.image_width() as f64, native.image_height() as f64);
        Ok(AffineTransform::translation(left, top)
            * AffineTransform::scale(
                (right - left) / ifd.image_width() as f64,
                (bottom - top) / ifd.image_height() as f64,
            ))
    }

    /// Decode a tile and derive its validity mask.
    ///
    /// With an internal mask, a pixel is valid where the decoded mask does not
    /// mask it out. With only a nodata value, a pixel is valid where it differs
    /// from nodata. Otherwise no mask is attached.
    pub fn decode_tile(
        &self,
        level: usize,
        image_bytes: Bytes,
        mask_bytes: Option<Bytes>,
    ) -> Result<MaskedArray<T>> {
        let ifd = self.ifds.image(level)?;
        let data = ifd.decode_tile(image_bytes)?;
        let expected = (ifd.bands(), ifd.tile_height(), ifd.tile_width());
        if data.dim() != expected {
            return Err(CogWindowError::ShapeMismatch {
                expected: vec![expected.0, expected.1, expected.2],
                actual: data.shape().to_vec(),
            });
        }

        let mask = match (self.ifds.mask(level)?, mask_bytes) {
            (Some(mask_ifd), Some(mask_bytes)) => {
                let masked_out = mask_ifd.decode_mask_tile(mask_bytes)?;
                if masked_out.dim() != (expected.1, expected.2) {
                    return Err(CogWindowError::ShapeMismatch {
                        expected: vec![expected.1, expected.2],
                        actual: masked_out.shape().to_vec(),
                    });
                }
                let valid = masked_out.mapv(|masked| !masked).insert_axis(Axis(0));
                Some(
                    valid
                        .broadcast(data.raw_dim())
                        .ok_or_else(|| {
                            CogWindowError::General("mask does not broadcast over bands".into())
                        })?
                        .to_owned(),
                )
            }
            (Some(_), None) => {
                return Err(CogWindowError::General(format!(
                    "image at level {level} is masked but no mask bytes were fetched"
                )))
            }
            (None, _) => self.nodata.map(|nodata| {
                if nodata.is_nan() {
                    data.mapv(|value| !value.to_f64().is_nan())
                } else {
                    data.mapv(|value| value.to_f64() != nodata)
                }
            }),
        };

        Ok(MaskedArray { data, mask })
    }
}

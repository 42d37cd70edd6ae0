use ndarray::{s, Array3, Axis};

use crate::geometry::{OutputShape, TileMetadata};
use crate::mosaic::MaskedArray;
use crate::resample::{resample, ResampleMethod};
use crate::sample::Sample;

/// Crop the fused buffer to the requested window, across all bands.
pub fn clip<T: Sample>(mosaic: &MaskedArray<T>, meta: &TileMetadata) -> MaskedArray<T> {
    let (_, rows, cols) = mosaic.dim();
    let y0 = meta.origin_y.min(rows);
    let y1 = (meta.origin_y + meta.height).min(rows);
    let x0 = meta.origin_x.min(cols);
    let x1 = (meta.origin_x + meta.width).min(cols);
    MaskedArray {
        data: mosaic.data.slice(s![.., y0..y1, x0..x1]).to_owned(),
        mask: mosaic
            .mask
            .as_ref()
            .map(|mask| mask.slice(s![.., y0..y1, x0..x1]).to_owned()),
    }
}

/// Resize a band-major array (and its mask) to `shape`.
///
/// The mask always goes through bilinear interpolation of its first band; a
/// pixel stays valid where the interpolated validity is at least one half.
pub fn resample_masked<T: Sample>(
    array: &MaskedArray<T>,
    shape: OutputShape,
    method: ResampleMethod,
) -> MaskedArray<T> {
    let (bands, _, _) = array.dim();
    let pixels = array.data.view().permuted_axes([1, 2, 0]).mapv(T::to_f64);
    let resized = resample(pixels.view(), shape.height, shape.width, method);
    let data = resized
        .permuted_axes([2, 0, 1])
        .mapv(T::from_f64)
        .as_standard_layout()
        .into_owned();

    let mask = array
        .mask
        .as_ref()
        .and_then(|mask| mask.outer_iter().next())
        .map(|first_band| {
            let validity = first_band
                .mapv(|valid| if valid { 1.0 } else { 0.0 })
                .insert_axis(Axis(2));
            let resized = resample(
                validity.view(),
                shape.height,
                shape.width,
                ResampleMethod::Bilinear,
            );
            Array3::from_shape_fn((bands, shape.height, shape.width), |(_, r, c)| {
                resized[[r, c, 0]] >= 0.5
            })
        });

    MaskedArray { data, mask }
}

/// Crop to the requested window, then resize when an output shape is given.
pub fn postprocess<T: Sample>(
    mosaic: &MaskedArray<T>,
    meta: &TileMetadata,
    shape: Option<OutputShape>,
    method: ResampleMethod,
) -> MaskedArray<T> {
    let clipped = clip(mosaic, meta);
    match shape {
        Some(shape) => resample_masked(&clipped, shape, method),
        None => clipped,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sample::DataType;

    fn metadata(origin: (usize, usize), size: (usize, usize)) -> TileMetadata {
        TileMetadata {
            origin_x: origin.0,
            origin_y: origin.1,
            width: size.0,
            height: size.1,
            tile_width: 8,
            tile_height: 8,
            xmin: 0,
            xmax: 1,
            ymin: 0,
            ymax: 1,
            bands: 2,
            dtype: DataType::UInt8,
            overview_level: 0,
            x_coord: vec![],
            y_coord: vec![],
        }
    }

    fn mosaic(with_mask: bool) -> MaskedArray<u8> {
        let data = Array3::from_shape_fn((2, 16, 16), |(b, r, c)| (b * 100 + r * 5 + c) as u8);
        let mask = with_mask.then(|| Array3::from_shape_fn((2, 16, 16), |(_, r, _)| r < 8));
        MaskedArray::new(data, mask).unwrap()
    }

    #[test]
    fn crop_without_shape_is_exact_slice() {
        let mosaic = mosaic(true);
        let meta = metadata((3, 5), (7, 9));
        let out = postprocess(&mosaic, &meta, None, ResampleMethod::Bilinear);
        assert_eq!(out.data, mosaic.data.slice(s![.., 5..14, 3..10]));
        assert_eq!(out.mask.unwrap(), mosaic.mask.unwrap().slice(s![.., 5..14, 3..10]));
    }

    #[test]
    fn resample_to_own_shape_is_unchanged() {
        let mosaic = mosaic(true);
        let meta = metadata((2, 2), (10, 6));
        let clipped = clip(&mosaic, &meta);
        for method in [ResampleMethod::Nearest, ResampleMethod::Bilinear, ResampleMethod::Lanczos] {
            let out = postprocess(&mosaic, &meta, Some(OutputShape::new(10, 6)), method);
            assert_eq!(out, clipped);
        }
    }

    #[test]
    fn resampled_mask_is_broadcast_to_every_band() {
        let mosaic = mosaic(true);
        let meta = metadata((0, 0), (16, 16));
        let shape = Some(OutputShape::new(4, 4));
        let out = postprocess(&mosaic, &meta, shape, ResampleMethod::Nearest);
        assert_eq!(out.data.dim(), (2, 4, 4));
        let mask = out.mask.unwrap();
        assert_eq!(mask.dim(), (2, 4, 4));
        // top half valid, bottom half masked in both bands
        for band in 0..2 {
            assert!(mask.slice(s![band, 0..2, ..]).iter().all(|v| *v));
            assert!(mask.slice(s![band, 2..4, ..]).iter().all(|v| !v));
        }
        // nearest picks source pixel floor((i + 0.5) * 4)
        assert_eq!(out.data[[0, 0, 0]], mosaic.data[[0, 2, 2]]);
        assert_eq!(out.data[[1, 3, 1]], mosaic.data[[1, 14, 6]]);
    }

    #[test]
    fn no_mask_in_no_mask_out() {
        let mosaic = mosaic(false);
        let meta = metadata((1, 1), (12, 12));
        assert!(postprocess(&mosaic, &meta, None, ResampleMethod::Nearest).mask.is_none());
        let shape = Some(OutputShape::new(5, 3));
        let out = postprocess(&mosaic, &meta, shape, ResampleMethod::Bicubic);
        assert!(out.mask.is_none());
        assert_eq!(out.data.dim(), (2, 3, 5));
    }
}

//! Separable resampling of pixel-major `(rows, cols, bands)` arrays.

use std::f64::consts::PI;

use ndarray::{Array3, ArrayView3, Axis};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{CogWindowError, Result};

/// Interpolation used when a partial read is resized to its output shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ResampleMethod {
    #[default]
    Nearest = 0,
    Lanczos = 1,
    Bilinear = 2,
    Bicubic = 3,
    Box = 4,
    Hamming = 5,
}

impl ResampleMethod {
    pub fn from_code(code: u8) -> Result<Self> {
        Self::try_from(code)
            .map_err(|_| CogWindowError::Config(format!("unknown resample method {code}")))
    }

    /// Half-width of the filter kernel at scale 1.
    fn support(&self) -> f64 {
        match self {
            Self::Nearest | Self::Box => 0.5,
            Self::Bilinear | Self::Hamming => 1.0,
            Self::Bicubic => 2.0,
            Self::Lanczos => 3.0,
        }
    }

    fn kernel(&self, x: f64) -> f64 {
        match self {
            Self::Nearest | Self::Box => {
                if (-0.5..0.5).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Bilinear => (1.0 - x.abs()).max(0.0),
            Self::Hamming => {
                if x.abs() >= 1.0 {
                    0.0
                } else {
                    sinc(x) * (0.54 + 0.46 * (PI * x).cos())
                }
            }
            Self::Bicubic => {
                const A: f64 = -0.5;
                let x = x.abs();
                if x < 1.0 {
                    ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
                } else if x < 2.0 {
                    (((x - 5.0) * x + 8.0) * x - 4.0) * A
                } else {
                    0.0
                }
            }
            Self::Lanczos => {
                if x.abs() >= 3.0 {
                    0.0
                } else {
                    sinc(x) * sinc(x / 3.0)
                }
            }
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let x = x * PI;
        x.sin() / x
    }
}

/// Taps of one output sample: first input index and normalized weights.
struct Taps {
    start: usize,
    weights: Vec<f64>,
}

fn taps(method: ResampleMethod, in_size: usize, out_size: usize) -> Vec<Taps> {
    let scale = in_size as f64 / out_size as f64;
    if method == ResampleMethod::Nearest {
        return (0..out_size)
            .map(|i| Taps {
                start: (((i as f64 + 0.5) * scale).floor() as usize).min(in_size - 1),
                weights: vec![1.0],
            })
            .collect();
    }

    let filter_scale = scale.max(1.0);
    let support = method.support() * filter_scale;
    (0..out_size)
        .map(|i| {
            let center = (i as f64 + 0.5) * scale;
            let start = (center - support + 0.5).floor().max(0.0) as usize;
            let end = ((center + support + 0.5).floor() as usize).min(in_size);
            let mut weights: Vec<f64> = (start..end)
                .map(|x| method.kernel((x as f64 - center + 0.5) / filter_scale))
                .collect();
            let total: f64 = weights.iter().sum();
            if total != 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            }
            Taps { start, weights }
        })
        .collect()
}

fn resample_axis(
    input: ArrayView3<f64>,
    axis: Axis,
    out_size: usize,
    method: ResampleMethod,
) -> Array3<f64> {
    let mut shape = input.raw_dim();
    let in_size = shape[axis.index()];
    shape[axis.index()] = out_size;
    let mut output = Array3::zeros(shape);
    if in_size == 0 || out_size == 0 {
        return output;
    }
    for (i, tap) in taps(method, in_size, out_size).iter().enumerate() {
        let mut lane = output.index_axis_mut(axis, i);
        for (k, weight) in tap.weights.iter().enumerate() {
            if *weight != 0.0 {
                lane.scaled_add(*weight, &input.index_axis(axis, tap.start + k));
            }
        }
    }
    output
}

/// Resize a pixel-major `(rows, cols, bands)` array to `rows x cols`.
pub fn resample(
    input: ArrayView3<f64>,
    rows: usize,
    cols: usize,
    method: ResampleMethod,
) -> Array3<f64> {
    let (in_rows, in_cols, _) = input.dim();
    if (in_rows, in_cols) == (rows, cols) {
        return input.to_owned();
    }
    let horizontal = resample_axis(input, Axis(1), cols, method);
    resample_axis(horizontal.view(), Axis(0), rows, method)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ramp(rows: usize, cols: usize, bands: usize) -> Array3<f64> {
        Array3::from_shape_fn((rows, cols, bands), |(r, c, b)| {
            (r * cols + c) as f64 + b as f64 * 100.0
        })
    }

    #[test]
    fn codes_round_trip() {
        assert_eq!(ResampleMethod::from_code(2).unwrap(), ResampleMethod::Bilinear);
        assert_eq!(u8::from(ResampleMethod::Hamming), 5);
        assert!(matches!(ResampleMethod::from_code(9), Err(CogWindowError::Config(_))));
    }

    #[test]
    fn same_shape_is_identity() {
        let input = ramp(5, 7, 2);
        for method in [
            ResampleMethod::Nearest,
            ResampleMethod::Bilinear,
            ResampleMethod::Bicubic,
            ResampleMethod::Lanczos,
        ] {
            assert_eq!(resample(input.view(), 5, 7, method), input);
        }
    }

    #[test]
    fn unit_filters_do_not_move_pixels() {
        // at scale 1 every kernel is one at zero and zero at other integers
        let input = ramp(4, 6, 1);
        for method in [
            ResampleMethod::Box,
            ResampleMethod::Bilinear,
            ResampleMethod::Hamming,
            ResampleMethod::Bicubic,
            ResampleMethod::Lanczos,
        ] {
            let out = resample_axis(input.view(), Axis(1), 6, method);
            for (a, b) in out.iter().zip(input.iter()) {
                assert!((a - b).abs() < 1e-9, "{method:?}: {a} != {b}");
            }
        }
    }

    #[test]
    fn nearest_downsample_picks_centers() {
        let input = ramp(4, 4, 1);
        let out = resample(input.view(), 2, 2, ResampleMethod::Nearest);
        // source pixel floor((i + 0.5) * 2) = 1, 3
        assert_eq!(out[[0, 0, 0]], input[[1, 1, 0]]);
        assert_eq!(out[[0, 1, 0]], input[[1, 3, 0]]);
        assert_eq!(out[[1, 0, 0]], input[[3, 1, 0]]);
        assert_eq!(out[[1, 1, 0]], input[[3, 3, 0]]);
    }

    #[test]
    fn bilinear_downsample_averages() {
        let input = Array3::from_shape_vec((2, 2, 1), vec![0.0, 10.0, 20.0, 30.0]).unwrap();
        let out = resample(input.view(), 1, 1, ResampleMethod::Bilinear);
        assert!((out[[0, 0, 0]] - 15.0).abs() < 1e-9);

        let flat = Array3::from_elem((8, 8, 3), 42.0);
        for method in [ResampleMethod::Bilinear, ResampleMethod::Lanczos, ResampleMethod::Box] {
            let out = resample(flat.view(), 3, 5, method);
            assert_eq!(out.dim(), (3, 5, 3));
            assert!(out.iter().all(|v| (v - 42.0).abs() < 1e-9));
        }
    }

    #[test]
    fn upsample_keeps_bands_apart() {
        let input = ramp(2, 2, 2);
        let out = resample(input.view(), 4, 4, ResampleMethod::Bilinear);
        assert_eq!(out.dim(), (4, 4, 2));
        assert!(out.index_axis(Axis(2), 0).iter().all(|v| *v >= 0.0 && *v <= 3.0));
        assert!(out.index_axis(Axis(2), 1).iter().all(|v| *v >= 100.0 && *v <= 103.0));
    }

    #[test]
    fn empty_input_gives_zeros() {
        let input = Array3::<f64>::zeros((0, 4, 1));
        let out = resample(input.view(), 2, 2, ResampleMethod::Bilinear);
        assert_eq!(out, Array3::<f64>::zeros((2, 2, 1)));
    }
}

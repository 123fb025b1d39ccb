//! Sample buffer → display conversions.
//!
//! All display bitmaps are 8-bit **premultiplied** RGBA, one row per rayon
//! task.

use image::RgbaImage;
use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use rayon::prelude::*;

use super::pixels::PixelData;
use crate::error::{Result, VisionError};
use crate::palette::{Palette, premultiply};

/// Convert one display plane into premultiplied RGBA.
///
/// * `slice` selects the plane of a `[slices, rows, cols]` volume and must be
///   `None` for flat images.
/// * With a palette every sample is treated as a palette index.
/// * Without one, 2D samples are grayscale (replicated, opaque) and
///   `[rows, cols, 3|4]` samples are RGB(A).
pub fn plane_to_rgba(pixels: &PixelData, palette: Option<&Palette>, slice: Option<usize>) -> Result<RgbaImage> {
    match pixels {
        PixelData::U8(a) => convert_typed(a, palette, slice, |v| v as usize, Stretch::None),
        PixelData::U16(a) => {
            let stretch = Stretch::from_min_max(pixels.min_max());
            convert_typed(a, palette, slice, |v| v as usize, stretch)
        }
        PixelData::F32(a) => {
            if palette.is_some() {
                return Err(VisionError::ShapeMismatch(
                    "indexed images need integer samples, got float32".into(),
                ));
            }
            let stretch = Stretch::from_min_max(pixels.min_max());
            convert_typed(a, None, slice, |_| 0, stretch)
        }
    }
}

/// Linear min/max stretch of any buffer into uint8 (same shape).
/// A constant buffer maps to all zeros.
pub fn normalized_u8(pixels: &PixelData) -> PixelData {
    let stretch = Stretch::from_min_max(pixels.min_max());
    let stretch = match stretch {
        Stretch::None => Stretch::Linear { min: 0.0, scale: 0.0 },
        s => s,
    };
    match pixels {
        PixelData::U8(a) => PixelData::U8(a.mapv(|v| stretch.apply(v as f32))),
        PixelData::U16(a) => PixelData::U8(a.mapv(|v| stretch.apply(v as f32))),
        PixelData::F32(a) => PixelData::U8(a.mapv(|v| stretch.apply(v))),
    }
}

#[derive(Clone, Copy, Debug)]
enum Stretch {
    /// Samples are already 0..=255.
    None,
    Linear { min: f32, scale: f32 },
}

impl Stretch {
    fn from_min_max(range: Option<(f32, f32)>) -> Self {
        match range {
            Some((min, max)) if max > min => Stretch::Linear {
                min,
                scale: 255.0 / (max - min),
            },
            Some((min, _)) => Stretch::Linear { min, scale: 0.0 },
            None => Stretch::None,
        }
    }

    #[inline]
    fn apply(self, v: f32) -> u8 {
        match self {
            Stretch::None => v.clamp(0.0, 255.0) as u8,
            Stretch::Linear { min, scale } => ((v - min) * scale).round().clamp(0.0, 255.0) as u8,
        }
    }
}

fn convert_typed<T>(
    array: &ArrayD<T>,
    palette: Option<&Palette>,
    slice: Option<usize>,
    to_index: impl Fn(T) -> usize + Sync,
    stretch: Stretch,
) -> Result<RgbaImage>
where
    T: Copy + Into<f64> + Send + Sync,
{
    let view = match slice {
        Some(n) => {
            if array.ndim() != 3 || n >= array.shape()[0] {
                return Err(VisionError::ShapeMismatch(format!(
                    "slice {} out of range for shape {:?}",
                    n,
                    array.shape()
                )));
            }
            array.index_axis(Axis(0), n)
        }
        None => array.view(),
    };

    match (view.ndim(), palette) {
        (2, _) => {
            let plane = view
                .into_dimensionality::<Ix2>()
                .map_err(|e| VisionError::ShapeMismatch(e.to_string()))?;
            Ok(match palette {
                Some(p) => indexed_plane(plane, p, &to_index),
                None => gray_plane(plane, stretch),
            })
        }
        (3, None) => {
            let channels = view.shape()[2];
            if channels != 3 && channels != 4 {
                return Err(VisionError::ShapeMismatch(format!(
                    "color images need 3 or 4 channels, got {}",
                    channels
                )));
            }
            let (rows, cols) = (view.shape()[0], view.shape()[1]);
            let samples: Vec<T> = view.iter().copied().collect();
            Ok(fill_rows(rows, cols, |r, c| {
                let base = (r * cols + c) * channels;
                let ch = |i: usize| stretch.apply(as_f32(samples[base + i]));
                let alpha = if channels == 4 { ch(3) } else { 255 };
                premultiply([ch(0), ch(1), ch(2), alpha])
            }))
        }
        (ndim, _) => Err(VisionError::ShapeMismatch(format!(
            "cannot display a {}-dimensional plane{}",
            ndim,
            if palette.is_some() { " through a palette" } else { "" }
        ))),
    }
}

fn indexed_plane<T: Copy + Sync>(plane: ArrayView2<'_, T>, palette: &Palette, to_index: &(impl Fn(T) -> usize + Sync)) -> RgbaImage {
    let (rows, cols) = plane.dim();
    let samples: Vec<T> = plane.iter().copied().collect();
    fill_rows(rows, cols, |r, c| palette.premultiplied_color_for(to_index(samples[r * cols + c])))
}

fn gray_plane<T: Copy + Into<f64> + Sync>(plane: ArrayView2<'_, T>, stretch: Stretch) -> RgbaImage {
    let (rows, cols) = plane.dim();
    let samples: Vec<T> = plane.iter().copied().collect();
    fill_rows(rows, cols, |r, c| {
        let v = stretch.apply(as_f32(samples[r * cols + c]));
        [v, v, v, 255]
    })
}

#[inline]
fn as_f32<T: Into<f64>>(v: T) -> f32 {
    let wide: f64 = v.into();
    wide as f32
}

fn fill_rows(rows: usize, cols: usize, pixel: impl Fn(usize, usize) -> [u8; 4] + Sync) -> RgbaImage {
    let mut buf = vec![0u8; rows * cols * 4];
    if cols > 0 {
        buf.par_chunks_mut(cols * 4).enumerate().for_each(|(r, row)| {
            for (c, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&pixel(r, c));
            }
        });
    }
    // Buffer length always equals rows * cols * 4
    RgbaImage::from_raw(cols as u32, rows as u32, buf).unwrap_or_else(|| RgbaImage::new(cols as u32, rows as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn grayscale_u8_replicates_channels_with_full_alpha() {
        let data: PixelData = Array2::from_shape_vec((1, 2), vec![10u8, 200]).unwrap().into();
        let rgba = plane_to_rgba(&data, None, None).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn indexed_u8_goes_through_premultiplied_palette() {
        let palette = Palette::dense(vec![[0, 0, 0, 0], [0, 255, 0, 128]]);
        let data: PixelData = Array2::from_shape_vec((1, 3), vec![0u8, 1, 7]).unwrap().into();
        let rgba = plane_to_rgba(&data, Some(&palette), None).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [0, 128, 0, 128]);
        assert_eq!(rgba.get_pixel(2, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn float_plane_is_stretched_to_full_range() {
        let data: PixelData = Array2::from_shape_vec((1, 3), vec![-1.0f32, 0.0, 1.0]).unwrap().into();
        let rgba = plane_to_rgba(&data, None, None).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0[0], 0);
        assert_eq!(rgba.get_pixel(1, 0).0[0], 128);
        assert_eq!(rgba.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn float_samples_cannot_be_indexed() {
        let data: PixelData = Array2::<f32>::zeros((2, 2)).into();
        let palette = Palette::default_soft([0, 255, 0]);
        assert!(plane_to_rgba(&data, Some(&palette), None).is_err());
    }

    #[test]
    fn volume_slice_selects_a_plane() {
        let mut vol = Array3::<u8>::zeros((3, 2, 2));
        vol[[2, 1, 1]] = 99;
        let data: PixelData = vol.into();
        let rgba = plane_to_rgba(&data, None, Some(2)).unwrap();
        assert_eq!(rgba.dimensions(), (2, 2));
        assert_eq!(rgba.get_pixel(1, 1).0, [99, 99, 99, 255]);
        assert!(plane_to_rgba(&data, None, Some(3)).is_err());
    }

    #[test]
    fn normalized_u8_stretches_min_to_zero_and_max_to_255() {
        let data: PixelData = Array2::from_shape_vec((1, 3), vec![0.0f32, 0.5, 1.0]).unwrap().into();
        let PixelData::U8(out) = normalized_u8(&data) else {
            panic!("expected uint8 output");
        };
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![0, 128, 255]);
    }
}

use std::sync::Arc;

use image::{RgbaImage, imageops};
use rayon::prelude::*;

use crate::error::{Result, VisionError};

/// One layer to paint: premultiplied bitmap plus opacity.
pub type CompositeLayer = (Arc<RgbaImage>, f32);

/// Paint `layers` bottom-to-top onto a transparent `width x height` canvas
/// with premultiplied source-over. Every bitmap must have the canvas size.
pub fn composite(width: u32, height: u32, layers: &[CompositeLayer]) -> Result<RgbaImage> {
    for (bitmap, _) in layers {
        if bitmap.dimensions() != (width, height) {
            return Err(VisionError::Validation(format!(
                "layer bitmap is {}x{}, base layer is {}x{}",
                bitmap.width(),
                bitmap.height(),
                width,
                height
            )));
        }
    }

    let mut out = RgbaImage::new(width, height);
    let stride = width as usize * 4;
    if stride == 0 {
        return Ok(out);
    }
    let sources: Vec<(&[u8], f32)> = layers
        .iter()
        .filter(|(_, opacity)| *opacity > 0.0)
        .map(|(bitmap, opacity)| (bitmap.as_raw().as_slice(), opacity.clamp(0.0, 1.0)))
        .collect();

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let start = y * stride;
        for (src, opacity) in &sources {
            let src_row = &src[start..start + stride];
            for (dst, px) in row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                blend_premultiplied(dst, px, *opacity);
            }
        }
    });
    Ok(out)
}

/// `dst = src * opacity + dst * (1 - src_alpha * opacity)`, all premultiplied.
#[inline]
fn blend_premultiplied(dst: &mut [u8], src: &[u8], opacity: f32) {
    let src_a = src[3] as f32 * opacity;
    if src_a <= 0.0 {
        return;
    }
    let keep = 1.0 - src_a / 255.0;
    for ch in 0..4 {
        let v = src[ch] as f32 * opacity + dst[ch] as f32 * keep;
        dst[ch] = v.round().clamp(0.0, 255.0) as u8;
    }
}

/// Smooth resample to `scale` times the bitmap size (at least 1x1).
pub fn scaled(bitmap: &RgbaImage, scale: f64) -> RgbaImage {
    let w = ((bitmap.width() as f64 * scale).round() as u32).max(1);
    let h = ((bitmap.height() as f64 * scale).round() as u32).max(1);
    if (w, h) == bitmap.dimensions() {
        return bitmap.clone();
    }
    imageops::resize(bitmap, w, h, imageops::FilterType::Triangle)
}

/// Premultiplied → straight alpha, for encoders.
pub fn unpremultiplied(bitmap: &RgbaImage) -> RgbaImage {
    let mut out = bitmap.clone();
    out.par_chunks_mut(4).for_each(|px| {
        let a = px[3] as u32;
        if a == 0 {
            px[..3].fill(0);
        } else if a < 255 {
            for ch in &mut px[..3] {
                *ch = ((*ch as u32 * 255 + a / 2) / a).min(255) as u8;
            }
        }
    });
    out
}

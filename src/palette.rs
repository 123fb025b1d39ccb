//! Index → RGBA color tables for indexed (mask / overlay) images.
//!
//! Palettes are immutable once built and are shared by reference
//! (`Arc<Palette>`) between images, layers and layer views. Changing the
//! colors of a layer means installing a different `Palette`.

use std::sync::Arc;

use crate::error::{Result, VisionError};

pub type Rgba = [u8; 4];

const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// Alpha of the foreground entry of [`Palette::default_soft`].
pub const DEFAULT_SOFT_ALPHA: u8 = 100;

/// Highest index a sparse palette may map. Pixel samples are at most 16 bit.
pub const MAX_PALETTE_INDEX: usize = u16::MAX as usize;

#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    /// Straight-alpha colors, indexed by pixel value.
    colors: Vec<Rgba>,
    /// Same table with color channels multiplied by alpha.
    premultiplied: Vec<Rgba>,
}

impl Palette {
    /// Dense table: `table[i]` is the color of index `i`.
    pub fn dense(table: Vec<Rgba>) -> Self {
        let premultiplied = table.iter().map(|&c| premultiply(c)).collect();
        Self {
            colors: table,
            premultiplied,
        }
    }

    /// Build from sparse `(index, color)` anchors. Indices strictly between two
    /// consecutive anchors get a linear blend of both anchor colors (all four
    /// channels); indices outside the anchor range stay unmapped.
    ///
    /// Anchors above [`MAX_PALETTE_INDEX`] are a `Validation` error.
    pub fn from_sparse_index_list(anchors: &[(usize, Rgba)]) -> Result<Self> {
        if let Some(&(index, _)) = anchors.iter().find(|(i, _)| *i > MAX_PALETTE_INDEX) {
            return Err(VisionError::Validation(format!(
                "palette index {} exceeds the maximum of {}",
                index, MAX_PALETTE_INDEX
            )));
        }
        Ok(Self::interpolated(anchors))
    }

    fn interpolated(anchors: &[(usize, Rgba)]) -> Self {
        let mut sorted: Vec<(usize, Rgba)> = anchors.to_vec();
        sorted.sort_by_key(|&(index, _)| index);
        sorted.dedup_by_key(|&mut (index, _)| index);

        let Some(&(last_index, _)) = sorted.last() else {
            return Self::dense(Vec::new());
        };

        let mut table = vec![TRANSPARENT; last_index + 1];
        for pair in sorted.windows(2) {
            let (i0, c0) = pair[0];
            let (i1, c1) = pair[1];
            let span = (i1 - i0) as f32;
            for (offset, slot) in table[i0..i1].iter_mut().enumerate() {
                let t = offset as f32 / span;
                *slot = lerp_rgba(c0, c1, t);
            }
        }
        for &(index, color) in &sorted {
            table[index] = color;
        }
        Self::dense(table)
    }

    /// Two-entry palette for binary masks: 0 is fully transparent, 1 is
    /// `rgb` at [`DEFAULT_SOFT_ALPHA`].
    pub fn default_soft(rgb: [u8; 3]) -> Self {
        Self::dense(vec![
            TRANSPARENT,
            [rgb[0], rgb[1], rgb[2], DEFAULT_SOFT_ALPHA],
        ])
    }

    /// Jet color transfer function over 0..=255 for activation maps. Index 0
    /// is a fully transparent blue so that cold regions do not tint the base image.
    pub fn default_jet() -> Self {
        Self::interpolated(&[
            (0, [0, 0, 255, 0]),
            (96, [0, 255, 255, 255]),
            (128, [0, 255, 0, 255]),
            (160, [255, 255, 0, 255]),
            (255, [255, 0, 0, 255]),
        ])
    }

    pub fn shared(self) -> Arc<Palette> {
        Arc::new(self)
    }

    /// Straight-alpha color of `index`; unmapped indices are transparent.
    #[inline]
    pub fn color_for(&self, index: usize) -> Rgba {
        self.colors.get(index).copied().unwrap_or(TRANSPARENT)
    }

    #[inline]
    pub fn premultiplied_color_for(&self, index: usize) -> Rgba {
        self.premultiplied.get(index).copied().unwrap_or(TRANSPARENT)
    }

    /// Number of explicitly mapped indices (highest mapped index + 1).
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Multiply color channels by alpha (rounded).
#[inline]
pub fn premultiply(c: Rgba) -> Rgba {
    let a = c[3] as u32;
    let mul = |v: u8| ((v as u32 * a + 127) / 255) as u8;
    [mul(c[0]), mul(c[1]), mul(c[2]), c[3]]
}

fn lerp_rgba(a: Rgba, b: Rgba, t: f32) -> Rgba {
    let mut out = [0u8; 4];
    for ch in 0..4 {
        let v = a[ch] as f32 + (b[ch] as f32 - a[ch] as f32) * t;
        out[ch] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageBuffer, Luma, RgbaImage};
use ndarray::{Array2, Array3, ArrayD};

use crate::error::{Result, VisionError};
use crate::image::{DType, Image, PixelData, normalized_u8};
use crate::layered::LayeredImage;
use crate::log_info;
use crate::palette::Palette;
use crate::viewer::unpremultiplied;

// ============================================================================
// LOADING
// ============================================================================

/// Per-load options. Formats ignore the options they have no use for.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Collapse color input to one luminance plane.
    pub as_gray: bool,
    /// Interpret the samples as palette indices (label maps, masks).
    pub palette: Option<Arc<Palette>>,
}

/// `load(path, options) -> Image`. Every failure is a [`VisionError::Load`].
pub trait Loader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Image>;

    fn can_load(&self, path: &Path) -> bool;
}

/// Raster formats decoded by the `image` crate (PNG, JPEG, BMP, TIFF).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileLoader;

pub const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

impl Loader for ImageFileLoader {
    fn can_load(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| RASTER_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Image> {
        let decoded = image::open(path)
            .map_err(|e| VisionError::Load(format!("'{}': {}", path.display(), e)))?;
        let (w, h) = (decoded.width() as usize, decoded.height() as usize);

        // Indexed input is always read as a single plane of integer labels.
        let gray = options.as_gray || options.palette.is_some();
        let pixels: PixelData = if gray {
            match &decoded {
                DynamicImage::ImageLuma16(_)
                | DynamicImage::ImageLumaA16(_)
                | DynamicImage::ImageRgb16(_)
                | DynamicImage::ImageRgba16(_) => plane(h, w, decoded.to_luma16().into_raw())?,
                _ => plane(h, w, decoded.to_luma8().into_raw())?,
            }
        } else {
            match decoded {
                DynamicImage::ImageLuma8(buf) => plane(h, w, buf.into_raw())?,
                DynamicImage::ImageLuma16(buf) => plane(h, w, buf.into_raw())?,
                DynamicImage::ImageRgb8(buf) => color(h, w, 3, buf.into_raw())?,
                other => color(h, w, 4, other.to_rgba8().into_raw())?,
            }
        };

        let image = Image::flat(pixels, options.palette.clone())
            .map_err(|e| VisionError::Load(format!("'{}': {}", path.display(), e)))?
            .with_path(path);
        log_info!(
            "Loaded '{}' ({}x{}, {})",
            path.display(),
            w,
            h,
            image.dtype().name()
        );
        Ok(image)
    }
}

fn plane<T>(rows: usize, cols: usize, samples: Vec<T>) -> Result<PixelData>
where
    PixelData: From<ArrayD<T>>,
{
    let a = Array2::from_shape_vec((rows, cols), samples)
        .map_err(|e| VisionError::Load(e.to_string()))?;
    Ok(PixelData::from(a.into_dyn()))
}

fn color(rows: usize, cols: usize, channels: usize, samples: Vec<u8>) -> Result<PixelData> {
    let a = Array3::from_shape_vec((rows, cols, channels), samples)
        .map_err(|e| VisionError::Load(e.to_string()))?;
    Ok(PixelData::from(a))
}

// ============================================================================
// WRITING
// ============================================================================

/// Write the raw samples of layer `layer_name` (indices for masks, not
/// colors) so they can be loaded back with the same palette.
///
/// Float samples are stretched to 8 bit. Volumes need a volume writer and are
/// rejected.
pub fn save_layer_image(layered: &LayeredImage, layer_name: &str, path: &Path) -> Result<()> {
    let layer = layered
        .layer_by_name(layer_name)
        .ok_or_else(|| VisionError::NotFound(format!("no layer named '{}'", layer_name)))?;
    let image = layer
        .image()
        .ok_or_else(|| VisionError::NotFound(format!("layer '{}' has no image", layer_name)))?;
    if image.kind() == crate::image::ImageKind::Volume {
        return Err(VisionError::Validation(format!(
            "layer '{}' holds a volume; only flat images can be written",
            layer_name
        )));
    }

    let pixels = image.pixels_snapshot();
    let pixels = if pixels.dtype() == DType::F32 {
        normalized_u8(&pixels)
    } else {
        pixels
    };
    let dynamic = to_dynamic(pixels)?;
    ensure_parent_dir(path)?;
    dynamic.save(path)?;
    log_info!("Saved layer '{}' to '{}'", layer_name, path.display());
    Ok(())
}

fn to_dynamic(pixels: PixelData) -> Result<DynamicImage> {
    let shape = pixels.shape().to_vec();
    let (rows, cols) = (shape[0] as u32, shape[1] as u32);
    let too_short = || VisionError::ShapeMismatch(format!("buffer does not match shape {:?}", shape));
    match (pixels, shape.len()) {
        (PixelData::U8(a), 2) => {
            let raw = standard_vec(a);
            ImageBuffer::<Luma<u8>, _>::from_raw(cols, rows, raw)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(too_short)
        }
        (PixelData::U16(a), 2) => {
            let raw = standard_vec(a);
            ImageBuffer::<Luma<u16>, _>::from_raw(cols, rows, raw)
                .map(DynamicImage::ImageLuma16)
                .ok_or_else(too_short)
        }
        (PixelData::U8(a), 3) if shape[2] == 3 => image::RgbImage::from_raw(cols, rows, standard_vec(a))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(too_short),
        (PixelData::U8(a), 3) if shape[2] == 4 => RgbaImage::from_raw(cols, rows, standard_vec(a))
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(too_short),
        (p, _) => Err(VisionError::Validation(format!(
            "cannot write {} samples of shape {:?}",
            p.dtype().name(),
            shape
        ))),
    }
}

/// Samples in row-major order, whatever the memory layout.
fn standard_vec<T: Clone>(a: ArrayD<T>) -> Vec<T> {
    a.iter().cloned().collect()
}

/// Write a premultiplied bitmap (viewer output) as a straight-alpha PNG.
pub fn save_rgba(premultiplied: &RgbaImage, path: &Path) -> Result<()> {
    let straight = unpremultiplied(premultiplied);
    ensure_parent_dir(path)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(
        straight.as_raw(),
        straight.width(),
        straight.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

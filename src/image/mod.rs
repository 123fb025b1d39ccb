//! Raster images: a sample buffer, an optional palette and change signals.
//!
//! An [`Image`] is a cheap, clonable handle (`Rc`). All handles of one image
//! see the same pixels. Pixel data only changes through [`Image::set_pixels`],
//! [`Image::modify_pixels`] and [`Image::set_palette`], and every one of
//! those emits `pixels_modified` afterwards. That signal is the single channel
//! through which layers, layer views and previews learn about new content.

pub mod convert;
pub mod pixels;

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use ndarray::Axis;

pub use convert::{normalized_u8, plane_to_rgba};
pub use pixels::{DType, PixelData, PixelsMut};

use crate::error::{Result, VisionError};
use crate::palette::Palette;
use crate::signal::Signal;

/// How the axes of the sample buffer are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// `[rows, cols]` (gray or indexed) or `[rows, cols, 3|4]` (RGB/RGBA).
    Flat,
    /// `[slices, rows, cols]`.
    Volume,
}

/// Physical placement of a volume, as read from NIfTI/DICOM headers.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialAttrs {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub direction: [[f64; 3]; 3],
}

impl Default for SpatialAttrs {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

/// Half-open box `[start, end)` over the leading axes of a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelRegion {
    pub start: Vec<usize>,
    pub end: Vec<usize>,
}

impl PixelRegion {
    pub fn new(start: Vec<usize>, end: Vec<usize>) -> Self {
        Self { start, end }
    }

    pub fn full(shape: &[usize]) -> Self {
        Self {
            start: vec![0; shape.len()],
            end: shape.to_vec(),
        }
    }

    /// 2D box of `rows x cols` pixels with its top-left corner at `(row, col)`.
    pub fn rect(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self {
            start: vec![row, col],
            end: vec![row + rows, col + cols],
        }
    }

    pub fn is_full(&self, shape: &[usize]) -> bool {
        self.start.iter().all(|&s| s == 0) && self.end.as_slice() == shape
    }

    fn check_within(&self, shape: &[usize]) -> Result<()> {
        let fits = self.start.len() == self.end.len()
            && self.start.len() <= shape.len()
            && self
                .start
                .iter()
                .zip(&self.end)
                .zip(shape)
                .all(|((&s, &e), &dim)| s <= e && e <= dim);
        if fits {
            Ok(())
        } else {
            Err(VisionError::Validation(format!(
                "region {:?}..{:?} does not fit shape {:?}",
                self.start, self.end, shape
            )))
        }
    }
}

/// Payload of `shape_changed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeChange {
    pub old: Vec<usize>,
    pub new: Vec<usize>,
}

struct ImageInner {
    kind: ImageKind,
    pixels: RefCell<PixelData>,
    palette: RefCell<Option<Arc<Palette>>>,
    path: RefCell<Option<PathBuf>>,
    spatial: Option<SpatialAttrs>,
    pixels_modified: Signal<PixelRegion>,
    shape_changed: Signal<ShapeChange>,
}

/// Shared handle to one raster image.
#[derive(Clone)]
pub struct Image {
    inner: Rc<ImageInner>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pixels = self.inner.pixels.borrow();
        f.debug_struct("Image")
            .field("kind", &self.inner.kind)
            .field("dtype", &pixels.dtype())
            .field("shape", &pixels.shape())
            .field("indexed", &self.inner.palette.borrow().is_some())
            .field("path", &self.inner.path.borrow())
            .finish()
    }
}

impl Image {
    /// A 2D image; `pixels` is `[rows, cols]` or `[rows, cols, 3|4]`.
    pub fn flat(pixels: impl Into<PixelData>, palette: Option<Arc<Palette>>) -> Result<Self> {
        Self::new(ImageKind::Flat, pixels.into(), palette, None)
    }

    /// A `[slices, rows, cols]` volume.
    pub fn volume(
        pixels: impl Into<PixelData>,
        palette: Option<Arc<Palette>>,
        spatial: Option<SpatialAttrs>,
    ) -> Result<Self> {
        Self::new(ImageKind::Volume, pixels.into(), palette, spatial)
    }

    pub fn new(
        kind: ImageKind,
        pixels: PixelData,
        palette: Option<Arc<Palette>>,
        spatial: Option<SpatialAttrs>,
    ) -> Result<Self> {
        check_kind(kind, &pixels, palette.is_some())?;
        Ok(Self::from_parts(kind, pixels, palette, spatial))
    }

    fn from_parts(
        kind: ImageKind,
        pixels: PixelData,
        palette: Option<Arc<Palette>>,
        spatial: Option<SpatialAttrs>,
    ) -> Self {
        Self {
            inner: Rc::new(ImageInner {
                kind,
                pixels: RefCell::new(pixels),
                palette: RefCell::new(palette),
                path: RefCell::new(None),
                spatial,
                pixels_modified: Signal::new(),
                shape_changed: Signal::new(),
            }),
        }
    }

    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        *self.inner.path.borrow_mut() = Some(path.into());
        self
    }

    /// Same-grid, same-spatial indexed image filled with index 0.
    ///
    /// Flat color images produce a `[rows, cols]` mask. The new image has no
    /// path; it was never loaded from anywhere.
    pub fn zeros_mask(&self, palette: Arc<Palette>) -> Image {
        let grid = self.grid_shape();
        Self::from_parts(
            self.inner.kind,
            PixelData::zeros_u8(&grid),
            Some(palette),
            self.inner.spatial.clone(),
        )
    }

    // ------------------------------------------------------------------
    // Mutation (always followed by notifications)
    // ------------------------------------------------------------------

    /// Replace the whole buffer.
    ///
    /// The new buffer must keep the element type and rank of the current one.
    /// `shape_changed` fires only if the dimensions differ; `pixels_modified`
    /// always fires, for the full new frame.
    pub fn set_pixels(&self, pixels: impl Into<PixelData>) -> Result<()> {
        let pixels = pixels.into();
        let old_shape = {
            let current = self.inner.pixels.borrow();
            if current.dtype() != pixels.dtype() || current.ndim() != pixels.ndim() {
                return Err(VisionError::ShapeMismatch(format!(
                    "cannot replace {} {:?} pixels with {} {:?}",
                    current.dtype().name(),
                    current.shape(),
                    pixels.dtype().name(),
                    pixels.shape()
                )));
            }
            current.shape().to_vec()
        };
        check_kind(self.inner.kind, &pixels, self.is_indexed())?;

        let new_shape = pixels.shape().to_vec();
        *self.inner.pixels.borrow_mut() = pixels;

        if old_shape != new_shape {
            self.inner.shape_changed.emit(&ShapeChange {
                old: old_shape,
                new: new_shape.clone(),
            });
        }
        self.inner.pixels_modified.emit(&PixelRegion::full(&new_shape));
        Ok(())
    }

    /// Mutate samples in place, then emit `pixels_modified(region)`.
    ///
    /// `region` is the box the caller promises to have touched. The closure
    /// receives a mutable view of the whole buffer and must not call back
    /// into this image.
    pub fn modify_pixels(&self, region: PixelRegion, f: impl FnOnce(PixelsMut<'_>)) -> Result<()> {
        {
            let mut pixels = self.inner.pixels.borrow_mut();
            region.check_within(pixels.shape())?;
            f(pixels.view_mut());
        }
        self.inner.pixels_modified.emit(&region);
        Ok(())
    }

    /// Announce that samples inside `region` changed by some other route
    /// (e.g. a buffer filled by a collaborator through [`Image::modify_pixels`]
    /// with several passes).
    pub fn emit_pixels_modified(&self, region: PixelRegion) -> Result<()> {
        region.check_within(self.inner.pixels.borrow().shape())?;
        self.inner.pixels_modified.emit(&region);
        Ok(())
    }

    /// Install a different palette object (or drop it). Display of every
    /// sample changes, so the full frame is reported modified.
    pub fn set_palette(&self, palette: Option<Arc<Palette>>) -> Result<()> {
        check_kind(self.inner.kind, &self.inner.pixels.borrow(), palette.is_some())?;
        *self.inner.palette.borrow_mut() = palette;
        let shape = self.shape();
        self.inner.pixels_modified.emit(&PixelRegion::full(&shape));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn kind(&self) -> ImageKind {
        self.inner.kind
    }

    pub fn dtype(&self) -> DType {
        self.inner.pixels.borrow().dtype()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.pixels.borrow().shape().to_vec()
    }

    /// The pixel grid other layers must match: `[rows, cols]` for flat
    /// images, `[slices, rows, cols]` for volumes.
    pub fn grid_shape(&self) -> Vec<usize> {
        let pixels = self.inner.pixels.borrow();
        let shape = pixels.shape();
        let axes = match self.inner.kind {
            ImageKind::Flat => 2,
            ImageKind::Volume => 3,
        };
        shape[..axes.min(shape.len())].to_vec()
    }

    /// `(rows, cols)` of one display plane.
    pub fn plane_size(&self) -> (usize, usize) {
        let grid = self.grid_shape();
        match grid.as_slice() {
            [.., rows, cols] => (*rows, *cols),
            _ => (0, 0),
        }
    }

    pub fn slice_count(&self) -> usize {
        match self.inner.kind {
            ImageKind::Flat => 1,
            ImageKind::Volume => self.inner.pixels.borrow().shape().first().copied().unwrap_or(0),
        }
    }

    pub fn palette(&self) -> Option<Arc<Palette>> {
        self.inner.palette.borrow().clone()
    }

    pub fn is_indexed(&self) -> bool {
        self.inner.palette.borrow().is_some()
    }

    pub fn spatial(&self) -> Option<&SpatialAttrs> {
        self.inner.spatial.as_ref()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.path.borrow().clone()
    }

    pub fn set_path(&self, path: Option<PathBuf>) {
        *self.inner.path.borrow_mut() = path;
    }

    /// File name of the source path, used for titles and journal rows.
    pub fn path_name(&self) -> Option<String> {
        self.inner
            .path
            .borrow()
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Borrow the samples for the duration of `f`.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&PixelData) -> R) -> R {
        f(&self.inner.pixels.borrow())
    }

    /// Owned copy of the samples (for hand-off to worker threads).
    pub fn pixels_snapshot(&self) -> PixelData {
        self.inner.pixels.borrow().clone()
    }

    /// The `n`-th `[rows, cols]` plane of a volume.
    pub fn slice(&self, n: usize) -> Result<PixelData> {
        if self.inner.kind != ImageKind::Volume {
            return Err(VisionError::ShapeMismatch("only volumes have slices".into()));
        }
        let count = self.slice_count();
        if n >= count {
            return Err(VisionError::Validation(format!(
                "slice {} out of range (volume has {} slices)",
                n, count
            )));
        }
        let pixels = self.inner.pixels.borrow();
        Ok(match &*pixels {
            PixelData::U8(a) => PixelData::U8(a.index_axis(Axis(0), n).to_owned()),
            PixelData::U16(a) => PixelData::U16(a.index_axis(Axis(0), n).to_owned()),
            PixelData::F32(a) => PixelData::F32(a.index_axis(Axis(0), n).to_owned()),
        })
    }

    /// Premultiplied RGBA of the plane that would be on screen. `slice` is
    /// ignored for flat images.
    pub fn to_display_rgba(&self, slice: usize) -> Result<RgbaImage> {
        let pixels = self.inner.pixels.borrow();
        let palette = self.inner.palette.borrow();
        let plane = match self.inner.kind {
            ImageKind::Flat => None,
            ImageKind::Volume => Some(slice),
        };
        plane_to_rgba(&pixels, palette.as_deref(), plane)
    }

    pub fn pixels_modified(&self) -> &Signal<PixelRegion> {
        &self.inner.pixels_modified
    }

    pub fn shape_changed(&self) -> &Signal<ShapeChange> {
        &self.inner.shape_changed
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Image, b: &Image) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

fn check_kind(kind: ImageKind, pixels: &PixelData, indexed: bool) -> Result<()> {
    let shape = pixels.shape();
    let ok = match kind {
        ImageKind::Flat => {
            shape.len() == 2 || (shape.len() == 3 && matches!(shape[2], 3 | 4) && !indexed)
        }
        ImageKind::Volume => shape.len() == 3,
    };
    if !ok {
        return Err(VisionError::ShapeMismatch(format!(
            "{:?} {}image cannot hold samples of shape {:?}",
            kind,
            if indexed { "indexed " } else { "" },
            shape
        )));
    }
    if indexed && !pixels.dtype().is_integer() {
        return Err(VisionError::ShapeMismatch(format!(
            "indexed images need integer samples, got {}",
            pixels.dtype().name()
        )));
    }
    Ok(())
}

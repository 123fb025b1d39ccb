//! Ordered, name-indexed stack of layers.
//!
//! Index 0 is the base layer. Its pixel grid defines the footprint of the
//! whole stack; every other layer holding an image must match it. Layers
//! are only ever appended, so z-order equals insertion order.
//!
//! Structural changes use a four-phase protocol. `layer_adding` fires while
//! the layer is not yet visible through any lookup and `layer_added` once it
//! is; `layer_removing` fires while the layer is still fully present and
//! `layer_removed` once it is gone from both the sequence and the name index.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Result, VisionError};
use crate::image::{Image, ImageKind, PixelData};
use crate::layer::{ImageLayer, Visibility};
use crate::palette::Palette;
use crate::signal::{DataStorage, Signal, Subscription};
use crate::{log_info, log_warn};

/// Payload of the structural layer signals: the layer and its (final or
/// last) position in the stack.
pub type LayerEvent = (ImageLayer, usize);

#[derive(Default)]
struct LayeredInner {
    layers: RefCell<Vec<ImageLayer>>,
    by_name: RefCell<HashMap<String, ImageLayer>>,
    layer_adding: Signal<LayerEvent>,
    layer_added: Signal<LayerEvent>,
    layer_removing: Signal<LayerEvent>,
    layer_removed: Signal<LayerEvent>,
    changed: Signal<()>,
}

/// Shared handle to a layer stack.
#[derive(Clone, Default)]
pub struct LayeredImage {
    inner: Rc<LayeredInner>,
}

impl fmt::Debug for LayeredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.inner.layers.borrow().iter().map(|l| l.name().to_owned()).collect();
        f.debug_struct("LayeredImage").field("layers", &names).finish()
    }
}

impl LayeredImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack with a single base layer holding `image`.
    pub fn from_image(image: Image, name: impl Into<String>) -> Result<Self> {
        let layered = Self::new();
        layered.add_layer_from_image(image, name, Visibility::default())?;
        Ok(layered)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.inner.layers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.layers.borrow().is_empty()
    }

    /// Snapshot of the stack, bottom to top.
    pub fn layers(&self) -> Vec<ImageLayer> {
        self.inner.layers.borrow().clone()
    }

    pub fn layer(&self, index: usize) -> Option<ImageLayer> {
        self.inner.layers.borrow().get(index).cloned()
    }

    pub fn base_layer(&self) -> Option<ImageLayer> {
        self.layer(0)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<ImageLayer> {
        self.inner.by_name.borrow().get(name).cloned()
    }

    pub fn contains_layer(&self, layer: &ImageLayer) -> bool {
        self.layer_index(layer).is_some()
    }

    pub fn layer_index(&self, layer: &ImageLayer) -> Option<usize> {
        self.inner
            .layers
            .borrow()
            .iter()
            .position(|l| ImageLayer::ptr_eq(l, layer))
    }

    /// Source directory of the base layer.
    pub fn path(&self) -> Option<PathBuf> {
        self.base_layer().and_then(|l| l.path())
    }

    /// Grid every non-base layer must match, if the base layer has an image.
    pub fn base_grid(&self) -> Option<Vec<usize>> {
        self.base_layer().and_then(|l| l.image()).map(|i| i.grid_shape())
    }

    /// One line per layer, bottom to top.
    pub fn describe_layers(&self) -> String {
        let mut out = String::new();
        for (index, layer) in self.inner.layers.borrow().iter().enumerate() {
            let image = match layer.image() {
                Some(img) => format!("{:?} {}", img.shape(), img.dtype().name()),
                None => "no image".to_owned(),
            };
            let _ = writeln!(out, "{}: '{}' ({}) {}", index, layer.name(), layer.id(), image);
        }
        out
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Append `layer` on top. Returns its index.
    pub fn add_layer(&self, layer: ImageLayer) -> Result<usize> {
        self.check_addable(&layer)?;

        let index = self.len();
        self.inner.layer_adding.emit(&(layer.clone(), index));
        // Handlers may have changed the stack.
        if let Err(e) = self.check_addable(&layer) {
            log_warn!("Layer '{}' conflicts after layer_adding: {}", layer.name(), e);
            return Err(e);
        }
        let index = self.len();
        {
            let mut layers = self.inner.layers.borrow_mut();
            let mut by_name = self.inner.by_name.borrow_mut();
            layers.push(layer.clone());
            by_name.insert(layer.name().to_owned(), layer.clone());
        }
        log_info!("Layer added: '{}' ({}) at index {}", layer.name(), layer.id(), index);
        self.inner.layer_added.emit(&(layer, index));
        self.notify_changed();
        Ok(index)
    }

    fn check_addable(&self, layer: &ImageLayer) -> Result<()> {
        if self.inner.by_name.borrow().contains_key(layer.name()) {
            return Err(VisionError::Validation(format!(
                "a layer named '{}' already exists",
                layer.name()
            )));
        }
        if self.contains_layer(layer) {
            return Err(VisionError::Validation(format!(
                "layer {} is already a member",
                layer.id()
            )));
        }
        if !self.is_empty()
            && let Some(image) = layer.image()
        {
            self.check_grid(layer.name(), &image)?;
        }
        Ok(())
    }

    pub fn add_layer_from_image(
        &self,
        image: Image,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Result<ImageLayer> {
        let layer = ImageLayer::new(Some(image), name, visibility);
        self.add_layer(layer.clone())?;
        Ok(layer)
    }

    /// Create layer `name` holding `image`, or swap the image of the existing
    /// layer in place (identity, visibility and viewer state survive).
    pub fn add_layer_or_modify_image(&self, name: &str, image: Image) -> Result<ImageLayer> {
        match self.layer_by_name(name) {
            Some(layer) => {
                if self.layer_index(&layer) != Some(0) {
                    self.check_grid(name, &image)?;
                }
                layer.set_image(Some(image));
                self.notify_changed();
                Ok(layer)
            }
            None => self.add_layer_from_image(image, name, Visibility::default()),
        }
    }

    /// Like [`Self::add_layer_or_modify_image`], but keeps the existing
    /// image object when it can take `pixels` through
    /// [`Image::set_pixels`]. `visibility` applies to a newly created layer only.
    pub fn add_layer_or_modify_pixels(
        &self,
        name: &str,
        pixels: PixelData,
        kind: ImageKind,
        palette: Option<Arc<Palette>>,
        visibility: Visibility,
    ) -> Result<ImageLayer> {
        let reusable = self.layer_by_name(name).and_then(|layer| {
            let image = layer.image()?;
            let compatible = image.kind() == kind
                && image.dtype() == pixels.dtype()
                && image.shape().len() == pixels.ndim();
            compatible.then_some((layer, image))
        });

        match reusable {
            Some((layer, image)) => {
                if self.layer_index(&layer) != Some(0) {
                    let candidate_grid = &pixels.shape()[..image.grid_shape().len().min(pixels.ndim())];
                    self.check_grid_shape(name, candidate_grid)?;
                }
                let same_palette = match (image.palette(), &palette) {
                    (Some(a), Some(b)) => Arc::ptr_eq(&a, b),
                    (None, None) => true,
                    _ => false,
                };
                if !same_palette {
                    image.set_palette(palette)?;
                }
                image.set_pixels(pixels)?;
                self.notify_changed();
                Ok(layer)
            }
            None => {
                let image = Image::new(kind, pixels, palette, None)?;
                if self.layer_by_name(name).is_some() {
                    self.add_layer_or_modify_image(name, image)
                } else {
                    self.add_layer_from_image(image, name, visibility)
                }
            }
        }
    }

    /// Remove `layer`. `NotFound` if it is not a member.
    pub fn remove_layer(&self, layer: &ImageLayer) -> Result<()> {
        let Some(index) = self.layer_index(layer) else {
            return Err(VisionError::NotFound(format!(
                "layer '{}' ({}) is not in this layered image",
                layer.name(),
                layer.id()
            )));
        };

        let event = (layer.clone(), index);
        self.inner.layer_removing.emit(&event);
        // Handlers may have changed the stack.
        let Some(index) = self.layer_index(layer) else {
            log_warn!("Layer '{}' vanished during layer_removing", layer.name());
            return Ok(());
        };
        {
            let mut layers = self.inner.layers.borrow_mut();
            let mut by_name = self.inner.by_name.borrow_mut();
            layers.remove(index);
            by_name.remove(layer.name());
        }
        log_info!("Layer removed: '{}' ({}) from index {}", layer.name(), layer.id(), index);
        self.inner.layer_removed.emit(&(layer.clone(), index));
        self.notify_changed();
        Ok(())
    }

    pub fn remove_layer_by_name(&self, name: &str) -> Result<ImageLayer> {
        let layer = self
            .layer_by_name(name)
            .ok_or_else(|| VisionError::NotFound(format!("no layer named '{}'", name)))?;
        self.remove_layer(&layer)?;
        Ok(layer)
    }

    fn check_grid(&self, name: &str, image: &Image) -> Result<()> {
        self.check_grid_shape(name, &image.grid_shape())
    }

    fn check_grid_shape(&self, name: &str, grid: &[usize]) -> Result<()> {
        match self.base_grid() {
            Some(base) if base.as_slice() != grid => Err(VisionError::Validation(format!(
                "layer '{}' has grid {:?}, base layer has {:?}",
                name, grid, base
            ))),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    pub fn layer_adding(&self) -> &Signal<LayerEvent> {
        &self.inner.layer_adding
    }

    pub fn layer_added(&self) -> &Signal<LayerEvent> {
        &self.inner.layer_added
    }

    pub fn layer_removing(&self) -> &Signal<LayerEvent> {
        &self.inner.layer_removing
    }

    pub fn layer_removed(&self) -> &Signal<LayerEvent> {
        &self.inner.layer_removed
    }

    pub fn ptr_eq(a: &LayeredImage, b: &LayeredImage) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl DataStorage for LayeredImage {
    fn on_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.changed.connect(move |_| callback())
    }

    fn notify_changed(&self) {
        self.inner.changed.emit(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::cell::Cell;

    fn gray(rows: usize, cols: usize) -> Image {
        Image::flat(Array2::<u8>::zeros((rows, cols)), None).unwrap()
    }

    #[test]
    fn duplicate_names_are_rejected_without_side_effects() {
        let layered = LayeredImage::from_image(gray(4, 4), "image").unwrap();
        let err = layered.add_layer_from_image(gray(4, 4), "image", Visibility::default());
        assert!(matches!(err, Err(VisionError::Validation(_))));
        assert_eq!(layered.len(), 1);
    }

    #[test]
    fn same_layer_cannot_be_added_twice() {
        let layered = LayeredImage::new();
        let layer = ImageLayer::from_image(gray(2, 2), "");
        layered.add_layer(layer.clone()).unwrap();
        assert!(layered.add_layer(layer).is_err());
    }

    #[test]
    fn mismatched_grid_is_a_validation_error() {
        let layered = LayeredImage::from_image(gray(4, 4), "image").unwrap();
        let err = layered.add_layer_from_image(gray(4, 5), "mask", Visibility::default());
        assert!(matches!(err, Err(VisionError::Validation(_))));
        assert!(layered.layer_by_name("mask").is_none());
    }

    #[test]
    fn adding_handler_that_takes_the_name_wins() {
        let layered = LayeredImage::from_image(gray(2, 2), "image").unwrap();
        let nested_done = Rc::new(Cell::new(false));
        let (inner, done) = (layered.clone(), Rc::clone(&nested_done));
        let _sub = layered.layer_adding().connect(move |(layer, _)| {
            if layer.name() == "mask" && !done.replace(true) {
                inner
                    .add_layer(ImageLayer::from_image(gray(2, 2), "mask"))
                    .unwrap();
            }
        });

        let outer = ImageLayer::from_image(gray(2, 2), "mask");
        let err = layered.add_layer(outer.clone());
        assert!(matches!(err, Err(VisionError::Validation(_))));
        assert!(nested_done.get());
        let names: Vec<String> = layered.layers().iter().map(|l| l.name().to_owned()).collect();
        assert_eq!(names, vec!["image", "mask"]);
        assert!(!layered.contains_layer(&outer));
        assert_eq!(layered.layer_index(&layered.layer_by_name("mask").unwrap()), Some(1));
    }

    #[test]
    fn removing_a_stranger_is_not_found() {
        let layered = LayeredImage::from_image(gray(2, 2), "image").unwrap();
        let stranger = ImageLayer::from_image(gray(2, 2), "image");
        assert!(matches!(layered.remove_layer(&stranger), Err(VisionError::NotFound(_))));
        assert!(matches!(layered.remove_layer_by_name("mask"), Err(VisionError::NotFound(_))));
        assert_eq!(layered.len(), 1);
    }

    #[test]
    fn modify_pixels_path_keeps_image_identity() {
        let layered = LayeredImage::from_image(gray(3, 3), "image").unwrap();
        let palette = Palette::default_soft([0, 255, 0]).shared();
        let first = layered
            .add_layer_or_modify_pixels(
                "mask",
                Array2::<u8>::zeros((3, 3)).into(),
                ImageKind::Flat,
                Some(Arc::clone(&palette)),
                Visibility::new(true, 0.5),
            )
            .unwrap();
        let image = first.image().unwrap();
        let second = layered
            .add_layer_or_modify_pixels(
                "mask",
                Array2::<u8>::ones((3, 3)).into(),
                ImageKind::Flat,
                Some(palette),
                Visibility::default(),
            )
            .unwrap();
        assert!(ImageLayer::ptr_eq(&first, &second));
        assert!(Image::ptr_eq(&image, &second.image().unwrap()));
        assert_eq!(image.with_pixels(|p| p.value_at(&[2, 2])), Some(1.0));
        assert_eq!(second.visibility().opacity, 0.5);
        assert_eq!(layered.len(), 2);
    }

    #[test]
    fn changed_fires_on_structure_and_content_updates() {
        let layered = LayeredImage::from_image(gray(2, 2), "image").unwrap();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = layered.on_changed(move || h.set(h.get() + 1));
        layered.add_layer_or_modify_image("mask", gray(2, 2)).unwrap();
        layered.add_layer_or_modify_image("mask", gray(2, 2)).unwrap();
        layered.remove_layer_by_name("mask").unwrap();
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn describe_lists_layers_bottom_up() {
        let layered = LayeredImage::from_image(gray(2, 3), "image").unwrap();
        layered.add_layer(ImageLayer::new(None, "empty", Visibility::hidden())).unwrap();
        let text = layered.describe_layers();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0: 'image'"));
        assert!(lines[0].ends_with("[2, 3] uint8"));
        assert!(lines[1].ends_with("no image"));
    }
}

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{Result, VisionError};
use crate::id::LayerId;
use crate::image::ImageKind;
use crate::layer::{ImageLayer, Visibility, WeakImageLayer, clamp_opacity};
use crate::signal::Subscription;

struct ViewInner {
    layer: WeakImageLayer,
    layer_id: LayerId,
    name: String,
    visible: Cell<bool>,
    opacity: Cell<f32>,
    slice_number: Cell<usize>,
    bitmap: RefCell<Option<Arc<RgbaImage>>>,
    detached: Cell<bool>,
    subscriptions: RefCell<Vec<Subscription>>,
    repaint: Rc<dyn Fn()>,
}

/// Viewer-local projection of one [`ImageLayer`].
///
/// Holds only a weak reference to its layer and a lazily built premultiplied
/// bitmap. `visible` / `opacity` start from the layer's model visibility and
/// are then owned by the view, so two viewers can show the same layer
/// differently.
#[derive(Clone)]
pub struct LayerView {
    inner: Rc<ViewInner>,
}

impl fmt::Debug for LayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerView")
            .field("layer", &self.inner.name)
            .field("visible", &self.inner.visible.get())
            .field("opacity", &self.inner.opacity.get())
            .field("cached", &self.inner.bitmap.borrow().is_some())
            .field("detached", &self.inner.detached.get())
            .finish()
    }
}

impl LayerView {
    /// `repaint` is invoked whenever the view needs to be drawn again.
    pub(crate) fn new(layer: &ImageLayer, repaint: Rc<dyn Fn()>) -> Self {
        let Visibility { visible, opacity } = layer.visibility();
        let view = Self {
            inner: Rc::new(ViewInner {
                layer: layer.downgrade(),
                layer_id: layer.id(),
                name: layer.name().to_owned(),
                visible: Cell::new(visible),
                opacity: Cell::new(opacity),
                slice_number: Cell::new(0),
                bitmap: RefCell::new(None),
                detached: Cell::new(false),
                subscriptions: RefCell::new(Vec::new()),
                repaint,
            }),
        };

        let weak = Rc::downgrade(&view.inner);
        let updated = layer.image_updated().connect(move |image| {
            if let Some(inner) = weak.upgrade() {
                let slices = image.as_ref().map_or(1, |i| i.slice_count().max(1));
                if inner.slice_number.get() >= slices {
                    inner.slice_number.set(slices - 1);
                }
                LayerView { inner }.invalidate();
            }
        });
        let weak = Rc::downgrade(&view.inner);
        let modified = layer.image_pixels_modified().connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                LayerView { inner }.invalidate();
            }
        });
        let weak = Rc::downgrade(&view.inner);
        let reshaped = layer.image_shape_changed().connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                LayerView { inner }.invalidate();
            }
        });
        *view.inner.subscriptions.borrow_mut() = vec![updated, modified, reshaped];
        view
    }

    pub fn layer_id(&self) -> LayerId {
        self.inner.layer_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The viewed layer; `StaleReference` once the layer left the viewer.
    pub fn layer(&self) -> Result<ImageLayer> {
        if self.inner.detached.get() {
            return Err(self.stale());
        }
        self.inner.layer.upgrade().ok_or_else(|| self.stale())
    }

    /// Premultiplied RGBA of the current plane, rebuilt after invalidation.
    /// `Ok(None)` when the layer holds no image.
    pub fn displayed_bitmap(&self) -> Result<Option<Arc<RgbaImage>>> {
        let layer = self.layer()?;
        if let Some(bitmap) = self.inner.bitmap.borrow().as_ref() {
            return Ok(Some(Arc::clone(bitmap)));
        }
        let Some(image) = layer.image() else {
            return Ok(None);
        };
        let slice = match image.kind() {
            ImageKind::Flat => 0,
            ImageKind::Volume => self.inner.slice_number.get().min(image.slice_count().saturating_sub(1)),
        };
        let bitmap = Arc::new(image.to_display_rgba(slice)?);
        *self.inner.bitmap.borrow_mut() = Some(Arc::clone(&bitmap));
        Ok(Some(bitmap))
    }

    pub fn is_cached(&self) -> bool {
        self.inner.bitmap.borrow().is_some()
    }

    /// Drop the cached bitmap and ask for a repaint.
    pub fn invalidate(&self) {
        self.inner.bitmap.borrow_mut().take();
        (self.inner.repaint)();
    }

    pub fn visible(&self) -> bool {
        self.inner.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        if self.inner.visible.replace(visible) != visible {
            (self.inner.repaint)();
        }
    }

    pub fn opacity(&self) -> f32 {
        self.inner.opacity.get()
    }

    pub fn set_opacity(&self, opacity: f32) {
        let opacity = clamp_opacity(opacity);
        if self.inner.opacity.replace(opacity) != opacity {
            (self.inner.repaint)();
        }
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::new(self.visible(), self.opacity())
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.set_visible(visibility.visible);
        self.set_opacity(visibility.opacity);
    }

    pub fn slice_number(&self) -> usize {
        self.inner.slice_number.get()
    }

    /// Select the displayed plane of a volume layer. Flat layers ignore it.
    pub fn set_slice_number(&self, slice: usize) {
        if self.inner.slice_number.replace(slice) != slice {
            self.invalidate();
        }
    }

    /// Disconnect from the layer for good. Every later read fails with
    /// `StaleReference`.
    pub(crate) fn detach(&self) {
        self.inner.detached.set(true);
        self.inner.subscriptions.borrow_mut().clear();
        self.inner.bitmap.borrow_mut().take();
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.get()
    }

    fn stale(&self) -> VisionError {
        VisionError::StaleReference(format!(
            "layer '{}' ({}) is no longer shown by this viewer",
            self.inner.name, self.inner.layer_id
        ))
    }

    pub fn ptr_eq(a: &LayerView, b: &LayerView) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, PixelRegion, PixelsMut};
    use crate::palette::Palette;
    use ndarray::{Array2, Array3};

    fn no_repaint() -> Rc<dyn Fn()> {
        Rc::new(|| {})
    }

    #[test]
    fn view_copies_model_visibility_then_diverges() {
        let layer = ImageLayer::new(None, "mask", Visibility::new(false, 0.3));
        let view = LayerView::new(&layer, no_repaint());
        assert!(!view.visible());
        assert_eq!(view.opacity(), 0.3);
        view.set_opacity(2.0);
        assert_eq!(view.opacity(), 1.0);
        assert_eq!(layer.visibility().opacity, 0.3);
    }

    #[test]
    fn bitmap_is_cached_until_pixels_change() {
        let image = Image::flat(Array2::<u8>::zeros((2, 2)), None).unwrap();
        let layer = ImageLayer::from_image(image.clone(), "image");
        let view = LayerView::new(&layer, no_repaint());

        let first = view.displayed_bitmap().unwrap().unwrap();
        let again = view.displayed_bitmap().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        image
            .modify_pixels(PixelRegion::rect(0, 0, 1, 1), |p| {
                if let PixelsMut::U8(mut a) = p {
                    a.fill(7);
                }
            })
            .unwrap();
        assert!(!view.is_cached());
        let after = view.displayed_bitmap().unwrap().unwrap();
        assert_eq!(after.get_pixel(0, 0).0, [7, 7, 7, 255]);
    }

    #[test]
    fn palette_swap_invalidates() {
        let mask = Image::flat(Array2::<u8>::ones((1, 1)), Some(Palette::default_soft([0, 255, 0]).shared())).unwrap();
        let layer = ImageLayer::from_image(mask.clone(), "mask");
        let view = LayerView::new(&layer, no_repaint());
        let green = view.displayed_bitmap().unwrap().unwrap();
        mask.set_palette(Some(Palette::default_soft([255, 0, 0]).shared())).unwrap();
        let red = view.displayed_bitmap().unwrap().unwrap();
        assert_ne!(green.get_pixel(0, 0), red.get_pixel(0, 0));
    }

    #[test]
    fn volume_view_displays_selected_slice() {
        let mut data = Array3::<u8>::zeros((3, 1, 1));
        data[[2, 0, 0]] = 200;
        let layer = ImageLayer::from_image(Image::volume(data, None, None).unwrap(), "ct");
        let repaints = Rc::new(Cell::new(0));
        let r = Rc::clone(&repaints);
        let view = LayerView::new(&layer, Rc::new(move || r.set(r.get() + 1)));
        assert_eq!(view.displayed_bitmap().unwrap().unwrap().get_pixel(0, 0).0[0], 0);
        view.set_slice_number(2);
        assert_eq!(repaints.get(), 1);
        assert_eq!(view.displayed_bitmap().unwrap().unwrap().get_pixel(0, 0).0[0], 200);

        layer.set_image(Some(Image::volume(Array3::<u8>::zeros((2, 1, 1)), None, None).unwrap()));
        assert_eq!(view.slice_number(), 1);
    }

    #[test]
    fn detached_view_is_stale() {
        let layer = ImageLayer::new(None, "empty", Visibility::default());
        let view = LayerView::new(&layer, no_repaint());
        assert!(view.displayed_bitmap().unwrap().is_none());
        view.detach();
        assert!(matches!(view.displayed_bitmap(), Err(VisionError::StaleReference(_))));
        assert_eq!(layer.image_updated().subscriber_count(), 0);
    }
}

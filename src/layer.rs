//! A named slot in a layered image.
//!
//! An [`ImageLayer`] holds at most one [`Image`] and republishes that image's
//! `pixels_modified` / `shape_changed` notifications as its own, so observers
//! subscribe once per layer and survive image swaps.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::id::{IdAllocator, LayerId};
use crate::image::{Image, PixelRegion, ShapeChange};
use crate::log_info;
use crate::palette::Palette;
use crate::signal::{Signal, Subscription};

/// Model-side visibility of a layer. Viewers copy it into their layer views
/// when a view is created and may diverge from it afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visibility {
    pub visible: bool,
    pub opacity: f32,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
        }
    }
}

impl Visibility {
    /// `opacity` is clamped to `[0, 1]`.
    pub fn new(visible: bool, opacity: f32) -> Self {
        Self {
            visible,
            opacity: clamp_opacity(opacity),
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            opacity: 1.0,
        }
    }
}

pub(crate) fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) }
}

#[derive(Default)]
struct LayerState {
    image: Option<Image>,
    path: Option<PathBuf>,
    /// Connections to the current image's signals.
    forwarders: Vec<Subscription>,
}

struct LayerInner {
    id: LayerId,
    name: String,
    visibility: Cell<Visibility>,
    /// Bumped on every image replacement.
    generation: Cell<u64>,
    state: RefCell<LayerState>,
    image_updated: Signal<Option<Image>>,
    image_pixels_modified: Signal<PixelRegion>,
    image_shape_changed: Signal<ShapeChange>,
}

/// Shared handle to one layer. Clones refer to the same layer.
#[derive(Clone)]
pub struct ImageLayer {
    inner: Rc<LayerInner>,
}

/// Non-owning layer reference held by layer views.
#[derive(Clone, Default)]
pub struct WeakImageLayer {
    inner: Weak<LayerInner>,
}

impl WeakImageLayer {
    pub fn upgrade(&self) -> Option<ImageLayer> {
        self.inner.upgrade().map(|inner| ImageLayer { inner })
    }
}

impl fmt::Debug for ImageLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLayer")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("has_image", &self.inner.state.borrow().image.is_some())
            .field("visibility", &self.inner.visibility.get())
            .finish()
    }
}

impl ImageLayer {
    /// New layer with an id from the process-wide allocator. An empty `name`
    /// becomes `"Layer {id}"`.
    pub fn new(image: Option<Image>, name: impl Into<String>, visibility: Visibility) -> Self {
        Self::with_allocator(IdAllocator::process(), image, name, visibility)
    }

    pub fn with_allocator(
        ids: &IdAllocator,
        image: Option<Image>,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        let id = ids.next_layer_id();
        let mut name = name.into();
        if name.is_empty() {
            name = format!("Layer {}", id);
        }
        let layer = Self {
            inner: Rc::new(LayerInner {
                id,
                name,
                visibility: Cell::new(visibility),
                generation: Cell::new(0),
                state: RefCell::new(LayerState::default()),
                image_updated: Signal::new(),
                image_pixels_modified: Signal::new(),
                image_shape_changed: Signal::new(),
            }),
        };
        if let Some(image) = image {
            layer.install(Some(image));
        }
        layer
    }

    pub fn from_image(image: Image, name: impl Into<String>) -> Self {
        Self::new(Some(image), name, Visibility::default())
    }

    /// Layer holding an all-background mask on the grid of `reference`.
    pub fn zeros_mask_like(
        reference: &Image,
        palette: Arc<Palette>,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self::new(Some(reference.zeros_mask(palette)), name, visibility)
    }

    pub fn id(&self) -> LayerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn image(&self) -> Option<Image> {
        self.inner.state.borrow().image.clone()
    }

    pub fn has_image(&self) -> bool {
        self.inner.state.borrow().image.is_some()
    }

    /// Directory of the current image's source file.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.state.borrow().path.clone()
    }

    /// Palette of the current image.
    pub fn palette(&self) -> Option<Arc<Palette>> {
        self.inner.state.borrow().image.as_ref().and_then(Image::palette)
    }

    pub fn visibility(&self) -> Visibility {
        self.inner.visibility.get()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner
            .visibility
            .set(Visibility::new(visibility.visible, visibility.opacity));
    }

    /// Replace the image.
    ///
    /// No-op if `image` is the current image. Otherwise the layer disconnects
    /// from the old image, connects to the new one, refreshes `path`, and
    /// only then emits `image_updated`. A handler that replaces the image
    /// again stops delivery of the now outdated notification to the
    /// remaining handlers.
    pub fn set_image(&self, image: Option<Image>) {
        let unchanged = match (&self.inner.state.borrow().image, &image) {
            (Some(current), Some(new)) => Image::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        log_info!(
            "Layer '{}' ({}): image {}",
            self.inner.name,
            self.inner.id,
            if image.is_some() { "replaced" } else { "cleared" }
        );
        self.install(image.clone());

        let generation = self.inner.generation.get();
        let inner = &self.inner;
        inner
            .image_updated
            .emit_while(&image, || inner.generation.get() == generation);
    }

    fn install(&self, image: Option<Image>) {
        let old_forwarders = std::mem::take(&mut self.inner.state.borrow_mut().forwarders);
        drop(old_forwarders);

        let forwarders = image.as_ref().map(|img| self.forward(img)).unwrap_or_default();
        {
            let mut state = self.inner.state.borrow_mut();
            state.forwarders = forwarders;
            state.path = image
                .as_ref()
                .and_then(Image::path)
                .and_then(|p| p.parent().map(Path::to_path_buf));
            state.image = image;
        }
        self.inner.generation.set(self.inner.generation.get() + 1);
    }

    fn forward(&self, image: &Image) -> Vec<Subscription> {
        let weak = Rc::downgrade(&self.inner);
        let modified = image.pixels_modified().connect(move |region| {
            if let Some(inner) = weak.upgrade() {
                inner.image_pixels_modified.emit(region);
            }
        });
        let weak = Rc::downgrade(&self.inner);
        let reshaped = image.shape_changed().connect(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.image_shape_changed.emit(change);
            }
        });
        vec![modified, reshaped]
    }

    pub fn image_updated(&self) -> &Signal<Option<Image>> {
        &self.inner.image_updated
    }

    /// `pixels_modified` of whatever image the layer currently holds.
    pub fn image_pixels_modified(&self) -> &Signal<PixelRegion> {
        &self.inner.image_pixels_modified
    }

    pub fn image_shape_changed(&self) -> &Signal<ShapeChange> {
        &self.inner.image_shape_changed
    }

    pub fn downgrade(&self) -> WeakImageLayer {
        WeakImageLayer {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(a: &ImageLayer, b: &ImageLayer) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

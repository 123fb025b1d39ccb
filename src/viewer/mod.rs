//! Layered image viewer.
//!
//! A [`LayeredImageViewer`] shows one [`LayeredImage`] at a time. It keeps one
//! [`LayerView`] per layer in z-order, follows the stack's `layer_added` /
//! `layer_removed` notifications, tracks an active layer, composites the
//! visible views on demand, and owns the view transform (fit, smooth wheel
//! zoom, widget ↔ pixel mapping).
//!
//! The viewer never holds strong references to layers: views keep weak
//! handles and the active layer is stored by id.

mod composite;
pub mod layer_view;
pub mod transform;
pub mod zoom;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use image::RgbaImage;
use kurbo::{Point, Size, Vec2};

pub use composite::{CompositeLayer, composite, scaled, unpremultiplied};
pub use layer_view::LayerView;
pub use transform::ViewTransform;
pub use zoom::{SmoothZoom, ZoomConfig};

use crate::error::{Result, VisionError};
use crate::id::LayerId;
use crate::image::Image;
use crate::layer::ImageLayer;
use crate::layered::LayeredImage;
use crate::settings::ViewerSettings;
use crate::signal::{Signal, Subscription};
use crate::{log_info, log_warn};

#[derive(Default)]
struct ViewerState {
    data: Option<LayeredImage>,
    /// Bottom to top, parallel to the layers of `data`.
    views: Vec<LayerView>,
    active: Option<LayerId>,
    /// `image_updated` of the active layer.
    active_subscription: Option<Subscription>,
    data_subscriptions: Vec<Subscription>,
    transform: ViewTransform,
    viewport_size: Size,
    zoom: Option<SmoothZoom>,
}

struct ViewerInner {
    zoom_config: ZoomConfig,
    /// Opening opacity of views, keyed by layer name.
    view_opacities: RefCell<Vec<(String, f32)>>,
    state: RefCell<ViewerState>,
    repaint_pending: Cell<bool>,
    repaint_requested: Signal<()>,
    data_name_changed: Signal<Option<String>>,
    active_layer_changed: Signal<Option<ImageLayer>>,
    zoom_finished: Signal<f64>,
}

#[derive(Clone)]
pub struct LayeredImageViewer {
    inner: Rc<ViewerInner>,
}

impl fmt::Debug for LayeredImageViewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("LayeredImageViewer")
            .field("data", &state.data)
            .field("views", &state.views.len())
            .field("active", &state.active)
            .field("scale", &state.transform.scale())
            .finish()
    }
}

impl LayeredImageViewer {
    pub fn new(settings: &ViewerSettings) -> Self {
        let viewer = Self::with_zoom_config(ZoomConfig::from(settings));
        viewer.set_view_opacity_for(&settings.activation_map_layer_name, settings.activation_map_opacity);
        viewer
    }

    pub fn with_zoom_config(zoom_config: ZoomConfig) -> Self {
        Self {
            inner: Rc::new(ViewerInner {
                zoom_config,
                view_opacities: RefCell::new(Vec::new()),
                state: RefCell::new(ViewerState::default()),
                repaint_pending: Cell::new(false),
                repaint_requested: Signal::new(),
                data_name_changed: Signal::new(),
                active_layer_changed: Signal::new(),
                zoom_finished: Signal::new(),
            }),
        }
    }

    // ========================================================================
    // Data
    // ========================================================================

    pub fn data(&self) -> Option<LayeredImage> {
        self.inner.state.borrow().data.clone()
    }

    /// Show `data` (or nothing). All views and subscriptions of the previous
    /// data are torn down first; the topmost layer becomes active.
    pub fn set_data(&self, data: Option<LayeredImage>) {
        let same = match (&self.inner.state.borrow().data, &data) {
            (Some(a), Some(b)) => LayeredImage::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }

        let (old_views, old_subscriptions, old_active) = {
            let mut state = self.inner.state.borrow_mut();
            state.data = data.clone();
            state.active = None;
            state.zoom = None;
            (
                std::mem::take(&mut state.views),
                std::mem::take(&mut state.data_subscriptions),
                state.active_subscription.take(),
            )
        };
        drop(old_subscriptions);
        drop(old_active);
        for view in old_views {
            view.detach();
        }

        match &data {
            Some(layered) => {
                let subscriptions = self.subscribe_to(layered);
                let layers = layered.layers();
                let views: Vec<LayerView> = layers.iter().map(|l| self.make_view(l)).collect();
                {
                    let mut state = self.inner.state.borrow_mut();
                    state.data_subscriptions = subscriptions;
                    state.views = views;
                }
                log_info!("Viewer data set: {} layer(s)", layers.len());
                match layers.last() {
                    Some(top) => self.activate(top),
                    None => self.inner.active_layer_changed.emit(&None),
                }
            }
            None => {
                log_info!("Viewer data cleared");
                self.inner.active_layer_changed.emit(&None);
                self.inner.data_name_changed.emit(&None);
            }
        }
        self.request_repaint();
    }

    fn subscribe_to(&self, layered: &LayeredImage) -> Vec<Subscription> {
        let weak = Rc::downgrade(&self.inner);
        let added = layered.layer_added().connect(move |(layer, index)| {
            if let Some(inner) = weak.upgrade() {
                LayeredImageViewer { inner }.on_layer_added(layer, *index);
            }
        });
        let weak = Rc::downgrade(&self.inner);
        let removed = layered.layer_removed().connect(move |(layer, _)| {
            if let Some(inner) = weak.upgrade() {
                LayeredImageViewer { inner }.on_layer_removed(layer);
            }
        });
        vec![added, removed]
    }

    fn make_view(&self, layer: &ImageLayer) -> LayerView {
        let weak = Rc::downgrade(&self.inner);
        let view = LayerView::new(
            layer,
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    LayeredImageViewer { inner }.request_repaint();
                }
            }),
        );
        if let Some(opacity) = self.view_opacity_for(layer.name()) {
            view.set_opacity(opacity);
        }
        view
    }

    /// Views of layers named `name` open at `opacity` instead of the
    /// layer's own. Existing views are left alone.
    pub fn set_view_opacity_for(&self, name: &str, opacity: f32) {
        let mut opacities = self.inner.view_opacities.borrow_mut();
        match opacities.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = opacity,
            None => opacities.push((name.to_owned(), opacity)),
        }
    }

    pub fn view_opacity_for(&self, name: &str) -> Option<f32> {
        self.inner
            .view_opacities
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| *o)
    }

    fn on_layer_added(&self, layer: &ImageLayer, index: usize) {
        let view = self.make_view(layer);
        view.set_slice_number(self.slice_number());
        {
            let mut state = self.inner.state.borrow_mut();
            let at = index.min(state.views.len());
            state.views.insert(at, view);
        }
        self.activate(layer);
        self.request_repaint();
    }

    fn on_layer_removed(&self, layer: &ImageLayer) {
        let id = layer.id();
        let (removed, was_active, old_subscription) = {
            let mut state = self.inner.state.borrow_mut();
            let removed = state
                .views
                .iter()
                .position(|v| v.layer_id() == id)
                .map(|i| state.views.remove(i));
            let was_active = state.active == Some(id);
            let old_subscription = if was_active {
                state.active = None;
                state.active_subscription.take()
            } else {
                None
            };
            (removed, was_active, old_subscription)
        };
        drop(old_subscription);
        if let Some(view) = removed {
            view.detach();
        }
        if was_active {
            match self.layer_views().last().map(LayerView::layer) {
                Some(Ok(top)) => self.activate(&top),
                _ => {
                    self.inner.active_layer_changed.emit(&None);
                    self.inner.data_name_changed.emit(&None);
                }
            }
        }
        self.request_repaint();
    }

    // ========================================================================
    // Active layer
    // ========================================================================

    fn activate(&self, layer: &ImageLayer) {
        let weak = Rc::downgrade(&self.inner);
        let subscription = layer.image_updated().connect(move |image| {
            if let Some(inner) = weak.upgrade() {
                let name = image.as_ref().and_then(Image::path_name);
                inner.data_name_changed.emit(&name);
            }
        });
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            state.active = Some(layer.id());
            state.active_subscription.replace(subscription)
        };
        drop(previous);
        self.inner.active_layer_changed.emit(&Some(layer.clone()));
        self.inner.data_name_changed.emit(&self.data_name());
    }

    /// Make `layer` the active layer. It must be shown by this viewer.
    pub fn set_active_layer(&self, layer: &ImageLayer) -> Result<()> {
        if self.layer_view_by_model(layer).is_none() {
            return Err(VisionError::NotFound(format!(
                "layer '{}' ({}) is not shown by this viewer",
                layer.name(),
                layer.id()
            )));
        }
        if self.inner.state.borrow().active == Some(layer.id()) {
            return Ok(());
        }
        self.activate(layer);
        Ok(())
    }

    pub fn active_layer(&self) -> Option<ImageLayer> {
        self.active_layer_view().and_then(|v| v.layer().ok())
    }

    pub fn active_layer_view(&self) -> Option<LayerView> {
        let state = self.inner.state.borrow();
        let id = state.active?;
        state.views.iter().find(|v| v.layer_id() == id).cloned()
    }

    /// File name of the active layer's image (window title).
    pub fn data_name(&self) -> Option<String> {
        self.active_layer().and_then(|l| l.image()).and_then(|i| i.path_name())
    }

    // ========================================================================
    // Layer views
    // ========================================================================

    pub fn layer_views(&self) -> Vec<LayerView> {
        self.inner.state.borrow().views.clone()
    }

    pub fn layer_view_by_model(&self, layer: &ImageLayer) -> Option<LayerView> {
        let id = layer.id();
        self.inner
            .state
            .borrow()
            .views
            .iter()
            .find(|v| v.layer_id() == id)
            .cloned()
    }

    pub fn layer_view_by_name(&self, name: &str) -> Option<LayerView> {
        self.inner
            .state
            .borrow()
            .views
            .iter()
            .find(|v| v.name() == name)
            .cloned()
    }

    // ========================================================================
    // Slices
    // ========================================================================

    pub fn slice_count(&self) -> usize {
        self.data()
            .and_then(|d| d.base_layer())
            .and_then(|l| l.image())
            .map_or(1, |i| i.slice_count().max(1))
    }

    pub fn slice_number(&self) -> usize {
        self.layer_views().first().map_or(0, LayerView::slice_number)
    }

    /// Show plane `slice` (clamped) of every layer. Returns the plane shown.
    pub fn set_slice_number(&self, slice: usize) -> usize {
        let slice = slice.min(self.slice_count() - 1);
        for view in self.layer_views() {
            view.set_slice_number(slice);
        }
        slice
    }

    pub fn show_next_slice(&self) -> usize {
        self.set_slice_number(self.slice_number() + 1)
    }

    pub fn show_prev_slice(&self) -> usize {
        self.set_slice_number(self.slice_number().saturating_sub(1))
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// `(rows, cols)` of the base layer's plane.
    pub fn footprint(&self) -> Option<(usize, usize)> {
        self.data()
            .and_then(|d| d.base_layer())
            .and_then(|l| l.image())
            .map(|i| i.plane_size())
    }

    /// Composite of all visible views at image resolution (premultiplied).
    /// `Ok(None)` while there is nothing to show.
    pub fn render(&self) -> Result<Option<RgbaImage>> {
        let views = self.layer_views();
        let Some(base) = views.first() else {
            return Ok(None);
        };
        let Some(base_bitmap) = base.displayed_bitmap()? else {
            return Ok(None);
        };
        let (width, height) = base_bitmap.dimensions();

        let mut layers: Vec<CompositeLayer> = Vec::with_capacity(views.len());
        for view in &views {
            if !view.visible() {
                continue;
            }
            if let Some(bitmap) = view.displayed_bitmap()? {
                layers.push((bitmap, view.opacity()));
            }
        }
        composite(width, height, &layers).map(Some)
    }

    /// [`Self::render`] smooth-resampled to the current view scale.
    pub fn render_scaled(&self) -> Result<Option<RgbaImage>> {
        let scale = self.scale();
        Ok(self.render()?.map(|img| scaled(&img, scale)))
    }

    pub fn request_repaint(&self) {
        self.inner.repaint_pending.set(true);
        self.inner.repaint_requested.emit(&());
    }

    /// Returns and clears the pending-repaint flag.
    pub fn take_repaint_request(&self) -> bool {
        self.inner.repaint_pending.replace(false)
    }

    // ========================================================================
    // View transform
    // ========================================================================

    pub fn transform(&self) -> ViewTransform {
        self.inner.state.borrow().transform
    }

    pub fn scale(&self) -> f64 {
        self.inner.state.borrow().transform.scale()
    }

    pub fn set_viewport_offset(&self, offset: Vec2) {
        self.inner.state.borrow_mut().transform.viewport_offset = offset;
    }

    pub fn viewport_size(&self) -> Size {
        self.inner.state.borrow().viewport_size
    }

    /// Scale and center the base layer inside `viewport`, keeping its aspect
    /// ratio. Cancels a running zoom.
    pub fn fit_image_in(&self, viewport: Size) {
        let footprint = self
            .footprint()
            .map_or(Size::ZERO, |(rows, cols)| Size::new(cols as f64, rows as f64));
        {
            let mut state = self.inner.state.borrow_mut();
            state.viewport_size = viewport;
            state.zoom = None;
            state.transform.fit(footprint, viewport);
        }
        self.request_repaint();
    }

    /// `(row, col)` of the pixel under a widget position (may be out of range).
    pub fn viewport_pos_to_image_pixel_coords(&self, pos: Point) -> (i64, i64) {
        self.inner.state.borrow().transform.widget_to_pixel(pos)
    }

    /// Widget position of the center of pixel `(row, col)`.
    pub fn image_pixel_coords_to_viewport_pos(&self, row: i64, col: i64) -> Point {
        self.inner.state.borrow().transform.pixel_center_to_widget(row, col)
    }

    /// In-bounds pixel under a widget position.
    pub fn pixel_at(&self, pos: Point) -> Option<(usize, usize)> {
        let (rows, cols) = self.footprint()?;
        let (r, c) = self.viewport_pos_to_image_pixel_coords(pos);
        let inside = r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols;
        inside.then_some((r as usize, c as usize))
    }

    /// Immediate zoom about a widget position.
    pub fn zoom_by(&self, anchor: Point, factor: f64) {
        {
            let mut state = self.inner.state.borrow_mut();
            let anchor = anchor - state.transform.viewport_offset;
            let factor = zoom::clamp_factor(state.transform.scale(), factor, &self.inner.zoom_config);
            state.transform.zoom_about(anchor, factor);
        }
        self.request_repaint();
    }

    // ========================================================================
    // Smooth zoom
    // ========================================================================

    /// Start a smooth zoom about a widget position. A gesture already in
    /// flight is replaced; the new one continues from the current scale.
    pub fn wheel_zoom(&self, anchor: Point, delta: f64) {
        let mut state = self.inner.state.borrow_mut();
        let anchor = anchor - state.transform.viewport_offset;
        if let Some(zoom) = SmoothZoom::start(&self.inner.zoom_config, anchor, delta) {
            state.zoom = Some(zoom);
        }
    }

    /// Feed `elapsed` clock units to the running zoom. Returns whether a
    /// zoom is still running afterwards.
    pub fn advance_zoom(&self, elapsed: f64) -> bool {
        let (applied, finished, scale) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let Some(zoom) = state.zoom.as_mut() else {
                return false;
            };
            let due = zoom.advance(elapsed);
            for _ in 0..due {
                let factor = zoom::clamp_factor(state.transform.scale(), zoom.factor_per_tick, &self.inner.zoom_config);
                state.transform.zoom_about(zoom.anchor, factor);
            }
            let finished = zoom.is_finished();
            if finished {
                state.zoom = None;
            }
            (due > 0, finished, state.transform.scale())
        };
        if applied {
            self.request_repaint();
        }
        if finished {
            log_info!("Zoom finished at scale {:.3}", scale);
            self.inner.zoom_finished.emit(&scale);
        }
        !finished
    }

    /// One timer tick of the configured interval.
    pub fn tick_zoom(&self) -> bool {
        self.advance_zoom(self.inner.zoom_config.interval)
    }

    /// Stop the running zoom; the scale stays where the last tick left it.
    pub fn cancel_zoom(&self) {
        if self.inner.state.borrow_mut().zoom.take().is_some() {
            log_warn!("Zoom cancelled at scale {:.3}", self.scale());
        }
    }

    pub fn is_zooming(&self) -> bool {
        self.inner.state.borrow().zoom.is_some()
    }

    // ========================================================================
    // Signals
    // ========================================================================

    pub fn repaint_requested(&self) -> &Signal<()> {
        &self.inner.repaint_requested
    }

    pub fn data_name_changed(&self) -> &Signal<Option<String>> {
        &self.inner.data_name_changed
    }

    pub fn active_layer_changed(&self) -> &Signal<Option<ImageLayer>> {
        &self.inner.active_layer_changed
    }

    pub fn zoom_finished(&self) -> &Signal<f64> {
        &self.inner.zoom_finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Visibility;
    use crate::palette::Palette;
    use ndarray::{Array2, Array3};

    fn viewer() -> LayeredImageViewer {
        LayeredImageViewer::new(&ViewerSettings::default())
    }

    fn gray(rows: usize, cols: usize, v: u8) -> Image {
        Image::flat(Array2::<u8>::from_elem((rows, cols), v), None).unwrap()
    }

    #[test]
    fn views_follow_the_layer_stack() {
        let layered = LayeredImage::from_image(gray(4, 4, 10), "image").unwrap();
        let viewer = viewer();
        viewer.set_data(Some(layered.clone()));
        assert_eq!(viewer.layer_views().len(), 1);

        let mask = layered
            .add_layer_from_image(gray(4, 4, 0), "mask", Visibility::default())
            .unwrap();
        let names: Vec<String> = viewer.layer_views().iter().map(|v| v.name().to_owned()).collect();
        assert_eq!(names, vec!["image", "mask"]);
        assert!(ImageLayer::ptr_eq(&viewer.active_layer().unwrap(), &mask));

        layered.remove_layer(&mask).unwrap();
        assert_eq!(viewer.layer_views().len(), 1);
        assert_eq!(viewer.active_layer().unwrap().name(), "image");
    }

    #[test]
    fn switching_data_detaches_old_views() {
        let first = LayeredImage::from_image(gray(2, 2, 1), "image").unwrap();
        let second = LayeredImage::from_image(gray(3, 3, 2), "image").unwrap();
        let viewer = viewer();
        viewer.set_data(Some(first.clone()));
        let old_view = viewer.layer_views()[0].clone();
        viewer.set_data(Some(second));
        assert!(old_view.is_detached());
        assert_eq!(first.layer_added().subscriber_count(), 0);
        assert_eq!(first.base_layer().unwrap().image_updated().subscriber_count(), 0);
        assert_eq!(viewer.footprint(), Some((3, 3)));
    }

    #[test]
    fn active_layer_switch_moves_the_title_subscription() {
        let layered = LayeredImage::from_image(gray(2, 2, 0), "image").unwrap();
        let mask = layered
            .add_layer_from_image(gray(2, 2, 0), "mask", Visibility::default())
            .unwrap();
        let base = layered.base_layer().unwrap();
        let viewer = viewer();
        viewer.set_data(Some(layered));
        assert_eq!(mask.image_updated().subscriber_count(), 2);

        viewer.set_active_layer(&base).unwrap();
        assert_eq!(mask.image_updated().subscriber_count(), 1);
        assert_eq!(base.image_updated().subscriber_count(), 2);

        let titles = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::clone(&titles);
        let _sub = viewer.data_name_changed().connect(move |n| t.borrow_mut().push(n.clone()));
        base.set_image(Some(gray(2, 2, 5).with_path("/p/eye.png")));
        mask.set_image(Some(gray(2, 2, 5).with_path("/p/ignored.png")));
        assert_eq!(*titles.borrow(), vec![Some("eye.png".to_string())]);
    }

    #[test]
    fn render_skips_hidden_and_empty_layers() {
        let layered = LayeredImage::from_image(gray(2, 2, 100), "image").unwrap();
        let mask = Image::flat(
            Array2::<u8>::ones((2, 2)),
            Some(Palette::dense(vec![[0, 0, 0, 0], [255, 0, 0, 255]]).shared()),
        )
        .unwrap();
        layered.add_layer_from_image(mask, "mask", Visibility::default()).unwrap();
        layered
            .add_layer(ImageLayer::new(None, "empty", Visibility::default()))
            .unwrap();
        let viewer = viewer();
        viewer.set_data(Some(layered));

        let out = viewer.render().unwrap().unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0, 255]);

        viewer.layer_view_by_name("mask").unwrap().set_visible(false);
        let out = viewer.render().unwrap().unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn repaint_is_requested_on_pixel_change() {
        let image = gray(2, 2, 0);
        let layered = LayeredImage::from_image(image.clone(), "image").unwrap();
        let viewer = viewer();
        viewer.set_data(Some(layered));
        viewer.take_repaint_request();
        image.set_pixels(Array2::<u8>::ones((2, 2))).unwrap();
        assert!(viewer.take_repaint_request());
        assert!(!viewer.take_repaint_request());
    }

    #[test]
    fn slices_walk_within_range() {
        let volume = Image::volume(Array3::<u8>::zeros((3, 2, 2)), None, None).unwrap();
        let layered = LayeredImage::from_image(volume, "ct").unwrap();
        let viewer = viewer();
        viewer.set_data(Some(layered));
        assert_eq!(viewer.show_prev_slice(), 0);
        assert_eq!(viewer.show_next_slice(), 1);
        assert_eq!(viewer.show_next_slice(), 2);
        assert_eq!(viewer.show_next_slice(), 2);
    }

    #[test]
    fn smooth_zoom_runs_ten_ticks_and_keeps_the_anchor() {
        let viewer = viewer();
        viewer.set_data(Some(LayeredImage::from_image(gray(50, 50, 0), "image").unwrap()));
        let anchor = Point::new(20.2, 30.3);
        let pixel_before = viewer.viewport_pos_to_image_pixel_coords(anchor);
        let finished = Rc::new(Cell::new(None));
        let f = Rc::clone(&finished);
        let _sub = viewer.zoom_finished().connect(move |s| f.set(Some(*s)));

        viewer.wheel_zoom(anchor, 120.0);
        let mut ticks = 0;
        while viewer.tick_zoom() {
            ticks += 1;
        }
        assert_eq!(ticks + 1, 10);
        let expected = 1.025f64.powi(10);
        assert!((viewer.scale() - expected).abs() < 1e-9);
        assert_eq!(finished.get().map(|s| (s - expected).abs() < 1e-9), Some(true));
        assert_eq!(viewer.viewport_pos_to_image_pixel_coords(anchor), pixel_before);
    }

    #[test]
    fn new_gesture_replaces_and_cancel_keeps_scale() {
        let viewer = viewer();
        viewer.wheel_zoom(Point::ZERO, 1.0);
        viewer.tick_zoom();
        viewer.tick_zoom();
        viewer.wheel_zoom(Point::ZERO, -1.0);
        viewer.tick_zoom();
        let scale = viewer.scale();
        assert!((scale - 1.025 * 1.025 * 0.975).abs() < 1e-12);
        viewer.cancel_zoom();
        assert!(!viewer.is_zooming());
        assert!(!viewer.tick_zoom());
        assert_eq!(viewer.scale(), scale);
    }

    #[test]
    fn fit_then_pixel_lookup() {
        let viewer = viewer();
        viewer.set_data(Some(LayeredImage::from_image(gray(10, 20, 0), "image").unwrap()));
        viewer.fit_image_in(Size::new(40.0, 40.0));
        assert!((viewer.scale() - 2.0).abs() < 1e-12);
        assert_eq!(viewer.pixel_at(Point::new(1.0, 11.0)), Some((0, 0)));
        assert_eq!(viewer.pixel_at(Point::new(1.0, 1.0)), None);
    }
}

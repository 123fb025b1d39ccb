//! Viewer tools that maintain mask overlays.
//!
//! A [`LayeredImageViewerTool`] watches one "image layer" of the viewed
//! stack and keeps two indexed overlays in step with it: the persistent mask
//! layer and the scratch tool-mask layer. Both are created on demand as
//! all-background masks with an explicitly supplied palette.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Result, VisionError};
use crate::image::{Image, ImageKind, PixelRegion, PixelsMut};
use crate::layer::{ImageLayer, Visibility};
use crate::layered::LayeredImage;
use crate::palette::Palette;
use crate::settings::ViewerSettings;
use crate::signal::Subscription;
use crate::viewer::LayeredImageViewer;
use crate::{log_info, log_warn};

/// Which layer of the viewed stack a tool works on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerSelector {
    /// The viewer's active layer at activation time.
    ActiveLayer,
    Name(String),
    /// Position in the stack, 0 = base layer.
    Number(usize),
}

impl LayerSelector {
    pub fn select(&self, viewer: &LayeredImageViewer) -> Option<ImageLayer> {
        match self {
            LayerSelector::ActiveLayer => viewer.active_layer(),
            LayerSelector::Name(name) => viewer.data()?.layer_by_name(name),
            LayerSelector::Number(index) => viewer.data()?.layer(*index),
        }
    }
}

/// Name, palette and view opacity of an overlay layer.
#[derive(Clone, Debug)]
pub struct MaskLayerProperties {
    pub name: String,
    pub palette: Arc<Palette>,
    pub opacity: f32,
}

impl MaskLayerProperties {
    pub fn new(name: impl Into<String>, palette: Arc<Palette>, opacity: f32) -> Self {
        Self {
            name: name.into(),
            palette,
            opacity,
        }
    }

    /// Mask layer from the settings, with the caller's palette.
    pub fn mask(settings: &ViewerSettings, palette: Arc<Palette>) -> Self {
        Self::new(settings.mask_layer_name.clone(), palette, settings.mask_opacity)
    }

    pub fn tool_mask(settings: &ViewerSettings, palette: Arc<Palette>) -> Self {
        Self::new(settings.tool_mask_layer_name.clone(), palette, settings.tool_mask_opacity)
    }
}

#[derive(Default)]
struct ToolState {
    image_layer: Option<ImageLayer>,
    subscriptions: Vec<Subscription>,
}

struct ToolInner {
    viewer: LayeredImageViewer,
    image_layer_selector: LayerSelector,
    mask: MaskLayerProperties,
    tool_mask: MaskLayerProperties,
    state: RefCell<ToolState>,
}

#[derive(Clone)]
pub struct LayeredImageViewerTool {
    inner: Rc<ToolInner>,
}

impl LayeredImageViewerTool {
    pub fn new(
        viewer: LayeredImageViewer,
        image_layer_selector: LayerSelector,
        mask: MaskLayerProperties,
        tool_mask: MaskLayerProperties,
    ) -> Self {
        Self {
            inner: Rc::new(ToolInner {
                viewer,
                image_layer_selector,
                mask,
                tool_mask,
                state: RefCell::new(ToolState::default()),
            }),
        }
    }

    /// Bind to the selected image layer and create the overlays.
    pub fn activate(&self) -> Result<()> {
        let layer = self
            .inner
            .image_layer_selector
            .select(&self.inner.viewer)
            .ok_or_else(|| {
                VisionError::NotFound(format!(
                    "no layer matches {:?} in the viewed image",
                    self.inner.image_layer_selector
                ))
            })?;

        let weak = Rc::downgrade(&self.inner);
        let updated = layer.image_updated().connect(move |_| {
            if let Some(inner) = weak.upgrade()
                && let Err(e) = (LayeredImageViewerTool { inner }).update_masks()
            {
                log_warn!("Tool: could not update masks: {}", e);
            }
        });
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            state.image_layer = Some(layer.clone());
            std::mem::replace(&mut state.subscriptions, vec![updated])
        };
        drop(previous);
        log_info!("Tool activated on layer '{}'", layer.name());
        self.update_masks()
    }

    /// Drop every subscription. Overlay layers stay in the stack.
    pub fn deactivate(&self) {
        let subscriptions = {
            let mut state = self.inner.state.borrow_mut();
            state.image_layer = None;
            std::mem::take(&mut state.subscriptions)
        };
        drop(subscriptions);
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().image_layer.is_some()
    }

    pub fn image_layer(&self) -> Option<ImageLayer> {
        self.inner.state.borrow().image_layer.clone()
    }

    pub fn mask_layer(&self) -> Option<ImageLayer> {
        self.inner.viewer.data()?.layer_by_name(&self.inner.mask.name)
    }

    pub fn tool_mask_layer(&self) -> Option<ImageLayer> {
        self.inner.viewer.data()?.layer_by_name(&self.inner.tool_mask.name)
    }

    /// Bring the overlays in line with the current image: a missing or
    /// image-less mask becomes an empty mask, a mask on another grid is
    /// replaced, and the tool mask is always recreated empty.
    pub fn update_masks(&self) -> Result<()> {
        let Some(layered) = self.inner.viewer.data() else {
            return Ok(());
        };
        let Some(image) = self.image_layer().and_then(|l| l.image()) else {
            return Ok(());
        };

        let mask = &self.inner.mask;
        match layered.layer_by_name(&mask.name) {
            None => {
                create_zeros_mask_layer(&layered, &image, mask)?;
            }
            Some(layer) => {
                let stale = layer
                    .image()
                    .is_none_or(|current| current.grid_shape() != image.grid_shape());
                if stale {
                    layer.set_image(Some(image.zeros_mask(Arc::clone(&mask.palette))));
                }
            }
        }

        let tool_mask = &self.inner.tool_mask;
        layered.add_layer_or_modify_image(&tool_mask.name, image.zeros_mask(Arc::clone(&tool_mask.palette)))?;

        for props in [mask, tool_mask] {
            if let Some(view) = self.inner.viewer.layer_view_by_name(&props.name) {
                view.set_opacity(props.opacity);
            }
        }
        Ok(())
    }

    /// Write `value` into every mask pixel within `radius` of `(row, col)`.
    /// Volume masks are painted on the slice the viewer currently shows.
    pub fn paint_mask(&self, row: usize, col: usize, radius: usize, value: u8) -> Result<()> {
        let layer = self
            .mask_layer()
            .ok_or_else(|| VisionError::NotFound(format!("no mask layer '{}'", self.inner.mask.name)))?;
        let image = layer
            .image()
            .ok_or_else(|| VisionError::NotFound(format!("mask layer '{}' has no image", layer.name())))?;
        let slice = match self.inner.viewer.layer_view_by_name(layer.name()) {
            Some(view) => view.slice_number(),
            None => self.inner.viewer.slice_number(),
        };
        paint_disk(&image, slice, row, col, radius, value)
    }

    /// Reset the tool mask to background.
    pub fn clear_tool_mask(&self) -> Result<()> {
        let Some(image) = self.tool_mask_layer().and_then(|l| l.image()) else {
            return Ok(());
        };
        let shape = image.shape();
        image.modify_pixels(PixelRegion::full(&shape), |pixels| {
            if let PixelsMut::U8(mut a) = pixels {
                a.fill(0);
            }
        })
    }
}

/// Add layer `props.name` holding an empty mask on `reference`'s grid.
pub fn create_zeros_mask_layer(
    layered: &LayeredImage,
    reference: &Image,
    props: &MaskLayerProperties,
) -> Result<ImageLayer> {
    let layer = ImageLayer::zeros_mask_like(
        reference,
        Arc::clone(&props.palette),
        props.name.clone(),
        Visibility::new(true, props.opacity),
    );
    layered.add_layer(layer.clone())?;
    Ok(layer)
}

fn paint_disk(image: &Image, slice: usize, row: usize, col: usize, radius: usize, value: u8) -> Result<()> {
    let (rows, cols) = image.plane_size();
    if row >= rows || col >= cols {
        return Err(VisionError::Validation(format!(
            "pixel ({}, {}) outside {}x{} mask",
            row, col, rows, cols
        )));
    }
    let volume = image.kind() == ImageKind::Volume;
    if volume && slice >= image.slice_count() {
        return Err(VisionError::Validation(format!(
            "slice {} outside {}-slice mask",
            slice,
            image.slice_count()
        )));
    }
    let r0 = row.saturating_sub(radius);
    let c0 = col.saturating_sub(radius);
    let r1 = (row + radius + 1).min(rows);
    let c1 = (col + radius + 1).min(cols);
    let region = if volume {
        PixelRegion::new(vec![slice, r0, c0], vec![slice + 1, r1, c1])
    } else {
        PixelRegion::rect(r0, c0, r1 - r0, c1 - c0)
    };
    let r2 = (radius * radius) as i64;
    image.modify_pixels(region, |pixels| {
        let PixelsMut::U8(mut a) = pixels else { return };
        for r in r0..r1 {
            for c in c0..c1 {
                let (dr, dc) = (r as i64 - row as i64, c as i64 - col as i64);
                if dr * dr + dc * dc > r2 {
                    continue;
                }
                if volume {
                    a[&[slice, r, c][..]] = value;
                } else {
                    a[&[r, c][..]] = value;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn setup() -> (LayeredImage, LayeredImageViewer, LayeredImageViewerTool) {
        let image = Image::flat(Array2::<u8>::zeros((8, 8)), None).unwrap();
        let layered = LayeredImage::from_image(image, "image").unwrap();
        let settings = ViewerSettings::default();
        let viewer = LayeredImageViewer::new(&settings);
        viewer.set_data(Some(layered.clone()));
        let palette = settings.mask_palette();
        let tool = LayeredImageViewerTool::new(
            viewer.clone(),
            LayerSelector::Name("image".into()),
            MaskLayerProperties::mask(&settings, Arc::clone(&palette)),
            MaskLayerProperties::tool_mask(&settings, palette),
        );
        (layered, viewer, tool)
    }

    #[test]
    fn activation_creates_both_overlays() {
        let (layered, viewer, tool) = setup();
        tool.activate().unwrap();
        assert_eq!(layered.len(), 3);
        let mask = tool.mask_layer().unwrap();
        assert_eq!(mask.image().unwrap().shape(), vec![8, 8]);
        assert_eq!(viewer.layer_view_by_name("masks").unwrap().opacity(), 0.5);
        assert_eq!(viewer.layer_view_by_name("tool_mask").unwrap().opacity(), 0.5);
    }

    #[test]
    fn image_replacement_resizes_masks_but_keeps_layers() {
        let (layered, _viewer, tool) = setup();
        tool.activate().unwrap();
        let mask = tool.mask_layer().unwrap();
        let tool_mask = tool.tool_mask_layer().unwrap();

        let image_layer = layered.layer_by_name("image").unwrap();
        image_layer.set_image(Some(Image::flat(Array2::<u8>::zeros((4, 5)), None).unwrap()));

        assert_eq!(layered.len(), 3);
        assert!(ImageLayer::ptr_eq(&mask, &tool.mask_layer().unwrap()));
        assert!(ImageLayer::ptr_eq(&tool_mask, &tool.tool_mask_layer().unwrap()));
        assert_eq!(mask.image().unwrap().shape(), vec![4, 5]);
        assert_eq!(tool_mask.image().unwrap().shape(), vec![4, 5]);
    }

    #[test]
    fn painted_mask_survives_same_grid_updates() {
        let (layered, _viewer, tool) = setup();
        tool.activate().unwrap();
        tool.paint_mask(4, 4, 1, 1).unwrap();
        let painted = tool.mask_layer().unwrap().image().unwrap();
        assert_eq!(painted.with_pixels(|p| p.value_at(&[4, 5])), Some(1.0));
        assert_eq!(painted.with_pixels(|p| p.value_at(&[5, 5])), Some(0.0));

        layered
            .layer_by_name("image")
            .unwrap()
            .set_image(Some(Image::flat(Array2::<u8>::ones((8, 8)), None).unwrap()));
        let after = tool.mask_layer().unwrap().image().unwrap();
        assert!(Image::ptr_eq(&painted, &after));
        assert!(tool.paint_mask(8, 0, 1, 1).is_err());
    }

    #[test]
    fn deactivated_tool_ignores_image_changes() {
        let (layered, _viewer, tool) = setup();
        tool.activate().unwrap();
        tool.deactivate();
        assert!(!tool.is_active());
        let image_layer = layered.layer_by_name("image").unwrap();
        assert_eq!(image_layer.image_updated().subscriber_count(), 1);
        image_layer.set_image(Some(Image::flat(Array2::<u8>::zeros((2, 2)), None).unwrap()));
        assert_eq!(tool.mask_layer().unwrap().image().unwrap().shape(), vec![8, 8]);
    }

    #[test]
    fn missing_image_layer_is_not_found() {
        let (_layered, viewer, _tool) = setup();
        let settings = ViewerSettings::default();
        let palette = settings.mask_palette();
        let tool = LayeredImageViewerTool::new(
            viewer,
            LayerSelector::Number(5),
            MaskLayerProperties::mask(&settings, Arc::clone(&palette)),
            MaskLayerProperties::tool_mask(&settings, palette),
        );
        assert!(matches!(tool.activate(), Err(VisionError::NotFound(_))));
    }
}

//! Viewer ↔ model synchronization scenarios.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use kurbo::{Point, Size};
use medlayers::image::PixelsMut;
use medlayers::tools::{LayerSelector, MaskLayerProperties};
use medlayers::{
    Image, LayeredImage, LayeredImageViewer, LayeredImageViewerTool, Palette, PixelRegion,
    ViewerSettings, VisionError,
};
use ndarray::{Array2, Array3};

fn gray(rows: usize, cols: usize, v: u8) -> Image {
    Image::flat(Array2::<u8>::from_elem((rows, cols), v), None).unwrap()
}

fn viewer_with(layered: &LayeredImage) -> LayeredImageViewer {
    let viewer = LayeredImageViewer::new(&ViewerSettings::default());
    viewer.set_data(Some(layered.clone()));
    viewer
}

#[test]
fn pixel_modification_invalidates_the_cached_bitmap() {
    let layered = LayeredImage::from_image(gray(4, 4, 10), "image").unwrap();
    let viewer = viewer_with(&layered);
    let view = viewer.layer_view_by_name("image").unwrap();

    let before = view.displayed_bitmap().unwrap().unwrap();
    assert!(view.is_cached());
    assert!(Arc::ptr_eq(&before, &view.displayed_bitmap().unwrap().unwrap()));

    let image = layered.base_layer().unwrap().image().unwrap();
    image
        .modify_pixels(PixelRegion::rect(1, 1, 2, 2), |p| {
            if let PixelsMut::U8(mut a) = p {
                a.fill(250);
            }
        })
        .unwrap();
    assert!(!view.is_cached());

    let after = view.displayed_bitmap().unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_ne!(before.get_pixel(1, 1), after.get_pixel(1, 1));
    assert_eq!(before.get_pixel(0, 0), after.get_pixel(0, 0));
}

#[test]
fn image_replacement_invalidates_and_renames() {
    let layered = LayeredImage::from_image(gray(4, 4, 10).with_path("/data/a.png"), "image").unwrap();
    let viewer = viewer_with(&layered);
    let names: Rc<RefCell<Vec<Option<String>>>> = Rc::default();
    let sink = Rc::clone(&names);
    let _sub = viewer.data_name_changed().connect(move |n| sink.borrow_mut().push(n.clone()));
    assert_eq!(viewer.data_name().as_deref(), Some("a.png"));

    let view = viewer.layer_view_by_name("image").unwrap();
    view.displayed_bitmap().unwrap();
    layered
        .add_layer_or_modify_image("image", gray(4, 4, 99).with_path("/data/b.png"))
        .unwrap();

    assert!(!view.is_cached());
    assert_eq!(*names.borrow(), vec![Some("b.png".to_string())]);
}

#[test]
fn removed_layer_views_become_stale() {
    let layered = LayeredImage::from_image(gray(4, 4, 0), "image").unwrap();
    let palette = Palette::default_soft([0, 255, 0]).shared();
    layered
        .add_layer_or_modify_image("masks", Image::flat(Array2::<u8>::ones((4, 4)), Some(palette)).unwrap())
        .unwrap();
    let viewer = viewer_with(&layered);
    assert_eq!(viewer.layer_views().len(), 2);
    assert_eq!(viewer.active_layer().unwrap().name(), "masks");

    let view = viewer.layer_view_by_name("masks").unwrap();
    view.displayed_bitmap().unwrap();
    layered.remove_layer_by_name("masks").unwrap();

    assert!(matches!(view.displayed_bitmap(), Err(VisionError::StaleReference(_))));
    assert!(view.is_detached());
    assert_eq!(viewer.layer_views().len(), 1);
    assert_eq!(viewer.active_layer().unwrap().name(), "image");
}

#[test]
fn views_follow_layers_added_after_set_data() {
    let layered = LayeredImage::from_image(gray(4, 4, 0), "image").unwrap();
    let viewer = viewer_with(&layered);
    viewer.take_repaint_request();

    let palette = Palette::default_soft([255, 0, 0]).shared();
    layered
        .add_layer_or_modify_image("masks", Image::flat(Array2::<u8>::zeros((4, 4)), Some(palette)).unwrap())
        .unwrap();
    let names: Vec<String> = viewer.layer_views().iter().map(|v| v.name().to_owned()).collect();
    assert_eq!(names, vec!["image", "masks"]);
    assert!(viewer.take_repaint_request());

    // A viewer that moved on to other data no longer reacts.
    viewer.set_data(None);
    layered
        .add_layer_or_modify_image("other", gray(4, 4, 0))
        .unwrap();
    assert!(viewer.layer_views().is_empty());
}

#[test]
fn coordinates_round_trip_through_the_view() {
    let layered = LayeredImage::from_image(gray(50, 50, 0), "image").unwrap();
    let viewer = viewer_with(&layered);
    viewer.fit_image_in(Size::new(50.0, 50.0));
    assert!((viewer.scale() - 1.0).abs() < 1e-12);

    let pos = viewer.image_pixel_coords_to_viewport_pos(10, 20);
    assert_eq!(pos, Point::new(20.5, 10.5));
    assert_eq!(viewer.viewport_pos_to_image_pixel_coords(pos), (10, 20));
    assert_eq!(viewer.pixel_at(pos), Some((10, 20)));
    assert_eq!(viewer.pixel_at(Point::new(-3.0, 4.0)), None);
}

#[test]
fn smooth_zoom_runs_to_completion() {
    let layered = LayeredImage::from_image(gray(20, 20, 0), "image").unwrap();
    let viewer = viewer_with(&layered);
    viewer.fit_image_in(Size::new(20.0, 20.0));
    let finished: Rc<RefCell<Vec<f64>>> = Rc::default();
    let sink = Rc::clone(&finished);
    let _sub = viewer.zoom_finished().connect(move |s| sink.borrow_mut().push(*s));

    viewer.wheel_zoom(Point::new(10.0, 10.0), 1.0);
    assert!(viewer.is_zooming());
    let mut guard = 0;
    while viewer.tick_zoom() {
        guard += 1;
        assert!(guard < 100);
    }
    assert!(!viewer.is_zooming());
    let expected = 1.025f64.powi(10);
    assert!((viewer.scale() - expected).abs() < 1e-9);
    assert_eq!(finished.borrow().len(), 1);
}

#[test]
fn tool_creates_masks_next_to_the_image_layer() {
    let settings = ViewerSettings::default();
    let layered = LayeredImage::from_image(gray(6, 6, 0), "image").unwrap();
    let viewer = viewer_with(&layered);
    viewer.set_active_layer(&layered.base_layer().unwrap()).unwrap();

    let palette = settings.mask_palette();
    let tool = LayeredImageViewerTool::new(
        viewer.clone(),
        LayerSelector::ActiveLayer,
        MaskLayerProperties::mask(&settings, palette.clone()),
        MaskLayerProperties::tool_mask(&settings, palette),
    );
    tool.activate().unwrap();
    assert_eq!(layered.len(), 3);
    assert!(layered.layer_by_name("masks").is_some());
    assert!(layered.layer_by_name("tool_mask").is_some());
    let mask_view = viewer.layer_view_by_name("masks").unwrap();
    assert_eq!(mask_view.opacity(), settings.mask_opacity);

    tool.paint_mask(3, 3, 1, 1).unwrap();
    let mask = tool.mask_layer().unwrap().image().unwrap();
    assert_eq!(mask.with_pixels(|p| p.value_at(&[3, 3])), Some(1.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[0, 0])), Some(0.0));

    // A base image on another grid makes the mask stale: it is replaced.
    layered.add_layer_or_modify_image("image", gray(8, 8, 0)).unwrap();
    let mask = tool.mask_layer().unwrap().image().unwrap();
    assert_eq!(mask.grid_shape(), vec![8, 8]);
    assert_eq!(mask.with_pixels(|p| p.min_max()), Some((0.0, 0.0)));
    assert_eq!(tool.tool_mask_layer().unwrap().image().unwrap().grid_shape(), vec![8, 8]);

    tool.deactivate();
    assert!(!tool.is_active());
}

#[test]
fn tool_paints_the_shown_slice_of_a_volume() {
    let settings = ViewerSettings::default();
    let volume = Image::volume(Array3::<u8>::zeros((3, 6, 6)), None, None).unwrap();
    let layered = LayeredImage::from_image(volume, "image").unwrap();
    let viewer = viewer_with(&layered);
    assert_eq!(viewer.set_slice_number(2), 2);

    let palette = settings.mask_palette();
    let tool = LayeredImageViewerTool::new(
        viewer.clone(),
        LayerSelector::Name("image".into()),
        MaskLayerProperties::mask(&settings, palette.clone()),
        MaskLayerProperties::tool_mask(&settings, palette),
    );
    tool.activate().unwrap();
    assert_eq!(viewer.layer_view_by_name("masks").unwrap().slice_number(), 2);

    tool.paint_mask(3, 3, 1, 1).unwrap();
    tool.paint_mask(0, 0, 0, 1).unwrap();
    let mask = tool.mask_layer().unwrap().image().unwrap();
    assert_eq!(mask.grid_shape(), vec![3, 6, 6]);
    assert_eq!(mask.with_pixels(|p| p.value_at(&[2, 3, 3])), Some(1.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[2, 3, 4])), Some(1.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[2, 0, 0])), Some(1.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[2, 4, 4])), Some(0.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[0, 3, 3])), Some(0.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[1, 3, 3])), Some(0.0));

    viewer.set_slice_number(0);
    tool.paint_mask(5, 5, 0, 1).unwrap();
    assert_eq!(mask.with_pixels(|p| p.value_at(&[0, 5, 5])), Some(1.0));
    assert_eq!(mask.with_pixels(|p| p.value_at(&[2, 5, 5])), Some(0.0));
    assert!(matches!(tool.paint_mask(6, 0, 0, 1), Err(VisionError::Validation(_))));
}

#[test]
fn activation_map_views_open_at_the_configured_opacity() {
    let mut settings = ViewerSettings::default();
    settings.activation_map_opacity = 0.3;
    let layered = LayeredImage::from_image(gray(4, 4, 0), "image").unwrap();
    let viewer = LayeredImageViewer::new(&settings);
    viewer.set_data(Some(layered.clone()));

    medlayers::inference::install_segmentation(
        &layered,
        &settings.activation_map_layer_name,
        Array2::<f32>::from_elem((4, 4), 0.5).into(),
        Palette::default_jet().shared(),
    )
    .unwrap();
    let layer = layered.layer_by_name("Activation Map").unwrap();
    assert_eq!(layer.visibility().opacity, 1.0);
    assert_eq!(viewer.layer_view_by_name("Activation Map").unwrap().opacity(), 0.3);
    assert_eq!(viewer.layer_view_by_name("image").unwrap().opacity(), 1.0);

    // A fresh viewer over the same stack applies it again.
    let other = LayeredImageViewer::new(&settings);
    other.set_data(Some(layered));
    assert_eq!(other.layer_view_by_name("Activation Map").unwrap().opacity(), 0.3);
}

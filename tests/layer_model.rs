//! Scenario and property tests for the layer model.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use medlayers::image::PixelsMut;
use medlayers::{Image, ImageLayer, LayeredImage, Palette, PixelRegion, VisionError, Visibility};
use ndarray::Array2;
use proptest::prelude::*;

fn plane(rows: usize, cols: usize, v: u8) -> Image {
    Image::flat(Array2::<u8>::from_elem((rows, cols), v), None).unwrap()
}

proptest! {
    #[test]
    fn layer_names_stay_unique(names in prop::collection::vec("[abc]{1,2}", 1..24)) {
        let layered = LayeredImage::new();
        let mut seen = HashSet::new();
        for name in &names {
            let result = layered.add_layer(ImageLayer::new(Some(plane(4, 4, 0)), name.as_str(), Visibility::default()));
            if seen.insert(name.clone()) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(VisionError::Validation(_))));
            }
        }
        prop_assert_eq!(layered.len(), seen.len());
        for name in &seen {
            prop_assert!(layered.layer_by_name(name).is_some());
        }
    }

    #[test]
    fn opacity_is_always_clamped(opacity in -10.0f32..10.0) {
        let v = Visibility::new(true, opacity);
        prop_assert!((0.0..=1.0).contains(&v.opacity));
    }
}

#[test]
fn structural_notifications_bracket_the_change() {
    let layered = LayeredImage::from_image(plane(4, 4, 0), "image").unwrap();
    let seen: Rc<RefCell<Vec<(String, usize, bool)>>> = Rc::default();

    let mut subs = Vec::new();
    for (tag, signal) in [
        ("adding", layered.layer_adding()),
        ("added", layered.layer_added()),
        ("removing", layered.layer_removing()),
        ("removed", layered.layer_removed()),
    ] {
        let seen = Rc::clone(&seen);
        let model = layered.clone();
        subs.push(signal.connect(move |(layer, index)| {
            seen.borrow_mut().push((tag.to_string(), *index, model.contains_layer(layer)));
        }));
    }

    let mask = ImageLayer::new(Some(plane(4, 4, 1)), "masks", Visibility::default());
    layered.add_layer(mask.clone()).unwrap();
    layered.remove_layer(&mask).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            ("adding".to_string(), 1, false),
            ("added".to_string(), 1, true),
            ("removing".to_string(), 1, true),
            ("removed".to_string(), 1, false),
        ]
    );
}

#[test]
fn replacing_an_image_moves_the_subscription() {
    let first = plane(3, 3, 0);
    let second = plane(3, 3, 0);
    let layer = ImageLayer::from_image(first.clone(), "image");
    assert_eq!(first.pixels_modified().subscriber_count(), 1);

    layer.set_image(Some(second.clone()));
    assert_eq!(first.pixels_modified().subscriber_count(), 0);
    assert_eq!(second.pixels_modified().subscriber_count(), 1);

    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    let _sub = layer.image_pixels_modified().connect(move |_| *counter.borrow_mut() += 1);

    first
        .modify_pixels(PixelRegion::rect(0, 0, 1, 1), |p| {
            if let PixelsMut::U8(mut a) = p {
                a.fill(9);
            }
        })
        .unwrap();
    assert_eq!(*hits.borrow(), 0);

    second
        .modify_pixels(PixelRegion::rect(0, 0, 1, 1), |p| {
            if let PixelsMut::U8(mut a) = p {
                a.fill(9);
            }
        })
        .unwrap();
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn add_or_modify_twice_keeps_one_layer_with_the_latest_image() {
    let layered = LayeredImage::from_image(plane(5, 5, 0), "image").unwrap();
    let palette = Palette::default_soft([0, 255, 0]).shared();

    let a = Image::flat(Array2::<u8>::zeros((5, 5)), Some(palette.clone())).unwrap();
    let b = Image::flat(Array2::<u8>::ones((5, 5)), Some(palette)).unwrap();
    let first = layered.add_layer_or_modify_image("masks", a).unwrap();
    let second = layered.add_layer_or_modify_image("masks", b.clone()).unwrap();

    assert_eq!(layered.len(), 2);
    assert!(ImageLayer::ptr_eq(&first, &second));
    let current = second.image().unwrap();
    assert!(Image::ptr_eq(&current, &b));
    assert_eq!(current.with_pixels(|p| p.min_max()), Some((1.0, 1.0)));
}

#[test]
fn mismatched_grid_is_rejected() {
    let layered = LayeredImage::from_image(plane(5, 5, 0), "image").unwrap();
    let err = layered
        .add_layer_or_modify_image("masks", plane(4, 5, 0))
        .unwrap_err();
    assert!(matches!(err, VisionError::Validation(_)));
    assert_eq!(layered.len(), 1);
}

#[test]
fn soft_palette_default() {
    let palette = Palette::default_soft([0, 255, 0]);
    assert_eq!(palette.color_for(0), [0, 0, 0, 0]);
    assert_eq!(palette.color_for(1), [0, 255, 0, 100]);
}

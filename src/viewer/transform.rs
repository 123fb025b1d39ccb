//! Widget ↔ pixel coordinate mapping.
//!
//! A point travels through four spaces:
//!
//! ```text
//! widget  --(- viewport offset)-->  view  --(view⁻¹)-->  scene  --(- item pos)-->  item
//! ```
//!
//! Item space is the image plane: pixel `(r, c)` covers `[c, c+1) x [r, r+1)`
//! and its center sits at `(c + 0.5, r + 0.5)`.

use kurbo::{Affine, Point, Size, Vec2};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    /// Position of the viewport inside the viewer widget (frame, rulers).
    pub viewport_offset: Vec2,
    /// Scene → view.
    pub view: Affine,
    /// Position of the image item in the scene.
    pub item_pos: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            viewport_offset: Vec2::ZERO,
            view: Affine::IDENTITY,
            item_pos: Vec2::ZERO,
        }
    }
}

impl ViewTransform {
    /// Uniform scale of the view (the transform never rotates or shears).
    pub fn scale(&self) -> f64 {
        self.view.as_coeffs()[0]
    }

    pub fn widget_to_item(&self, p: Point) -> Point {
        let view_pos = p - self.viewport_offset;
        let scene_pos = self.view.inverse() * view_pos;
        scene_pos - self.item_pos
    }

    pub fn item_to_widget(&self, p: Point) -> Point {
        let scene_pos = p + self.item_pos;
        self.view * scene_pos + self.viewport_offset
    }

    /// Pixel `(row, col)` under a widget position. Positions outside the
    /// image give out-of-range (possibly negative) indices.
    pub fn widget_to_pixel(&self, p: Point) -> (i64, i64) {
        let local = self.widget_to_item(p);
        ((local.y - 0.5).round() as i64, (local.x - 0.5).round() as i64)
    }

    pub fn pixel_center_to_widget(&self, row: i64, col: i64) -> Point {
        self.item_to_widget(Point::new(col as f64 + 0.5, row as f64 + 0.5))
    }

    /// Scale the view by `factor` while the scene point under `anchor`
    /// (a view-space position) stays where it is on screen.
    pub fn zoom_about(&mut self, anchor: Point, factor: f64) {
        let before = self.view.inverse() * anchor;
        let scaled = self.view * Affine::scale(factor);
        let after = scaled.inverse() * anchor;
        self.view = scaled * Affine::translate(after - before);
    }

    /// Show `footprint` (scene units) entirely inside `viewport`, centered,
    /// aspect ratio kept.
    pub fn fit(&mut self, footprint: Size, viewport: Size) {
        if footprint.width <= 0.0 || footprint.height <= 0.0 {
            self.view = Affine::IDENTITY;
            return;
        }
        let scale = (viewport.width / footprint.width).min(viewport.height / footprint.height);
        let offset = Vec2::new(
            (viewport.width - footprint.width * scale) / 2.0,
            (viewport.height - footprint.height * scale) / 2.0,
        );
        self.view = Affine::translate(offset - self.item_pos * scale) * Affine::scale(scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a - b).hypot() < 1e-9
    }

    #[test]
    fn pixel_centers_round_trip_under_offset_and_zoom() {
        let mut t = ViewTransform {
            viewport_offset: Vec2::new(3.0, 7.0),
            ..ViewTransform::default()
        };
        t.zoom_about(Point::new(40.0, 25.0), 2.5);
        for &(r, c) in &[(0, 0), (10, 20), (49, 49), (3, 41)] {
            let p = t.pixel_center_to_widget(r, c);
            assert_eq!(t.widget_to_pixel(p), (r, c));
        }
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut t = ViewTransform::default();
        let anchor = Point::new(12.0, 30.0);
        let scene_before = t.view.inverse() * anchor;
        t.zoom_about(anchor, 1.25);
        t.zoom_about(anchor, 1.25);
        assert!(close(t.view * scene_before, anchor));
        assert!((t.scale() - 1.5625).abs() < 1e-12);
    }

    #[test]
    fn fit_centers_and_keeps_aspect() {
        let mut t = ViewTransform::default();
        t.fit(Size::new(100.0, 50.0), Size::new(200.0, 200.0));
        assert!((t.scale() - 2.0).abs() < 1e-12);
        assert!(close(t.view * Point::new(0.0, 0.0), Point::new(0.0, 50.0)));
        assert!(close(t.view * Point::new(100.0, 50.0), Point::new(200.0, 150.0)));
    }
}

//! Coordinate spaces used by the viewer.
//!
//! Three spaces are involved:
//! 1. Client space: pointer positions as reported by the host window.
//! 2. Container space: the scrollable viewport's content, origin at its top-left
//!    corner, scroll offset already applied.
//! 3. Content-native space: page units at scale 1.0, independent of zoom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn approx_eq(&self, other: Size) -> bool {
        (self.width - other.width).abs() < 0.5 && (self.height - other.height).abs() < 0.5
    }
}

/// Axis-aligned rectangle. Width and height are never negative once built
/// through [`Rect::from_corners`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds the rectangle spanned by two drag corners, whatever the drag direction.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() < other.x
            || other.right() < self.x
            || self.bottom() < other.y
            || other.bottom() < self.y)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn scaled(&self, factor: f32) -> Rect {
        Rect {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    pub fn translated(&self, offset: Point) -> Rect {
        Rect {
            x: self.x + offset.x,
            y: self.y + offset.y,
            ..*self
        }
    }
}

/// Subtracts the container origin and adds the scroll offset.
pub fn client_to_container(point: Point, container_bounds: Rect, scroll: Point) -> Point {
    Point::new(
        point.x - container_bounds.x + scroll.x,
        point.y - container_bounds.y + scroll.y,
    )
}

pub fn container_to_client(point: Point, container_bounds: Rect, scroll: Point) -> Point {
    Point::new(
        point.x + container_bounds.x - scroll.x,
        point.y + container_bounds.y - scroll.y,
    )
}

pub fn container_to_content_native(point: Point, scale: f32) -> Point {
    let scale = sanitize_scale(scale);
    Point::new(point.x / scale, point.y / scale)
}

pub fn content_native_to_container(point: Point, scale: f32) -> Point {
    let scale = sanitize_scale(scale);
    Point::new(point.x * scale, point.y * scale)
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Placement of the displayed raster inside the scroll container.
///
/// `origin` is the raster's top-left corner in container space and `scale` the
/// number of on-screen pixels per content-native pixel. Gestures copy this value at
/// pointer-down so a render swap mid-drag cannot perturb them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub origin: Point,
    pub scale: f32,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            origin: Point::ORIGIN,
            scale: 1.0,
        }
    }
}

impl ViewportTransform {
    pub fn new(origin: Point, scale: f32) -> Self {
        Self {
            origin,
            scale: sanitize_scale(scale),
        }
    }

    pub fn to_content(&self, container: Point) -> Point {
        container_to_content_native(
            Point::new(container.x - self.origin.x, container.y - self.origin.y),
            self.scale,
        )
    }

    pub fn to_container(&self, content: Point) -> Point {
        let scaled = content_native_to_container(content, self.scale);
        Point::new(scaled.x + self.origin.x, scaled.y + self.origin.y)
    }

    pub fn rect_to_container(&self, content: &Rect) -> Rect {
        content.scaled(self.scale).translated(self.origin)
    }

    pub fn rect_to_content(&self, container: &Rect) -> Rect {
        let top_left = self.to_content(Point::new(container.x, container.y));
        Rect::new(
            top_left.x,
            top_left.y,
            container.width / self.scale,
            container.height / self.scale,
        )
    }
}

/// Client-space placement of the scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContainerGeometry {
    pub bounds: Rect,
    pub scroll: Point,
}

impl ContainerGeometry {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            scroll: Point::ORIGIN,
        }
    }

    pub fn client_to_container(&self, point: Point) -> Point {
        client_to_container(point, self.bounds, self.scroll)
    }

    pub fn container_to_client(&self, point: Point) -> Point {
        container_to_client(point, self.bounds, self.scroll)
    }

    pub fn client_to_content(&self, point: Point, transform: &ViewportTransform) -> Point {
        transform.to_content(self.client_to_container(point))
    }

    pub fn content_to_client(&self, point: Point, transform: &ViewportTransform) -> Point {
        self.container_to_client(transform.to_container(point))
    }

    /// Clamps the scroll offset so the viewport never leaves `content` (container space).
    pub fn clamp_scroll(&mut self, content: Size) {
        let max_x = (content.width - self.bounds.width).max(0.0);
        let max_y = (content.height - self.bounds.height).max(0.0);
        self.scroll.x = self.scroll.x.clamp(0.0, max_x);
        self.scroll.y = self.scroll.y.clamp(0.0, max_y);
    }

    /// Scroll offset that centres `target` (container space) in the viewport.
    pub fn centered_on(&self, target: &Rect, content: Size) -> Point {
        let center = target.center();
        let mut geometry = *self;
        geometry.scroll = Point::new(
            center.x - self.bounds.width / 2.0,
            center.y - self.bounds.height / 2.0,
        );
        geometry.clamp_scroll(content);
        geometry.scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn client_to_content_round_trip_holds_at_supported_scales() {
        let mut rng = rand::thread_rng();
        let container = ContainerGeometry {
            bounds: Rect::new(40.0, 72.0, 900.0, 700.0),
            scroll: Point::new(13.0, 260.5),
        };

        for scale in [0.5_f32, 1.0, 1.2, 3.0] {
            let transform = ViewportTransform::new(Point::new(20.0, 20.0), scale);
            for _ in 0..100 {
                let point = Point::new(
                    rng.gen_range(container.bounds.x..container.bounds.right()),
                    rng.gen_range(container.bounds.y..container.bounds.bottom()),
                );
                let content = container.client_to_content(point, &transform);
                let back = container.content_to_client(content, &transform);
                assert!(
                    (back.x - point.x).abs() < 0.01 && (back.y - point.y).abs() < 0.01,
                    "scale {scale}: {point:?} -> {content:?} -> {back:?}"
                );
            }
        }
    }

    #[test]
    fn client_to_container_applies_origin_and_scroll() {
        let point = client_to_container(
            Point::new(150.0, 120.0),
            Rect::new(100.0, 100.0, 400.0, 300.0),
            Point::new(0.0, 50.0),
        );
        assert_eq!(point, Point::new(50.0, 70.0));
    }

    #[test]
    fn container_to_content_divides_by_scale() {
        let point = container_to_content_native(Point::new(300.0, 90.0), 1.5);
        assert!((point.x - 200.0).abs() < f32::EPSILON);
        assert!((point.y - 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn degenerate_scale_falls_back_to_identity() {
        let point = container_to_content_native(Point::new(10.0, 20.0), 0.0);
        assert_eq!(point, Point::new(10.0, 20.0));
    }

    #[test]
    fn rect_from_corners_is_normalized_for_any_drag_direction() {
        let rect = Rect::from_corners(Point::new(50.0, 40.0), Point::new(20.0, 10.0));
        assert_eq!(rect, Rect::new(20.0, 10.0, 30.0, 30.0));
    }

    #[test]
    fn centered_scroll_is_clamped_to_content() {
        let container = ContainerGeometry::new(Rect::new(0.0, 0.0, 400.0, 300.0));
        let content = Size::new(1000.0, 2000.0);

        let scroll = container.centered_on(&Rect::new(500.0, 1000.0, 100.0, 20.0), content);
        assert_eq!(scroll, Point::new(350.0, 860.0));

        let near_top = container.centered_on(&Rect::new(10.0, 10.0, 10.0, 10.0), content);
        assert_eq!(near_top, Point::ORIGIN);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoiError};

/// Width and height of an image or crop window, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise minimum, used to fit a crop window inside an image.
    pub fn min(self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with a top-left origin and half-open extents
/// (`right = x + width` is exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `size`, i.e. an image border.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Integer centroid, rounding toward the origin like the crop math expects.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Overlap of two rectangles; the empty rectangle when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 > x1 && y2 > y1 {
            Rect::new(x1, y1, x2 - x1, y2 - y1)
        } else {
            Rect::default()
        }
    }

    /// Smallest rectangle enclosing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width.max(0) as u32, self.height.max(0) as u32)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Fit `rect` inside `border`.
///
/// A dimension larger than the border is first shrunk to the border and
/// snapped to the border origin on that axis; the rectangle is then shifted
/// (never resized) until it lies fully inside.
pub fn clamp_to_border(rect: Rect, border: Rect) -> Rect {
    let (mut x, mut y, mut w, mut h) = (rect.x, rect.y, rect.width, rect.height);

    if w > border.width {
        w = border.width;
        x = border.x;
    }
    if h > border.height {
        h = border.height;
        y = border.y;
    }

    if x < border.x {
        x = border.x;
    }
    if y < border.y {
        y = border.y;
    }
    if x + w > border.right() {
        x = border.right() - w;
    }
    if y + h > border.bottom() {
        y = border.bottom() - h;
    }

    Rect::new(x, y, w, h)
}

/// Clamp a point into `border`, treating right/bottom as exclusive.
pub fn clamp_point_to_border(point: Point, border: Rect) -> Point {
    let max_x = (border.right() - 1).max(border.x);
    let max_y = (border.bottom() - 1).max(border.y);
    Point::new(point.x.clamp(border.x, max_x), point.y.clamp(border.y, max_y))
}

/// Largest size with `target`'s aspect ratio that fits inside `original`.
pub fn max_aspect_size(original: Size, target: Size) -> Size {
    let original_aspect = original.width as f64 / original.height as f64;
    let target_aspect = target.width as f64 / target.height as f64;

    let (width, height) = if original_aspect >= target_aspect {
        let height = original.height;
        ((height as f64 * target_aspect).round_ties_even() as u32, height)
    } else {
        let width = original.width;
        (width, (width as f64 / target_aspect).round_ties_even() as u32)
    };

    Size::new(width.min(original.width), height.min(original.height))
}

/// Geometric union of every rectangle in `rects`.
pub fn union_all(rects: &[Rect]) -> Result<Rect> {
    let (first, rest) = rects
        .split_first()
        .ok_or(RoiError::EmptyInput { what: "rectangle" })?;
    Ok(rest.iter().fold(*first, |acc, r| acc.union(r)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges_saturate() {
        let rect = Rect::new(i32::MAX - 5, 0, 100, 10);
        assert_eq!(rect.right(), i32::MAX);
        assert!(rect.intersect(&Rect::new(0, 0, 100, 100)).is_empty());
    }

    #[test]
    fn test_max_aspect_size_wider_target() {
        let result = max_aspect_size(Size::new(1000, 1000), Size::new(1600, 900));
        assert_eq!(result, Size::new(1000, 562));
    }

    #[test]
    fn test_max_aspect_size_taller_target() {
        let result = max_aspect_size(Size::new(1000, 1000), Size::new(900, 1600));
        assert_eq!(result, Size::new(562, 1000));
    }

    #[test]
    fn test_max_aspect_size_fits_and_keeps_aspect() {
        let originals = [(640, 480), (1920, 1080), (333, 777), (1, 1000), (4000, 3)];
        let targets = [(800, 480), (1, 1), (300, 1000), (1600, 900), (7, 3)];

        for &(ow, oh) in &originals {
            for &(tw, th) in &targets {
                let r = max_aspect_size(Size::new(ow, oh), Size::new(tw, th));
                assert!(r.width <= ow && r.height <= oh, "{:?} exceeds {}x{}", r, ow, oh);

                // One side always spans the original fully, the other is off by
                // at most one pixel of rounding from the exact aspect.
                let target_aspect = tw as f64 / th as f64;
                if r.height == oh {
                    assert!((r.width as f64 - oh as f64 * target_aspect).abs() <= 1.0 || r.width == ow);
                } else {
                    assert_eq!(r.width, ow);
                    assert!((r.height as f64 - ow as f64 / target_aspect).abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_clamp_to_border_properties() {
        let border = Rect::new(0, 0, 200, 100);
        let rects = [
            Rect::new(-50, -50, 80, 40),
            Rect::new(150, 80, 80, 40),
            Rect::new(10, 10, 500, 20),
            Rect::new(-10, 90, 30, 300),
            Rect::new(20, 20, 10, 10),
        ];

        for rect in rects {
            let r = clamp_to_border(rect, border);
            assert!(border.contains_rect(&r), "{} not inside {}", r, border);
            assert_eq!(r.width, rect.width.min(border.width));
            assert_eq!(r.height, rect.height.min(border.height));
        }
    }

    #[test]
    fn test_clamp_to_border_snaps_oversized_axis_to_origin() {
        let border = Rect::new(5, 5, 100, 100);
        let r = clamp_to_border(Rect::new(40, 20, 300, 10), border);
        assert_eq!(r, Rect::new(5, 20, 100, 10));
    }

    #[test]
    fn test_clamp_point_to_border() {
        let border = Rect::new(0, 0, 100, 50);
        assert_eq!(clamp_point_to_border(Point::new(-5, 20), border), Point::new(0, 20));
        assert_eq!(clamp_point_to_border(Point::new(100, 50), border), Point::new(99, 49));
        assert_eq!(clamp_point_to_border(Point::new(42, 7), border), Point::new(42, 7));
    }

    #[test]
    fn test_union_all() {
        let rects = [Rect::new(10, 10, 10, 10), Rect::new(50, 0, 5, 5), Rect::new(0, 40, 1, 1)];
        assert_eq!(union_all(&rects).unwrap(), Rect::new(0, 0, 55, 41));
        assert!(matches!(union_all(&[]), Err(RoiError::EmptyInput { .. })));
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect(&Rect::new(5, 5, 10, 10)), Rect::new(5, 5, 5, 5));
    }
}

use serde::{Deserialize, Serialize};

use super::geometry::{clamp_to_border, Rect};

/// Per-side fractional padding applied to a rectangle.
///
/// Each side is clamped to `[0, 1]` when the value is built; the type is
/// immutable afterwards, so changing a side means building a new ratio.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PaddingRatioRepr", into = "PaddingSides")]
pub struct PaddingRatio {
    top: f32,
    bottom: f32,
    left: f32,
    right: f32,
}

impl PaddingRatio {
    pub fn new(top: f32, bottom: f32, left: f32, right: f32) -> Self {
        Self {
            top: clamp_unit(top),
            bottom: clamp_unit(bottom),
            left: clamp_unit(left),
            right: clamp_unit(right),
        }
    }

    pub fn uniform(all_sides: f32) -> Self {
        Self::new(all_sides, all_sides, all_sides, all_sides)
    }

    pub fn symmetric(vertical: f32, horizontal: f32) -> Self {
        Self::new(vertical, vertical, horizontal, horizontal)
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    /// Grow `rect` by the ratios, optionally constrained to `border`.
    ///
    /// Without a border the result may extend past the image. With one, an
    /// axis wider than the border is shrunk to it and snapped to its origin,
    /// then the rectangle is shifted (never resized again) inside. A result
    /// equal in size to the border therefore lands on the border origin.
    pub fn expand(&self, rect: Rect, border: Option<Rect>) -> Rect {
        let w = rect.width as f32;
        let h = rect.height as f32;

        let expanded = Rect::new(
            rect.x - (w * self.left) as i32,
            rect.y - (h * self.top) as i32,
            rect.width + (w * (self.left + self.right)) as i32,
            rect.height + (h * (self.top + self.bottom)) as i32,
        );

        match border {
            Some(border) => clamp_to_border(expanded, border),
            None => expanded,
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Config form: a bare number pads every side, an object names sides.
#[derive(Deserialize)]
#[serde(untagged)]
enum PaddingRatioRepr {
    Uniform(f32),
    Sides(PaddingSides),
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct PaddingSides {
    top: f32,
    bottom: f32,
    left: f32,
    right: f32,
}

impl From<PaddingRatioRepr> for PaddingRatio {
    fn from(repr: PaddingRatioRepr) -> Self {
        match repr {
            PaddingRatioRepr::Uniform(all) => PaddingRatio::uniform(all),
            PaddingRatioRepr::Sides(s) => PaddingRatio::new(s.top, s.bottom, s.left, s.right),
        }
    }
}

impl From<PaddingRatio> for PaddingSides {
    fn from(p: PaddingRatio) -> Self {
        Self {
            top: p.top,
            bottom: p.bottom,
            left: p.left,
            right: p.right,
        }
    }
}

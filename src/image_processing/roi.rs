//! Region-of-interest strategies.
//!
//! A [`RoiSelector`] is built once from a [`RoiType`] and [`RoiOptions`] and
//! then maps `(image, target size)` to the rectangle worth keeping. Only the
//! face-aware strategies touch the shared [`FaceDetectorModel`].
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::debug;

use super::face_detection::{best_face, FaceCandidate, FaceDetectorModel};
use super::geometry::{clamp_point_to_border, clamp_to_border, union_all, Point, Rect, Size};
use super::image::Image;
use super::padding::PaddingRatio;
use super::saliency::compute_saliency;
use crate::error::Result;

/// Vertical position of the eye line inside a rule-of-thirds window.
const EYE_LINE_RATIO: f32 = 1.0 / 3.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum RoiType {
    /// Middle of the image.
    Center,
    /// Most salient area.
    Prominent,
    /// Eyes on the upper third line.
    RuleOfThirds,
    /// Faces and saliency combined.
    #[default]
    Attention,
}

impl RoiType {
    pub fn uses_faces(self) -> bool {
        matches!(self, RoiType::RuleOfThirds | RoiType::Attention)
    }
}

/// Tuning shared by every strategy. Ratios and the confidence are kept in
/// `[0, 1]` by [`RoiSelector::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoiOptions {
    /// Minimum detector score for a face to count.
    pub face_confidence: f32,
    /// Use every face (union / averaged eyes) instead of only the best one.
    pub faces_union_all: bool,
    pub face_padding: PaddingRatio,
    pub saliency_padding: PaddingRatio,
    /// Where the eyes are assumed to be, relative to the image (no faces) or to
    /// a face rectangle (no landmarks).
    pub default_eye_center_ratio_x: f32,
    pub default_eye_center_ratio_y: f32,
}

impl Default for RoiOptions {
    fn default() -> Self {
        Self {
            face_confidence: 0.6,
            faces_union_all: true,
            face_padding: PaddingRatio::default(),
            saliency_padding: PaddingRatio::default(),
            default_eye_center_ratio_x: 0.5,
            default_eye_center_ratio_y: 0.35,
        }
    }
}

impl RoiOptions {
    fn clamped(self) -> Self {
        Self {
            face_confidence: clamp_unit(self.face_confidence),
            default_eye_center_ratio_x: clamp_unit(self.default_eye_center_ratio_x),
            default_eye_center_ratio_y: clamp_unit(self.default_eye_center_ratio_y),
            ..self
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

/// A configured ROI strategy.
#[derive(Debug, Clone)]
pub struct RoiSelector {
    kind: RoiType,
    options: RoiOptions,
    faces: Option<Arc<FaceDetectorModel>>,
}

impl RoiSelector {
    /// `faces` may be `None`; face-aware strategies then see no faces.
    pub fn new(kind: RoiType, options: RoiOptions, faces: Option<Arc<FaceDetectorModel>>) -> Self {
        Self {
            kind,
            options: options.clamped(),
            faces,
        }
    }

    pub fn kind(&self) -> RoiType {
        self.kind
    }

    pub fn options(&self) -> &RoiOptions {
        &self.options
    }

    /// Pick the region of `image` to keep for a crop of `target` size.
    ///
    /// The result is not guaranteed to lie inside the image; the crop engine
    /// clamps it.
    pub async fn select(&self, image: &Image, target: Size) -> Result<Rect> {
        let roi = match self.kind {
            RoiType::Center => center_roi(image.size(), target),
            RoiType::Prominent => self.prominent_roi(image, target)?,
            RoiType::RuleOfThirds => self.rule_of_thirds_roi(image, target).await,
            RoiType::Attention => self.attention_roi(image, target).await?,
        };
        debug!("{}: {} roi {}", image.source_name(), self.kind, roi);
        Ok(roi)
    }

    async fn detect_faces(&self, image: &Image) -> Vec<FaceCandidate> {
        match &self.faces {
            Some(model) => model.detect_async(image, self.options.face_confidence).await,
            None => Vec::new(),
        }
    }

    fn prominent_roi(&self, image: &Image, target: Size) -> Result<Rect> {
        let size = image.size();
        let crop = size.min(target);

        let map = compute_saliency(image)?;
        let levels = GrayImage::from_fn(size.width, size.height, |x, y| {
            Luma([(map.get_pixel(x, y).0[0] * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        let radius = blur_kernel_size(crop, size) / 2;
        let blurred = imageproc::filter::box_filter(&levels, radius, radius);
        let peak = first_maximum(&blurred);

        let (crop_w, crop_h) = (crop.width as i32, crop.height as i32);
        let x = (peak.x - crop_w / 2).clamp(0, (size.width as i32 - crop_w).max(0));
        let y = (peak.y - crop_h / 2).clamp(0, (size.height as i32 - crop_h).max(0));

        let window = Rect::new(x, y, crop_w, crop_h);
        Ok(self
            .options
            .saliency_padding
            .expand(window, Some(image.bounds())))
    }

    async fn rule_of_thirds_roi(&self, image: &Image, target: Size) -> Rect {
        let border = image.bounds();
        let crop = image.size().min(target);

        let faces = self.detect_faces(image).await;
        let eye = match self.eye_centroid(&faces) {
            Some(eye) => clamp_point_to_border(eye, border),
            None => Point::new(
                (border.width as f32 * self.options.default_eye_center_ratio_x) as i32,
                (border.height as f32 * self.options.default_eye_center_ratio_y).round_ties_even()
                    as i32,
            ),
        };

        let x = (eye.x as f32 - crop.width as f32 / 2.0).round_ties_even() as i32;
        let y = (eye.y as f32 - crop.height as f32 * EYE_LINE_RATIO).round_ties_even() as i32;
        clamp_to_border(
            Rect::new(x, y, crop.width as i32, crop.height as i32),
            border,
        )
    }

    /// Where the eyes are, from the best face or all faces. `None` without faces.
    fn eye_centroid(&self, faces: &[FaceCandidate]) -> Option<Point> {
        if !self.options.faces_union_all {
            let best = best_face(faces)?;
            return Some(match best.eye_center() {
                Some((x, y)) => round_point(x, y),
                None => self.eye_line_anchor(best.rect),
            });
        }

        if faces.is_empty() {
            return None;
        }
        // faces without landmarks contribute their eye-line anchor
        let n = faces.len() as f32;
        let (sum_x, sum_y) = faces
            .iter()
            .map(|face| {
                face.eye_center().unwrap_or_else(|| {
                    let anchor = self.eye_line_anchor(face.rect);
                    (anchor.x as f32, anchor.y as f32)
                })
            })
            .fold((0.0f32, 0.0f32), |(sx, sy), (x, y)| (sx + x, sy + y));
        Some(round_point(sum_x / n, sum_y / n))
    }

    fn eye_line_anchor(&self, face: Rect) -> Point {
        Point::new(
            face.x + (face.width as f32 * self.options.default_eye_center_ratio_x) as i32,
            face.y
                + (face.height as f32 * self.options.default_eye_center_ratio_y).round_ties_even()
                    as i32,
        )
    }

    async fn attention_roi(&self, image: &Image, target: Size) -> Result<Rect> {
        let border = image.bounds();
        let crop = image.size().min(target);

        let saliency_anchor = self.prominent_roi(image, crop)?;

        let faces = self.detect_faces(image).await;
        let face_rect = if faces.is_empty() {
            None
        } else if self.options.faces_union_all {
            let rects: Vec<Rect> = faces.iter().map(|f| f.rect).collect();
            Some(union_all(&rects)?)
        } else {
            best_face(&faces).map(|f| f.rect)
        };

        let anchor = match face_rect {
            Some(rect) => {
                let face_anchor = self.options.face_padding.expand(rect, Some(border));
                face_anchor.union(&saliency_anchor)
            }
            None => saliency_anchor,
        };

        Ok(center_window_on(anchor, crop, border))
    }
}

fn round_point(x: f32, y: f32) -> Point {
    Point::new(x.round_ties_even() as i32, y.round_ties_even() as i32)
}

fn center_roi(image: Size, target: Size) -> Rect {
    let x = ((image.width as i32 - target.width as i32) / 2).max(0);
    let y = ((image.height as i32 - target.height as i32) / 2).max(0);
    Rect::new(x, y, target.width as i32, target.height as i32)
}

/// Odd box size roughly as large as the crop window, at least 3 and no
/// larger than the short image side (plus the odd bump).
fn blur_kernel_size(crop: Size, image: Size) -> u32 {
    let mut k = crop.width.max(crop.height);
    k = k.min(image.width.min(image.height));
    k = k.max(3);
    if k % 2 == 0 {
        k += 1;
    }
    k
}

/// Position of the first brightest pixel in row-major order.
fn first_maximum(image: &GrayImage) -> Point {
    let mut best = (0u8, Point::default());
    let mut found = false;
    for (x, y, pixel) in image.enumerate_pixels() {
        if !found || pixel.0[0] > best.0 {
            best = (pixel.0[0], Point::new(x as i32, y as i32));
            found = true;
        }
    }
    best.1
}

/// A `crop`-sized window centered on `anchor`, shifted inside `border`.
fn center_window_on(anchor: Rect, crop: Size, border: Rect) -> Rect {
    let center = anchor.center();
    let (w, h) = (crop.width as i32, crop.height as i32);

    let x = (center.x - w / 2).clamp(border.x, (border.right() - w).max(border.x));
    let y = (center.y - h / 2).clamp(border.y, (border.bottom() - h).max(border.y));
    Rect::new(x, y, w, h)
}

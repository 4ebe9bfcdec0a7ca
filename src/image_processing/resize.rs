use fast_image_resize::{
    images::Image as ResizeBuffer, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;

use super::geometry::{clamp_to_border, max_aspect_size, Rect, Size};
use super::image::Image;
use super::roi::RoiSelector;
use crate::error::{Result, RoiError};

/// How the selected region is turned into the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum CropMode {
    /// Crop a region of exactly the target size (clamped to the image).
    Direct,
    /// Crop the largest region with the target's aspect ratio, then scale it
    /// to the target size.
    #[default]
    Fit,
}

/// Crop `image` in place to the region chosen by `selector`.
///
/// Returns the region that was cut out of the source image. Every selected
/// region is clamped into the image before cropping.
pub async fn crop_to_roi(
    image: &mut Image,
    target: Size,
    selector: &RoiSelector,
    mode: CropMode,
) -> Result<Rect> {
    if target.width == 0 || target.height == 0 {
        return Err(RoiError::Resize {
            width: target.width,
            height: target.height,
            reason: "target size must be non-zero".to_string(),
        });
    }

    match mode {
        CropMode::Direct => {
            let roi = selector.select(image, target).await?;
            let roi = clamp_to_border(roi, image.bounds());
            debug!("{}: direct crop to {}", image.source_name(), roi);
            image.crop_in_place(roi)?;
            Ok(roi)
        }
        CropMode::Fit => {
            let max_size = max_aspect_size(image.size(), target);
            let roi = selector.select(image, max_size).await?;
            let roi = clamp_to_border(roi, image.bounds());
            debug!(
                "{}: fit crop to {} then resize to {}",
                image.source_name(),
                roi,
                target
            );
            image.crop_in_place(roi)?;
            image.resize_in_place(target)?;
            Ok(roi)
        }
    }
}

/// Copy the `roi` region out of `img`.
pub(crate) fn crop_image(img: &RgbImage, roi: Rect) -> Result<RgbImage> {
    let (img_width, img_height) = img.dimensions();
    let border = Rect::new(0, 0, img_width as i32, img_height as i32);

    if roi.is_empty() || !border.contains_rect(&roi) {
        return Err(RoiError::InvalidRegion {
            x: roi.x,
            y: roi.y,
            width: roi.width,
            height: roi.height,
            image_width: img_width,
            image_height: img_height,
        });
    }

    Ok(image::imageops::crop_imm(
        img,
        roi.x as u32,
        roi.y as u32,
        roi.width as u32,
        roi.height as u32,
    )
    .to_image())
}

/// Resize to exact dimensions with a box (pixel area) filter.
pub(crate) fn resize_image(img: &RgbImage, size: Size) -> Result<RgbImage> {
    let resize_err = |reason: String| RoiError::Resize {
        width: size.width,
        height: size.height,
        reason,
    };

    if size.width == 0 || size.height == 0 {
        return Err(resize_err("target size must be non-zero".to_string()));
    }
    if img.dimensions() == (size.width, size.height) {
        return Ok(img.clone());
    }

    let src_image = ResizeBuffer::from_vec_u8(
        img.width(),
        img.height(),
        img.as_raw().clone(),
        PixelType::U8x3,
    )
    .map_err(|e| resize_err(e.to_string()))?;

    let mut dst_image = ResizeBuffer::new(size.width, size.height, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| resize_err(e.to_string()))?;

    RgbImage::from_raw(size.width, size.height, dst_image.buffer().to_vec())
        .ok_or_else(|| resize_err("resized buffer has unexpected length".to_string()))
}

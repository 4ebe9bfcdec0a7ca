use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

use super::geometry::{Rect, Size};
use super::resize::{crop_image, resize_image};
use crate::error::{Result, RoiError};

/// A decoded 3-channel, 8-bit image plus the name it was loaded from.
///
/// The pixel buffer is never empty once constructed. Crop and resize replace
/// the buffer in place, and only after the new one has been produced.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: RgbImage,
    source_name: String,
}

impl Image {
    /// Decode an image file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let source_name = path.display().to_string();
        let decoded = image::open(path).map_err(|e| RoiError::image_read(&source_name, e))?;
        Self::from_rgb(decoded.to_rgb8(), source_name)
    }

    /// Decode an in-memory encoded image (any format the codec recognises).
    pub fn from_bytes(bytes: &[u8], source_name: impl Into<String>) -> Result<Self> {
        let source_name = source_name.into();
        let decoded =
            image::load_from_memory(bytes).map_err(|e| RoiError::image_read(&source_name, e))?;
        Self::from_rgb(decoded.to_rgb8(), source_name)
    }

    /// Wrap an already decoded buffer.
    pub fn from_rgb(pixels: RgbImage, source_name: impl Into<String>) -> Result<Self> {
        let source_name = source_name.into();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(RoiError::image_read(source_name, "image has no pixels"));
        }
        Ok(Self {
            pixels,
            source_name,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// The image border, `(0, 0, width, height)`.
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size())
    }

    /// Encode as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.pixels
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| RoiError::ImageWrite {
                source_name: self.source_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(out.into_inner())
    }

    /// Write the image as a PNG file.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.pixels
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| RoiError::ImageWrite {
                source_name: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Replace the buffer with the `roi` region of itself.
    pub fn crop_in_place(&mut self, roi: Rect) -> Result<()> {
        let cropped = crop_image(&self.pixels, roi)?;
        self.pixels = cropped;
        Ok(())
    }

    /// Replace the buffer with an area-filtered resize to `size`.
    pub fn resize_in_place(&mut self, size: Size) -> Result<()> {
        let resized = resize_image(&self.pixels, size)?;
        self.pixels = resized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_png_round_trip_preserves_dimensions() {
        let image = Image::from_rgb(create_test_image(37, 21), "memory").unwrap();
        let bytes = image.to_png_bytes().unwrap();
        let decoded = Image::from_bytes(&bytes, "decoded").unwrap();

        assert_eq!(decoded.size(), image.size());
        assert_eq!(decoded.pixels().as_raw().len(), image.pixels().as_raw().len());
        assert_eq!(decoded.pixels().as_raw().len(), 37 * 21 * 3);
        // PNG is lossless
        assert_eq!(decoded.pixels(), image.pixels());
    }

    #[test]
    fn test_save_and_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        let image = Image::from_rgb(create_test_image(16, 9), "memory").unwrap();
        image.save_png(&path).unwrap();

        let reopened = Image::open(&path).unwrap();
        assert_eq!(reopened.size(), Size::new(16, 9));
        assert_eq!(reopened.source_name(), path.display().to_string());
    }

    #[test]
    fn test_decode_garbage_fails_with_image_read() {
        let err = Image::from_bytes(b"definitely not an image", "garbage").unwrap_err();
        match err {
            RoiError::ImageRead { source_name, .. } => assert_eq!(source_name, "garbage"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        assert!(Image::from_rgb(RgbImage::new(0, 10), "empty").is_err());
    }

    #[test]
    fn test_failed_crop_leaves_image_untouched() {
        let mut image = Image::from_rgb(create_test_image(50, 50), "memory").unwrap();
        let before = image.pixels().clone();
        assert!(image.crop_in_place(Rect::new(10, 10, 50, 50)).is_err());
        assert_eq!(image.pixels(), &before);

        image.crop_in_place(Rect::new(10, 10, 20, 30)).unwrap();
        assert_eq!(image.size(), Size::new(20, 30));
        assert_eq!(image.pixels().get_pixel(0, 0), before.get_pixel(10, 10));
    }
}

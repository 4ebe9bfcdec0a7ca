//! Crate-level error types and `Result` alias for the cropping engine.
//!
//! Face detector failures never appear in [`RoiError`]: the face
//! model recovers them locally and reports "no faces" instead.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoiError>;

#[derive(Debug, Error)]
pub enum RoiError {
    #[error("Failed to read image '{source_name}': {reason}")]
    ImageRead { source_name: String, reason: String },

    #[error("Failed to write image '{source_name}': {reason}")]
    ImageWrite { source_name: String, reason: String },

    #[error("Failed to compute saliency for image '{source_name}'")]
    SaliencyComputation { source_name: String },

    #[error("Expected at least one {what}, got none")]
    EmptyInput { what: &'static str },

    #[error("Region ({x},{y} {width}x{height}) is not a valid crop of a {image_width}x{image_height} image")]
    InvalidRegion {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Resize to {width}x{height} failed: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },
}

impl RoiError {
    pub fn image_read<E: std::fmt::Display>(source_name: impl Into<String>, e: E) -> Self {
        RoiError::ImageRead {
            source_name: source_name.into(),
            reason: e.to_string(),
        }
    }
}

/// Errors raised by a native face backend. These never cross the
/// [`crate::image_processing::face_detection::FaceDetectorModel`] boundary.
#[derive(Debug, Error)]
pub enum FaceBackendError {
    #[error("Failed to load face model: {0}")]
    Load(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Malformed detector output: {0}")]
    MalformedOutput(String),
}

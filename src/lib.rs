//! Region-of-interest cropping: pick the part of an image worth keeping
//! (centre, saliency, faces on the rule-of-thirds line, or faces plus
//! saliency) and crop it to a target size.

pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod utils;

// Re-export commonly used types
pub use error::{FaceBackendError, Result, RoiError};
pub use image_processing::face_detection::{FaceBackend, FaceCandidate, FaceDetectorModel};
pub use image_processing::geometry::{Rect, Size};
pub use image_processing::image::Image;
pub use image_processing::padding::PaddingRatio;
pub use image_processing::resize::{crop_to_roi, CropMode};
pub use image_processing::roi::{RoiOptions, RoiSelector, RoiType};
pub use image_processing::{ProcessingConfig, ProcessingEngine, ProcessingResult};
pub use json_output::JsonMessage;

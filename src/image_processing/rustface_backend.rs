use image::RgbImage;
use ndarray::Array2;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::face_detection::{FaceBackend, FaceBackendLoader, RawDetections};
use crate::error::FaceBackendError;

/// Raw SeetaFace scores around this value are borderline detections.
const SCORE_MIDPOINT: f64 = 2.0;
const SCORE_SPREAD: f64 = 2.0;

/// Face backend running the SeetaFace frontal detector from `rustface`.
pub struct RustfaceBackend {
    model: rustface::Model,
}

impl RustfaceBackend {
    /// Read a SeetaFace model file (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn load(path: &Path) -> Result<Self, FaceBackendError> {
        let file = File::open(path)
            .map_err(|e| FaceBackendError::Load(format!("{}: {}", path.display(), e)))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| FaceBackendError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(Self { model })
    }

    /// Loader for [`super::face_detection::FaceDetectorModel::new`]; the file is
    /// only read when the model is first initialized.
    pub fn loader(path: PathBuf) -> impl FaceBackendLoader {
        move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
            Ok(Box::new(RustfaceBackend::load(&path)?))
        }
    }
}

impl FaceBackend for RustfaceBackend {
    fn detect(&mut self, image: &RgbImage) -> Result<RawDetections, FaceBackendError> {
        let gray = image::imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        // `rustface::Detector` is not `Send`, so it cannot live in the backend
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let mut rows = Vec::with_capacity(faces.len() * 5);
        for face in &faces {
            let bbox = face.bbox();
            rows.extend_from_slice(&[
                bbox.x() as f32,
                bbox.y() as f32,
                bbox.width() as f32,
                bbox.height() as f32,
                normalize_score(face.score()),
            ]);
        }

        Array2::from_shape_vec((faces.len(), 5), rows)
            .map(RawDetections::from)
            .map_err(|e| FaceBackendError::MalformedOutput(e.to_string()))
    }
}

/// Map an unbounded SeetaFace score onto `[0, 1]`.
fn normalize_score(raw: f64) -> f32 {
    (1.0 / (1.0 + (-(raw - SCORE_MIDPOINT) / SCORE_SPREAD).exp())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_score() {
        assert!((normalize_score(2.0) - 0.5).abs() < 1e-6);
        assert!(normalize_score(10.0) > 0.95);
        assert!(normalize_score(-10.0) < 0.01);
        assert!(normalize_score(4.0) > normalize_score(3.0));
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let result = RustfaceBackend::load(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(FaceBackendError::Load(_))));
    }

    #[tokio::test]
    async fn test_model_with_missing_file_is_unavailable() {
        use crate::image_processing::face_detection::FaceDetectorModel;

        let dir = tempfile::tempdir().unwrap();
        let model = FaceDetectorModel::new(RustfaceBackend::loader(dir.path().join("missing.bin")));
        assert!(!model.init_async().await);
        assert!(!model.is_ready());
    }
}

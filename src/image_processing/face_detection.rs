//! Face detector model: a single native detector behind an async,
//! single-flight initialization and a detection mutex.
//!
//! Backends only have to turn an image into a raw numeric matrix (see
//! [`RawDetections`]); filtering, clipping and landmark extraction happen here,
//! outside the detection lock.
use image::RgbImage;
use ndarray::Array2;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::geometry::{Point, Rect};
use super::image::Image;
use crate::error::FaceBackendError;

/// Scores closer than this are considered equal when picking the best face.
pub const SCORE_TIE_EPSILON: f32 = 1e-6;

const MIN_COLUMNS: usize = 5;
const LANDMARK_COLUMNS: usize = 15;

/// Scratch buffers above this many elements are dropped instead of pooled.
const MAX_POOLED_ELEMENTS: usize = 1_000_000;
const MAX_POOLED_BUFFERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceLandmarks {
    pub right_eye: Point,
    pub left_eye: Point,
    pub nose: Point,
    pub right_mouth: Point,
    pub left_mouth: Point,
}

/// One detected face, clipped to the image it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCandidate {
    pub rect: Rect,
    pub score: f32,
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceCandidate {
    /// Midpoint between the eyes, when the detector reported landmarks.
    pub fn eye_center(&self) -> Option<(f32, f32)> {
        self.landmarks.map(|lm| {
            (
                (lm.right_eye.x as f32 + lm.left_eye.x as f32) / 2.0,
                (lm.right_eye.y as f32 + lm.left_eye.y as f32) / 2.0,
            )
        })
    }
}

/// Highest scoring face; near-equal scores prefer the larger rectangle.
pub fn best_face(faces: &[FaceCandidate]) -> Option<&FaceCandidate> {
    let mut iter = faces.iter();
    let first = iter.next()?;
    Some(iter.fold(first, |best, candidate| {
        let higher = candidate.score > best.score;
        let tied_but_larger = (candidate.score - best.score).abs() <= SCORE_TIE_EPSILON
            && candidate.rect.area() > best.rect.area();
        if higher || tied_but_larger {
            candidate
        } else {
            best
        }
    }))
}

/// Raw detector output, one face per row.
///
/// Row layout is `[x, y, w, h, score]`, or with landmarks
/// `[x, y, w, h, re.x, re.y, le.x, le.y, n.x, n.y, rm.x, rm.y, lm.x, lm.y, score]`.
/// Any memory layout is accepted; rows are read in logical order.
#[derive(Debug, Clone)]
pub enum RawDetections {
    F32(Array2<f32>),
    F64(Array2<f64>),
    I32(Array2<i32>),
}

impl RawDetections {
    pub fn empty() -> Self {
        RawDetections::F32(Array2::zeros((0, MIN_COLUMNS)))
    }

    /// `(rows, columns)`
    pub fn dim(&self) -> (usize, usize) {
        match self {
            RawDetections::F32(a) => a.dim(),
            RawDetections::F64(a) => a.dim(),
            RawDetections::I32(a) => a.dim(),
        }
    }

    /// Append every value, row-major and converted to `f32`, to `out`.
    fn copy_into(&self, out: &mut Vec<f32>) {
        match self {
            RawDetections::F32(a) => out.extend(a.iter().copied()),
            RawDetections::F64(a) => out.extend(a.iter().map(|&v| v as f32)),
            RawDetections::I32(a) => out.extend(a.iter().map(|&v| v as f32)),
        }
    }
}

impl From<Array2<f32>> for RawDetections {
    fn from(a: Array2<f32>) -> Self {
        RawDetections::F32(a)
    }
}

impl From<Array2<f64>> for RawDetections {
    fn from(a: Array2<f64>) -> Self {
        RawDetections::F64(a)
    }
}

impl From<Array2<i32>> for RawDetections {
    fn from(a: Array2<i32>) -> Self {
        RawDetections::I32(a)
    }
}

/// A loaded native detector. Calls are never concurrent.
pub trait FaceBackend: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<RawDetections, FaceBackendError>;
}

/// Builds a [`FaceBackend`]; runs once per successful initialization.
pub trait FaceBackendLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn FaceBackend>, FaceBackendError>;
}

impl<F> FaceBackendLoader for F
where
    F: Fn() -> Result<Box<dyn FaceBackend>, FaceBackendError> + Send + Sync,
{
    fn load(&self) -> Result<Box<dyn FaceBackend>, FaceBackendError> {
        self()
    }
}

type SharedBackend = Arc<Mutex<Box<dyn FaceBackend>>>;

enum ModelState {
    Uninitialized,
    Ready(SharedBackend),
    /// The load failed; stays failed until `deinit_async`.
    Failed,
}

/// Shared face detector.
///
/// Hand one instance (behind an `Arc`) to every selector that needs faces.
/// Failures never reach callers: an unavailable model detects no faces.
pub struct FaceDetectorModel {
    loader: Arc<dyn FaceBackendLoader>,
    state: Mutex<ModelState>,
    ready: AtomicBool,
    scratch: ScratchPool,
}

impl FaceDetectorModel {
    pub fn new(loader: impl FaceBackendLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Mutex::new(ModelState::Uninitialized),
            ready: AtomicBool::new(false),
            scratch: ScratchPool::default(),
        }
    }

    /// A model with nothing to load. Every initialization fails.
    pub fn unavailable() -> Self {
        Self::new(|| -> Result<Box<dyn FaceBackend>, FaceBackendError> {
            Err(FaceBackendError::Load("no face model configured".to_string()))
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Load the backend once. Concurrent callers wait for the same load and
    /// all see its outcome.
    pub async fn init_async(&self) -> bool {
        if self.is_ready() {
            return true;
        }

        let mut state = self.state.lock().await;
        match &*state {
            ModelState::Ready(_) => return true,
            ModelState::Failed => return false,
            ModelState::Uninitialized => {}
        }

        let loader = Arc::clone(&self.loader);
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .unwrap_or_else(|e| Err(FaceBackendError::Load(e.to_string())));

        match loaded {
            Ok(backend) => {
                *state = ModelState::Ready(Arc::new(Mutex::new(backend)));
                self.ready.store(true, Ordering::Release);
                info!("Face detector model loaded");
                true
            }
            Err(e) => {
                warn!("Face detection disabled: {}", e);
                *state = ModelState::Failed;
                false
            }
        }
    }

    /// Drop the loaded backend (if any) and return to the uninitialized state.
    ///
    /// A detection already holding the backend finishes on its own handle.
    pub async fn deinit_async(&self) -> bool {
        let mut state = self.state.lock().await;
        self.ready.store(false, Ordering::Release);
        *state = ModelState::Uninitialized;
        debug!("Face detector model released");
        true
    }

    /// Faces in `image` scoring at least `min_score`. Empty when the model is
    /// unavailable or the backend fails.
    pub async fn detect_async(&self, image: &Image, min_score: f32) -> Vec<FaceCandidate> {
        if !self.init_async().await {
            return Vec::new();
        }

        let backend = match &*self.state.lock().await {
            ModelState::Ready(backend) => Arc::clone(backend),
            _ => return Vec::new(),
        };

        // queue on the async lock; the native pass itself runs on the blocking pool
        let mut native = backend.lock_owned().await;
        let pixels = image.pixels().clone();
        let raw = tokio::task::spawn_blocking(move || native.detect(&pixels))
            .await
            .unwrap_or_else(|e| Err(FaceBackendError::Detection(e.to_string())));

        let faces = raw.and_then(|raw| self.parse(&raw, image.bounds(), min_score));
        match faces {
            Ok(faces) => {
                debug!("{}: {} face(s) found", image.source_name(), faces.len());
                faces
            }
            Err(e) => {
                warn!("{}: {}", image.source_name(), e);
                Vec::new()
            }
        }
    }

    fn parse(
        &self,
        raw: &RawDetections,
        border: Rect,
        min_score: f32,
    ) -> Result<Vec<FaceCandidate>, FaceBackendError> {
        let (rows, cols) = raw.dim();
        if rows == 0 {
            return Ok(Vec::new());
        }
        if cols < MIN_COLUMNS {
            return Err(FaceBackendError::MalformedOutput(format!(
                "expected at least {} columns, got {}",
                MIN_COLUMNS, cols
            )));
        }

        let mut values = self.scratch.lease(rows * cols);
        raw.copy_into(&mut values);

        let has_landmarks = cols >= LANDMARK_COLUMNS;
        let score_col = if has_landmarks { LANDMARK_COLUMNS - 1 } else { MIN_COLUMNS - 1 };

        let mut faces = Vec::with_capacity(rows.min(16));
        for row in values.chunks_exact(cols) {
            let score = row[score_col];
            if !score.is_finite() || score < min_score {
                continue;
            }

            let Some(rect) = clip_box(&row[..4], border) else {
                continue;
            };

            let landmarks = has_landmarks.then(|| FaceLandmarks {
                right_eye: point_at(row, 4),
                left_eye: point_at(row, 6),
                nose: point_at(row, 8),
                right_mouth: point_at(row, 10),
                left_mouth: point_at(row, 12),
            });

            faces.push(FaceCandidate {
                rect,
                score,
                landmarks,
            });
        }
        Ok(faces)
    }
}

impl fmt::Debug for FaceDetectorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceDetectorModel")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Intersect a raw `[x, y, w, h]` box with `border`.
///
/// Done in `f64` so detector values far outside the `i32` range cannot
/// overflow; non-finite and empty boxes yield `None`.
fn clip_box(values: &[f32], border: Rect) -> Option<Rect> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let [x, y, w, h] = [0, 1, 2, 3].map(|i| (values[i] as f64).round());

    let left = x.max(border.x as f64);
    let top = y.max(border.y as f64);
    let right = (x + w).min(border.right() as f64);
    let bottom = (y + h).min(border.bottom() as f64);
    if right <= left || bottom <= top {
        return None;
    }

    Some(Rect::new(
        left as i32,
        top as i32,
        (right - left) as i32,
        (bottom - top) as i32,
    ))
}

fn point_at(row: &[f32], col: usize) -> Point {
    Point::new(row[col].round() as i32, row[col + 1].round() as i32)
}

/// Small pool of `f32` buffers for flattening detector output.
#[derive(Default)]
struct ScratchPool {
    buffers: std::sync::Mutex<Vec<Vec<f32>>>,
}

impl ScratchPool {
    fn lease(&self, len: usize) -> ScratchLease<'_> {
        let mut buffer = if len <= MAX_POOLED_ELEMENTS {
            self.buffers
                .lock()
                .ok()
                .and_then(|mut buffers| buffers.pop())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        buffer.clear();
        buffer.reserve(len);
        ScratchLease { pool: self, buffer }
    }

    fn give_back(&self, buffer: Vec<f32>) {
        if buffer.capacity() > MAX_POOLED_ELEMENTS {
            return;
        }
        if let Ok(mut buffers) = self.buffers.lock() {
            if buffers.len() < MAX_POOLED_BUFFERS {
                buffers.push(buffer);
            }
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }
}

struct ScratchLease<'a> {
    pool: &'a ScratchPool,
    buffer: Vec<f32>,
}

impl Deref for ScratchLease<'_> {
    type Target = Vec<f32>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for ScratchLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for ScratchLease<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::AtomicUsize;
    use tokio::task::JoinSet;

    /// Backend that returns the same matrix for every image.
    pub(crate) struct FixedBackend(pub RawDetections);

    impl FaceBackend for FixedBackend {
        fn detect(&mut self, _image: &RgbImage) -> Result<RawDetections, FaceBackendError> {
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    impl FaceBackend for FailingBackend {
        fn detect(&mut self, _image: &RgbImage) -> Result<RawDetections, FaceBackendError> {
            Err(FaceBackendError::Detection("native call failed".to_string()))
        }
    }

    pub(crate) fn fixed_model(raw: impl Into<RawDetections>) -> FaceDetectorModel {
        let raw = raw.into();
        FaceDetectorModel::new(move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
            Ok(Box::new(FixedBackend(raw.clone())))
        })
    }

    fn blank_image(width: u32, height: u32) -> Image {
        Image::from_rgb(RgbImage::new(width, height), "faces").unwrap()
    }

    #[tokio::test]
    async fn test_detect_filters_by_score() {
        let model = fixed_model(array![[10.0f32, 10.0, 50.0, 50.0, 0.9]]);
        let image = blank_image(100, 100);

        let faces = model.detect_async(&image, 0.5).await;
        assert_eq!(
            faces,
            vec![FaceCandidate {
                rect: Rect::new(10, 10, 50, 50),
                score: 0.9,
                landmarks: None,
            }]
        );

        assert!(model.detect_async(&image, 0.95).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failed_init_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let model = Arc::new(FaceDetectorModel::new(
            move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                Err(FaceBackendError::Load("corrupt model".to_string()))
            },
        ));

        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let model = Arc::clone(&model);
            tasks.spawn(async move { model.init_async().await });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            outcomes.push(result.unwrap());
        }

        assert_eq!(outcomes.len(), 50);
        assert!(outcomes.iter().all(|ok| !ok));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!model.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_init_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let model = Arc::new(FaceDetectorModel::new(
            move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(Box::new(FixedBackend(RawDetections::empty())))
            },
        ));

        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let model = Arc::clone(&model);
            tasks.spawn(async move { model.init_async().await });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            outcomes.push(result.unwrap());
        }

        assert_eq!(outcomes.len(), 50);
        assert!(outcomes.iter().all(|ok| *ok));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(model.is_ready());
    }

    /// Records how many native passes overlap.
    struct OverlapBackend {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl FaceBackend for OverlapBackend {
        fn detect(&mut self, _image: &RgbImage) -> Result<RawDetections, FaceBackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(array![[10.0f32, 10.0, 20.0, 20.0, 0.9]].into())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_native_detection_never_overlaps() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (loader_in_flight, loader_peak) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let model = Arc::new(FaceDetectorModel::new(
            move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
                Ok(Box::new(OverlapBackend {
                    in_flight: Arc::clone(&loader_in_flight),
                    peak: Arc::clone(&loader_peak),
                }))
            },
        ));
        let image = Arc::new(blank_image(64, 64));

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let (model, image) = (Arc::clone(&model), Arc::clone(&image));
            tasks.spawn(async move { model.detect_async(&image, 0.5).await.len() });
        }

        while let Some(found) = tasks.join_next().await {
            assert_eq!(found.unwrap(), 1);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_rows_do_not_overflow() {
        let model = fixed_model(array![
            [2.0e9f32, 0.0, 2.0e9, 10.0, 0.9],
            [-3.0e9, -3.0e9, 6.0e9, 6.0e9, 0.9],
            [f32::INFINITY, 0.0, 10.0, 10.0, 0.9],
            [20.0, 20.0, -40.0, 10.0, 0.9],
        ]);
        let faces = model.detect_async(&blank_image(100, 100), 0.5).await;

        let rects: Vec<Rect> = faces.iter().map(|f| f.rect).collect();
        assert_eq!(rects, vec![Rect::new(0, 0, 100, 100)]);
    }

    #[tokio::test]
    async fn test_deinit_allows_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let model = FaceDetectorModel::new(move || -> Result<Box<dyn FaceBackend>, FaceBackendError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedBackend(RawDetections::empty())))
        });

        assert!(model.deinit_async().await);
        assert!(model.init_async().await);
        assert!(model.init_async().await);
        assert!(model.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        assert!(model.deinit_async().await);
        assert!(!model.is_ready());
        assert!(model.init_async().await);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_model_finds_nothing() {
        let model = FaceDetectorModel::unavailable();
        assert!(!model.init_async().await);
        assert!(model.detect_async(&blank_image(10, 10), 0.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_yields_no_faces() {
        let model = FaceDetectorModel::new(|| -> Result<Box<dyn FaceBackend>, FaceBackendError> {
            Ok(Box::new(FailingBackend))
        });
        assert!(model.detect_async(&blank_image(10, 10), 0.0).await.is_empty());
        assert!(model.is_ready());
    }

    #[tokio::test]
    async fn test_rows_are_clipped_and_degenerate_rows_dropped() {
        let model = fixed_model(array![
            [-10.0f32, 80.0, 40.0, 40.0, 0.8],
            [150.0, 10.0, 20.0, 20.0, 0.9],
            [10.0, 10.0, 0.0, 30.0, 0.9],
            [5.0, 5.0, 10.0, 10.0, f32::NAN],
        ]);
        let faces = model.detect_async(&blank_image(100, 100), 0.1).await;

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].rect, Rect::new(0, 80, 30, 20));
    }

    #[tokio::test]
    async fn test_landmark_rows() {
        let model = fixed_model(array![[
            20.0f32, 20.0, 60.0, 60.0, 35.0, 40.0, 65.0, 42.0, 50.0, 55.0, 38.0, 68.0, 62.0, 68.0,
            0.97
        ]]);
        let faces = model.detect_async(&blank_image(100, 100), 0.5).await;

        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_eq!(face.score, 0.97);
        let landmarks = face.landmarks.unwrap();
        assert_eq!(landmarks.right_eye, Point::new(35, 40));
        assert_eq!(landmarks.left_mouth, Point::new(62, 68));
        assert_eq!(face.eye_center(), Some((50.0, 41.0)));
    }

    #[tokio::test]
    async fn test_non_contiguous_and_non_float_matrices() {
        // column-major storage; logical rows are [10,10,50,50,0.9] and [20,20,30,30,0.8]
        let transposed = Array2::from_shape_vec(
            (5, 2),
            vec![10.0f64, 20.0, 10.0, 20.0, 50.0, 30.0, 50.0, 30.0, 0.9, 0.8],
        )
        .unwrap()
        .reversed_axes();
        let raw = RawDetections::from(transposed.clone());

        let model = fixed_model(raw.clone());
        let faces = model.detect_async(&blank_image(100, 100), 0.5).await;
        let rects: Vec<Rect> = faces.iter().map(|f| f.rect).collect();
        assert_eq!(rects, vec![Rect::new(10, 10, 50, 50), Rect::new(20, 20, 30, 30)]);

        // caller's matrix is left as it was
        match raw {
            RawDetections::F64(a) => assert_eq!(a, transposed),
            _ => unreachable!(),
        }

        let model = fixed_model(array![[0i32, 0, 20, 20, 1]]);
        let faces = model.detect_async(&blank_image(100, 100), 0.5).await;
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_too_few_columns_yields_no_faces() {
        let model = fixed_model(array![[10.0f32, 10.0, 50.0]]);
        assert!(model.detect_async(&blank_image(100, 100), 0.0).await.is_empty());
    }

    #[test]
    fn test_best_face_tie_break() {
        let face = |w: i32, score: f32| FaceCandidate {
            rect: Rect::new(0, 0, w, w),
            score,
            landmarks: None,
        };

        assert!(best_face(&[]).is_none());

        let faces = [face(10, 0.8), face(5, 0.9), face(50, 0.7)];
        assert_eq!(best_face(&faces).unwrap().rect.width, 5);

        let faces = [face(10, 0.9), face(30, 0.9 - 5e-7)];
        assert_eq!(best_face(&faces).unwrap().rect.width, 30);

        let faces = [face(30, 0.9), face(10, 0.9)];
        assert_eq!(best_face(&faces).unwrap().rect.width, 30);
    }

    #[test]
    fn test_scratch_pool_bounds() {
        let pool = ScratchPool::default();
        {
            let leases: Vec<_> = (0..6).map(|_| pool.lease(10)).collect();
            assert!(leases.iter().all(|l| l.capacity() >= 10));
        }
        assert_eq!(pool.pooled(), MAX_POOLED_BUFFERS);

        let pool = ScratchPool::default();
        drop(pool.lease(MAX_POOLED_ELEMENTS + 1));
        assert_eq!(pool.pooled(), 0);
    }
}

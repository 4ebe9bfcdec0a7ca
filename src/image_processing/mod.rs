pub mod face_detection;
pub mod geometry;
pub mod image;
pub mod padding;
pub mod resize;
pub mod roi;
#[cfg(feature = "rustface")]
pub mod rustface_backend;
pub mod saliency;

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

use self::face_detection::FaceDetectorModel;
use self::geometry::{Rect, Size};
use self::image::Image;
use self::resize::{crop_to_roi, CropMode};
use self::roi::{RoiOptions, RoiSelector, RoiType};
use crate::utils::{create_output_filename, has_valid_extension};

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub target: Size,
    pub roi: RoiType,
    pub mode: CropMode,
    pub roi_options: RoiOptions,
    pub face_model: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub parallel_jobs: usize,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Region cut from the source; empty when the file was skipped.
    pub roi: Rect,
    pub source_size: Option<Size>,
    pub output_size: Option<Size>,
    pub duration: Duration,
    pub skipped: bool,
}

/// Runs ROI crops over many files, sharing one face model between workers.
pub struct ProcessingEngine {
    config: ProcessingConfig,
    pool: rayon::ThreadPool,
    runtime: tokio::runtime::Runtime,
    faces: Option<Arc<FaceDetectorModel>>,
    selector: RoiSelector,
}

impl ProcessingEngine {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        let threads = config.parallel_jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("roi-crop-{}", i))
            .build()
            .context("Failed to initialize thread pool")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let faces = if config.roi.uses_faces() {
            Some(Arc::new(face_model(config.face_model.as_deref())))
        } else {
            None
        };
        let selector = RoiSelector::new(config.roi, config.roi_options, faces.clone());

        Ok(Self {
            config,
            pool,
            runtime,
            faces,
            selector,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Load the face model up front so the first files do not pay for it.
    ///
    /// Returns `false` when the strategy needs faces and the model is unusable;
    /// processing still works and behaves as if no face was found.
    pub fn warm_up(&self) -> bool {
        match &self.faces {
            Some(model) => self.runtime.block_on(model.init_async()),
            None => true,
        }
    }

    /// Discover all image files in the input paths
    pub fn discover_images(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input in inputs {
            if input.is_file() {
                if has_valid_extension(input, &self.config.extensions) {
                    image_files.push(input.clone());
                } else {
                    debug!("Skipping {}: extension not selected", input.display());
                }
                continue;
            }

            debug!("Scanning directory: {}", input.display());
            let walker = WalkDir::new(input).follow_links(false).max_depth(10);

            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        // Sort for consistent processing order
        image_files.sort();
        image_files.dedup();

        info!("Found {} image files", image_files.len());
        Ok(image_files)
    }

    /// Process a batch of images; `progress_callback` receives the number of
    /// files finished so far.
    pub fn process_batch<F>(
        &self,
        image_files: &[PathBuf],
        output_dir: &Path,
        progress_callback: F,
    ) -> Vec<Result<ProcessingResult>>
    where
        F: Fn(usize, &Path) + Send + Sync,
    {
        let finished = AtomicUsize::new(0);
        let outputs = output_paths(image_files, output_dir);

        self.pool.install(|| {
            image_files
                .par_iter()
                .zip(outputs.into_par_iter())
                .map(|(image_path, output_path)| {
                    let result = self.process_into(image_path, output_path);
                    let count = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    progress_callback(count, image_path);
                    result
                })
                .collect()
        })
    }

    /// Crop a single image file into `output_dir` as `<stem>.png`
    pub fn process_single_image(
        &self,
        input_path: &Path,
        output_dir: &Path,
    ) -> Result<ProcessingResult> {
        self.process_into(input_path, output_dir.join(create_output_filename(input_path)))
    }

    fn process_into(&self, input_path: &Path, output_path: PathBuf) -> Result<ProcessingResult> {
        let start = Instant::now();

        if output_path.exists() && !self.config.force {
            debug!(
                "Skipping {}: {} already exists",
                input_path.display(),
                output_path.display()
            );
            return Ok(ProcessingResult {
                input_path: input_path.to_path_buf(),
                output_path,
                roi: Rect::default(),
                source_size: None,
                output_size: None,
                duration: start.elapsed(),
                skipped: true,
            });
        }

        let mut image = Image::open(input_path)
            .with_context(|| format!("Failed to open image: {}", input_path.display()))?;
        let source_size = image.size();

        let roi = self
            .runtime
            .block_on(crop_to_roi(
                &mut image,
                self.config.target,
                &self.selector,
                self.config.mode,
            ))
            .with_context(|| format!("Failed to crop image: {}", input_path.display()))?;

        image
            .save_png(&output_path)
            .with_context(|| format!("Failed to save image: {}", output_path.display()))?;

        debug!(
            "{} ({}) -> {} ({}), roi {}",
            input_path.display(),
            source_size,
            output_path.display(),
            image.size(),
            roi
        );

        Ok(ProcessingResult {
            input_path: input_path.to_path_buf(),
            output_path,
            roi,
            source_size: Some(source_size),
            output_size: Some(image.size()),
            duration: start.elapsed(),
            skipped: false,
        })
    }

    /// Release the face model; the engine stays usable and reloads on demand.
    pub fn shutdown(&self) {
        if let Some(model) = &self.faces {
            self.runtime.block_on(model.deinit_async());
        }
    }
}

/// One output path per input, in order: `<stem>.png` inside `output_dir`.
///
/// Names are unique within the batch (compared case-insensitively); a later
/// input whose name is taken gets `_1`, `_2`, ... appended to its stem.
pub fn output_paths(image_files: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    image_files
        .iter()
        .map(|input| {
            let name = create_output_filename(input);
            let stem = name.trim_end_matches(".png").to_string();
            let mut candidate = name;
            let mut suffix = 1;
            while !taken.insert(candidate.to_lowercase()) {
                candidate = format!("{}_{}.png", stem, suffix);
                suffix += 1;
            }
            output_dir.join(candidate)
        })
        .collect()
}

fn face_model(path: Option<&Path>) -> FaceDetectorModel {
    match path {
        #[cfg(feature = "rustface")]
        Some(path) => FaceDetectorModel::new(rustface_backend::RustfaceBackend::loader(
            path.to_path_buf(),
        )),
        #[cfg(not(feature = "rustface"))]
        Some(path) => {
            tracing::warn!(
                "Ignoring face model {}: built without face detection",
                path.display()
            );
            FaceDetectorModel::unavailable()
        }
        None => FaceDetectorModel::unavailable(),
    }
}

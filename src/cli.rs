use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::image_processing::geometry::Size;
use crate::image_processing::padding::PaddingRatio;
use crate::image_processing::resize::CropMode;
use crate::image_processing::roi::{RoiOptions, RoiType};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RoiArg {
    /// Keep the middle of the image
    #[value(name = "center")]
    Center,
    /// Keep the most visually salient area
    #[value(name = "prominent")]
    Prominent,
    /// Put the eyes of detected faces on the upper third line
    #[value(name = "rule-of-thirds")]
    RuleOfThirds,
    /// Combine detected faces with saliency
    #[value(name = "attention")]
    Attention,
}

impl From<RoiArg> for RoiType {
    fn from(arg: RoiArg) -> Self {
        match arg {
            RoiArg::Center => RoiType::Center,
            RoiArg::Prominent => RoiType::Prominent,
            RoiArg::RuleOfThirds => RoiType::RuleOfThirds,
            RoiArg::Attention => RoiType::Attention,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CropModeArg {
    /// Cut a region of exactly the target size
    #[value(name = "direct")]
    Direct,
    /// Cut the largest region with the target aspect ratio, then scale it
    #[value(name = "fit")]
    Fit,
}

impl From<CropModeArg> for CropMode {
    fn from(arg: CropModeArg) -> Self {
        match arg {
            CropModeArg::Direct => CropMode::Direct,
            CropModeArg::Fit => CropMode::Fit,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "roi-crop",
    about = "Crop images to a target size around their region of interest",
    long_about = "
ROI Crop

Crops batches of images to a target size, keeping the part that matters:
the middle, the most salient area, faces on the rule-of-thirds line, or a
mix of faces and saliency.

Example Usage:
  # Saliency + faces, scaled to 1600x900
  roi-crop -i ~/Photos -o ~/cropped -s 1600x900 --face-model seeta_fd_frontal_v1.0.bin

  # Rule of thirds on the single best face, exact-size crop
  roi-crop -i portrait.jpg -o out -s 600x800 -r rule-of-thirds -m direct \\
    --face-model seeta_fd_frontal_v1.0.bin --best-face

  # Saliency only, with padding and JSON progress for a frontend
  roi-crop -i ~/Photos -o out -r prominent --saliency-padding 0.1 --json-progress

  # Settings from a JSON file, overridden by the command line
  roi-crop --config crop.json -s 800x480"
)]
pub struct Args {
    /// Input directories or single image files (can be specified multiple times)
    #[arg(short = 'i', long = "input", value_name = "DIR|FILE")]
    pub input_paths: Vec<PathBuf>,

    /// Output directory for cropped images
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Target size (format: WIDTHxHEIGHT, e.g., 800x480)
    #[arg(
        short = 's',
        long = "size",
        default_value = "800x480",
        value_name = "WIDTHxHEIGHT"
    )]
    pub size: String,

    /// Region-of-interest strategy
    #[arg(short = 'r', long = "roi", default_value = "attention")]
    pub roi: RoiArg,

    /// Crop mode
    #[arg(short = 'm', long = "mode", default_value = "fit")]
    pub mode: CropModeArg,

    /// SeetaFace model file; without it face-aware strategies see no faces
    #[arg(long = "face-model", value_name = "FILE")]
    pub face_model: Option<PathBuf>,

    /// Minimum face detection confidence (0.0-1.0)
    #[arg(long = "confidence", default_value = "0.6", value_name = "THRESHOLD")]
    pub confidence: f32,

    /// Use only the best face instead of all detected faces
    #[arg(long = "best-face")]
    pub best_face: bool,

    /// Padding around detected faces, as a fraction of the face size (0.0-1.0)
    #[arg(long = "face-padding", default_value = "0.0", value_name = "RATIO")]
    pub face_padding: f32,

    /// Padding around the salient window, as a fraction of its size (0.0-1.0)
    #[arg(long = "saliency-padding", default_value = "0.0", value_name = "RATIO")]
    pub saliency_padding: f32,

    /// Comma-separated list of image extensions to process
    #[arg(long = "extensions", default_value = "jpg,jpeg,png,webp,tiff")]
    pub extensions_str: String,

    /// Number of parallel processing jobs (0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", default_value = "0", value_name = "N")]
    pub jobs: usize,

    /// Overwrite outputs that already exist
    #[arg(long = "force")]
    pub force: bool,

    /// JSON configuration file; command-line values take precedence
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Emit progress as JSON lines on stdout instead of progress bars
    #[arg(long = "json-progress")]
    pub json_progress: bool,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Per-side face padding from the config file
    #[arg(skip)]
    pub face_padding_sides: Option<PaddingRatio>,

    /// Per-side saliency padding from the config file
    #[arg(skip)]
    pub saliency_padding_sides: Option<PaddingRatio>,

    /// Default eye position `(x, y)` ratios from the config file
    #[arg(skip)]
    pub eye_center_ratio: Option<(f32, f32)>,
}

impl Args {
    /// Parse the size string into a target size
    pub fn parse_size(&self) -> Result<Size, String> {
        let (width, height) = self.size.split_once('x').ok_or_else(|| {
            format!(
                "Invalid size format '{}'. Use WIDTHxHEIGHT (e.g., 800x480)",
                self.size
            )
        })?;

        let width = width
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid width: '{}'", width))?;
        let height = height
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid height: '{}'", height))?;

        if width == 0 || height == 0 {
            return Err("Width and height must be greater than 0".to_string());
        }

        if width > 16384 || height > 16384 {
            return Err("Width and height must be at most 16384 pixels".to_string());
        }

        Ok(Size::new(width, height))
    }

    /// Parse the extensions string into a vector
    pub fn parse_extensions(&self) -> Vec<String> {
        self.extensions_str
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn roi_options(&self) -> RoiOptions {
        let defaults = RoiOptions::default();
        let (eye_x, eye_y) = self.eye_center_ratio.unwrap_or((
            defaults.default_eye_center_ratio_x,
            defaults.default_eye_center_ratio_y,
        ));
        RoiOptions {
            face_confidence: self.confidence,
            faces_union_all: !self.best_face,
            face_padding: self
                .face_padding_sides
                .unwrap_or_else(|| PaddingRatio::uniform(self.face_padding)),
            saliency_padding: self
                .saliency_padding_sides
                .unwrap_or_else(|| PaddingRatio::uniform(self.saliency_padding)),
            default_eye_center_ratio_x: eye_x,
            default_eye_center_ratio_y: eye_y,
        }
    }

    pub fn parallel_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input_paths: vec![],
            output_dir: PathBuf::new(),
            size: "800x480".to_string(),
            roi: RoiArg::Attention,
            mode: CropModeArg::Fit,
            face_model: None,
            confidence: 0.6,
            best_face: false,
            face_padding: 0.0,
            saliency_padding: 0.0,
            extensions_str: "jpg,png".to_string(),
            jobs: 0,
            force: false,
            config_file: None,
            json_progress: false,
            verbose: false,
            face_padding_sides: None,
            saliency_padding_sides: None,
            eye_center_ratio: None,
        }
    }
}

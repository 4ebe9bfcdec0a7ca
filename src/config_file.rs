use crate::cli::{Args, CropModeArg, RoiArg};
use crate::image_processing::padding::PaddingRatio;
use crate::image_processing::resize::CropMode;
use crate::image_processing::roi::RoiType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Saved crop settings, as written by a frontend.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    pub last_modified: Option<String>,
    pub config: CropConfigJson,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropConfigJson {
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub size: Option<String>,
    pub roi: Option<String>,
    pub mode: Option<String>,
    pub face_model: Option<String>,
    pub face_confidence: Option<f32>,
    pub faces_union_all: Option<bool>,
    pub face_padding: Option<PaddingRatio>,
    pub saliency_padding: Option<PaddingRatio>,
    pub default_eye_center_ratio_x: Option<f32>,
    pub default_eye_center_ratio_y: Option<f32>,
    pub extensions: Option<String>,
    pub jobs: Option<usize>,
    pub force: Option<bool>,
}

impl From<RoiType> for RoiArg {
    fn from(kind: RoiType) -> Self {
        match kind {
            RoiType::Center => RoiArg::Center,
            RoiType::Prominent => RoiArg::Prominent,
            RoiType::RuleOfThirds => RoiArg::RuleOfThirds,
            RoiType::Attention => RoiArg::Attention,
        }
    }
}

impl From<CropMode> for CropModeArg {
    fn from(mode: CropMode) -> Self {
        match mode {
            CropMode::Direct => CropModeArg::Direct,
            CropMode::Fit => CropModeArg::Fit,
        }
    }
}

impl Args {
    /// Load configuration from a JSON file and merge with command-line arguments
    /// Command-line arguments take precedence over config file values
    pub fn load_and_merge_config(&mut self) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: ConfigFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            let args_from_cli = std::env::args().collect::<Vec<_>>();
            self.merge_from_config(config.config, &args_from_cli)?;

            info!("Loaded configuration from: {:?}", config_path);
        }
        Ok(())
    }

    /// Fill every setting not given on `args_from_cli` from `config`.
    pub fn merge_from_config(
        &mut self,
        config: CropConfigJson,
        args_from_cli: &[String],
    ) -> Result<()> {
        let on_cli = |flags: &[&str]| {
            args_from_cli.iter().any(|a| {
                flags
                    .iter()
                    .any(|f| a == f || (f.starts_with("--") && a.starts_with(&format!("{}=", f))))
            })
        };

        if !on_cli(&["-i", "--input"]) {
            if let Some(input) = config.input_path {
                self.input_paths = vec![PathBuf::from(input)];
            }
        }

        if !on_cli(&["-o", "--output"]) {
            if let Some(output) = config.output_path {
                self.output_dir = PathBuf::from(output);
            }
        }

        if !on_cli(&["-s", "--size"]) {
            if let Some(size) = config.size {
                self.size = size;
            }
        }

        if !on_cli(&["-r", "--roi"]) {
            if let Some(roi) = config.roi {
                let kind: RoiType = roi
                    .parse()
                    .with_context(|| format!("Invalid roi '{}' in config file", roi))?;
                self.roi = kind.into();
            }
        }

        if !on_cli(&["-m", "--mode"]) {
            if let Some(mode) = config.mode {
                let mode: CropMode = mode
                    .parse()
                    .with_context(|| format!("Invalid mode '{}' in config file", mode))?;
                self.mode = mode.into();
            }
        }

        if self.face_model.is_none() {
            self.face_model = config.face_model.map(PathBuf::from);
        }

        if !on_cli(&["--confidence"]) {
            if let Some(confidence) = config.face_confidence {
                self.confidence = confidence;
            }
        }

        // Boolean flags - only apply if currently false (default)
        if !self.best_face {
            self.best_face = config.faces_union_all.map(|all| !all).unwrap_or(false);
        }

        if !self.force {
            self.force = config.force.unwrap_or(false);
        }

        if !on_cli(&["--face-padding"]) {
            self.face_padding_sides = config.face_padding;
        }

        if !on_cli(&["--saliency-padding"]) {
            self.saliency_padding_sides = config.saliency_padding;
        }

        if config.default_eye_center_ratio_x.is_some() || config.default_eye_center_ratio_y.is_some()
        {
            let defaults = crate::image_processing::roi::RoiOptions::default();
            self.eye_center_ratio = Some((
                config
                    .default_eye_center_ratio_x
                    .unwrap_or(defaults.default_eye_center_ratio_x),
                config
                    .default_eye_center_ratio_y
                    .unwrap_or(defaults.default_eye_center_ratio_y),
            ));
        }

        if !on_cli(&["--extensions"]) {
            if let Some(ext) = config.extensions {
                self.extensions_str = ext;
            }
        }

        if self.jobs == 0 {
            if let Some(jobs) = config.jobs {
                self.jobs = jobs;
            }
        }

        Ok(())
    }
}

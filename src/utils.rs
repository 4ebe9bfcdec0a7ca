use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output for
/// this crate. Log lines go to stderr so JSON progress on stdout stays clean.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "roi_crop=debug" } else { "roi_crop=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // a second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Validate command line arguments
pub fn validate_inputs(args: &Args) -> Result<()> {
    if args.input_paths.is_empty() {
        return Err(anyhow::anyhow!(
            "No input given. Use -i/--input or set inputPath in the config file"
        ));
    }

    for input_path in &args.input_paths {
        if !input_path.exists() {
            return Err(anyhow::anyhow!(
                "Input path does not exist: {}",
                input_path.display()
            ));
        }
        if !input_path.is_dir() && !input_path.is_file() {
            return Err(anyhow::anyhow!(
                "Input path is neither a file nor a directory: {}",
                input_path.display()
            ));
        }
    }

    args.parse_size().map_err(|e| anyhow::anyhow!(e))?;

    if args.parse_extensions().is_empty() {
        return Err(anyhow::anyhow!("No valid extensions specified"));
    }

    if args.jobs > 64 {
        return Err(anyhow::anyhow!(
            "Job count too high (max 64), got: {}",
            args.jobs
        ));
    }

    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(anyhow::anyhow!(
            "Face confidence must be between 0.0 and 1.0, got: {}",
            args.confidence
        ));
    }

    for (name, value) in [
        ("--face-padding", args.face_padding),
        ("--saliency-padding", args.saliency_padding),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(anyhow::anyhow!(
                "{} must be between 0.0 and 1.0, got: {}",
                name,
                value
            ));
        }
    }

    if let Some(model) = &args.face_model {
        if !model.is_file() {
            return Err(anyhow::anyhow!(
                "Face model file not found: {}",
                model.display()
            ));
        }
        #[cfg(not(feature = "rustface"))]
        {
            return Err(anyhow::anyhow!(
                "Face detection is not available. Rebuild with --features rustface"
            ));
        }
    }

    Ok(())
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file has one of the specified extensions
pub fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    get_file_extension(path).is_some_and(|ext| extensions.contains(&ext))
}

/// Make a file stem safe for any common filesystem.
///
/// Reserved and control characters become `_`, runs of `_` collapse, leading
/// and trailing `_` are trimmed and the result is capped at 100 bytes.
pub fn sanitize_file_stem(stem: &str) -> String {
    let mut result = String::with_capacity(stem.len());
    let mut prev_was_underscore = false;

    for ch in stem.chars() {
        let ch = match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if ch == '_' {
            if !prev_was_underscore {
                result.push(ch);
            }
            prev_was_underscore = true;
        } else {
            result.push(ch);
            prev_was_underscore = false;
        }
    }

    let trimmed = result.trim_matches('_');

    const MAX_NAME_LENGTH: usize = 100;
    if trimmed.len() <= MAX_NAME_LENGTH {
        return trimmed.to_string();
    }
    let mut end = MAX_NAME_LENGTH;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Output file name for `input_path`: `<sanitized stem>.png`.
pub fn create_output_filename(input_path: &Path) -> String {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_file_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{}.png", stem)
}

/// Print warning message
pub fn warn_println(message: &str) {
    eprintln!("{} {}", style("[WARNING]").yellow().bold(), message);
}

/// Print error message
pub fn error_println(message: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), message);
}

//! JSON output for frontend integration
//!
//! When --json-progress is enabled, progress and status information is
//! emitted as JSON lines on stdout and all other console output is suppressed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::image_processing::geometry::Rect;

/// Last progress emission timestamp (milliseconds since epoch)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

/// Minimum gap between two progress lines (~25 updates per second).
const PROGRESS_INTERVAL_MS: u64 = 40;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    FileCompleted {
        input_path: String,
        output_path: String,
        roi: Rect,
        processing_time_ms: u128,
    },
    FileSkipped {
        input_path: String,
        output_path: String,
    },
    FileFailed {
        input_path: String,
        error: String,
    },
    Summary {
        total_files: usize,
        processed: usize,
        skipped: usize,
        failed: usize,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Emit a progress line, throttled so a frontend is not flooded.
    ///
    /// The final update (`current == total`) is always emitted.
    pub fn progress(current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        if should_emit(now_ms, current, total) {
            Self::Progress {
                current,
                total,
                message: message.into(),
            }
            .emit();
        }
    }

    pub fn file_completed(input_path: &Path, output_path: &Path, roi: Rect, processing_time_ms: u128) {
        Self::FileCompleted {
            input_path: input_path.display().to_string(),
            output_path: output_path.display().to_string(),
            roi,
            processing_time_ms,
        }
        .emit();
    }

    pub fn file_skipped(input_path: &Path, output_path: &Path) {
        Self::FileSkipped {
            input_path: input_path.display().to_string(),
            output_path: output_path.display().to_string(),
        }
        .emit();
    }

    pub fn file_failed(input_path: &Path, error: impl Into<String>) {
        Self::FileFailed {
            input_path: input_path.display().to_string(),
            error: error.into(),
        }
        .emit();
    }

    pub fn summary(
        total_files: usize,
        processed: usize,
        skipped: usize,
        failed: usize,
        duration_secs: f64,
    ) {
        Self::Summary {
            total_files,
            processed,
            skipped,
            failed,
            duration_secs,
        }
        .emit();
    }
}

fn should_emit(now_ms: u64, current: usize, total: usize) -> bool {
    let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);
    if now_ms.saturating_sub(last_ms) >= PROGRESS_INTERVAL_MS || current == total {
        LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
        true
    } else {
        false
    }
}

//! Tunable job options.
//!
//! Everything here has a sensible default; hosts can override fields or load
//! the whole struct from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;

/// Default copy buffer: 64 KB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default ceiling for the progress shown before the scan completes.
pub const DEFAULT_PRESCAN_CEILING: f64 = 0.05;

/// Relative weights of byte progress and file-count progress.
///
/// Only the ratio matters; the weights are normalized when used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressWeights {
    pub by_size: f64,
    pub by_count: f64,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        ProgressWeights {
            by_size: 8.0,
            by_count: 2.0,
        }
    }
}

impl ProgressWeights {
    /// Normalized (size, count) pair summing to 1. Falls back to the
    /// default ratio if both weights are zero or not finite.
    pub fn normalized(&self) -> (f64, f64) {
        let size = if self.by_size.is_finite() { self.by_size.max(0.0) } else { 0.0 };
        let count = if self.by_count.is_finite() { self.by_count.max(0.0) } else { 0.0 };
        let sum = size + count;
        if sum <= 0.0 {
            return ProgressWeights::default().normalized();
        }
        (size / sum, count / sum)
    }
}

/// Options applied to a whole job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    /// Size of the buffer used for byte copies
    pub buffer_size: usize,

    /// Copy the modification time of regular files onto their copies
    pub preserve_file_times: bool,

    /// Verify each copied file against its source with this algorithm
    pub integrity_check: Option<ChecksumAlgorithm>,

    /// Blend of size and count progress once the scan has completed
    pub progress_weights: ProgressWeights,

    /// Highest progress reported before the scan has completed
    pub prescan_ceiling: f64,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            preserve_file_times: true,
            integrity_check: None,
            progress_weights: ProgressWeights::default(),
            prescan_ceiling: DEFAULT_PRESCAN_CEILING,
        }
    }
}

impl CopyOptions {
    /// Parse options from a JSON document. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let options: CopyOptions =
            serde_json::from_str(text).map_err(|e| EngineError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidOptions(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.buffer_size == 0 {
            return Err(EngineError::InvalidOptions(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.prescan_ceiling) {
            return Err(EngineError::InvalidOptions(format!(
                "prescan_ceiling must be within [0, 1], got {}",
                self.prescan_ceiling
            )));
        }
        Ok(())
    }
}

//! Blended completion estimate.
//!
//! Byte progress is accurate for large files but barely moves when a job is
//! made of many small files; file-count progress is the opposite. Once the
//! scan has totals, both are blended with fixed weights. Before that, only a
//! small capped placeholder is shown.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::options::ProgressWeights;

/// Counters the estimate is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSample {
    pub scan_completed: bool,
    pub total_bytes: u64,
    pub total_files: u64,
    pub bytes_transferred: u64,
    pub bytes_skipped: u64,
    pub processed_files: u64,
    /// Generic estimate used until the scan completes, in [0, 1]
    pub fallback: f64,
}

#[derive(Debug)]
pub struct ProgressEstimator {
    size_weight: f64,
    count_weight: f64,
    ceiling: f64,
    /// Bits of the highest value returned so far.
    high_water: AtomicU64,
}

impl ProgressEstimator {
    pub fn new(weights: ProgressWeights, ceiling: f64) -> Self {
        let (size_weight, count_weight) = weights.normalized();
        ProgressEstimator {
            size_weight,
            count_weight,
            ceiling: clamp_unit(ceiling),
            high_water: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Estimate for one sample, without the monotonic guard.
    pub fn raw(&self, sample: &ProgressSample) -> f64 {
        if !sample.scan_completed {
            return clamp_unit(sample.fallback).min(self.ceiling);
        }

        let by_count = if sample.total_files == 0 {
            0.0
        } else {
            // The entry being processed is already counted but not done yet.
            sample.processed_files.saturating_sub(1) as f64 / sample.total_files as f64
        };

        if sample.total_bytes == 0 {
            return clamp_unit(by_count);
        }

        let by_size =
            (sample.bytes_transferred + sample.bytes_skipped) as f64 / sample.total_bytes as f64;
        clamp_unit(by_size * self.size_weight + by_count * self.count_weight)
    }

    /// Estimate that never goes below a previously returned value.
    pub fn estimate(&self, sample: &ProgressSample) -> f64 {
        self.observe(self.raw(sample))
    }

    /// Record `value` and return the high-water mark.
    pub fn observe(&self, value: f64) -> f64 {
        // Non-negative IEEE 754 doubles order like their bit patterns.
        let bits = clamp_unit(value).to_bits();
        let previous = self.high_water.fetch_max(bits, Ordering::AcqRel);
        f64::from_bits(previous.max(bits))
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Frame-rate estimate and pipeline counters
//!
//! Both are written by the capture thread and read from anywhere without
//! locking.

use crate::constants::timing::FPS_SMOOTHING;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

const NO_TIMESTAMP: u64 = u64::MAX;

/// Exponential moving average of the delivered frame rate
///
/// `fps = 0.9 * fps + 0.1 * (1 / dt)` per frame. The first frame after a
/// reset only records its timestamp.
#[derive(Debug)]
pub struct FpsEstimate {
    fps_bits: AtomicU32,
    last_timestamp_ns: AtomicU64,
}

impl Default for FpsEstimate {
    fn default() -> Self {
        Self {
            fps_bits: AtomicU32::new(0.0f32.to_bits()),
            last_timestamp_ns: AtomicU64::new(NO_TIMESTAMP),
        }
    }
}

impl FpsEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a frame captured at `timestamp`. Single writer.
    pub fn record(&self, timestamp: Duration) {
        let now = u64::try_from(timestamp.as_nanos()).unwrap_or(NO_TIMESTAMP - 1);
        let previous = self.last_timestamp_ns.swap(now, Ordering::AcqRel);
        if previous == NO_TIMESTAMP || now <= previous {
            return;
        }

        let dt = (now - previous) as f32 / 1_000_000_000.0;
        let current = self.get();
        let next = FPS_SMOOTHING * current + (1.0 - FPS_SMOOTHING) * (1.0 / dt);
        self.fps_bits.store(next.to_bits(), Ordering::Release);
    }

    /// Current estimate, 0.0 before two frames have been seen
    pub fn get(&self) -> f32 {
        f32::from_bits(self.fps_bits.load(Ordering::Acquire))
    }

    /// Forget history; the estimate restarts from zero
    pub fn reset(&self) {
        self.last_timestamp_ns.store(NO_TIMESTAMP, Ordering::Release);
        self.fps_bits.store(0.0f32.to_bits(), Ordering::Release);
    }
}

/// Per-stage counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    delivered: AtomicU64,
    staged: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    last_processing_us: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames handed to the processor
    pub delivered: u64,
    /// Frames published to the staging buffer
    pub staged: u64,
    /// Frames dropped because no staging slot was free
    pub dropped: u64,
    /// Frames skipped after a conversion or transform failure
    pub failed: u64,
    /// Processing time of the most recent staged frame
    pub last_processing_us: u64,
}

impl PipelineStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_staged(&self, elapsed: Duration) {
        self.staged.fetch_add(1, Ordering::Relaxed);
        self.last_processing_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            staged: self.staged.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_processing_us: self.last_processing_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_only_records_timestamp() {
        let fps = FpsEstimate::new();
        fps.record(Duration::from_millis(100));
        assert_eq!(fps.get(), 0.0);
    }

    #[test]
    fn test_converges_towards_frame_rate() {
        let fps = FpsEstimate::new();
        let dt = Duration::from_nanos(33_333_333);
        for n in 0..=200u32 {
            fps.record(dt * n);
        }
        assert!((fps.get() - 30.0).abs() < 0.01, "got {}", fps.get());
    }

    #[test]
    fn test_closed_form_after_n_intervals() {
        let fps = FpsEstimate::new();
        let dt = Duration::from_millis(40);
        for n in 0..=5u32 {
            fps.record(dt * n);
        }
        let expected = 25.0 * (1.0 - 0.9f32.powi(5));
        assert!((fps.get() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_non_increasing_timestamp_ignored() {
        let fps = FpsEstimate::new();
        fps.record(Duration::from_millis(10));
        fps.record(Duration::from_millis(10));
        assert_eq!(fps.get(), 0.0);

        fps.reset();
        fps.record(Duration::from_millis(20));
        fps.record(Duration::from_millis(30));
        assert!((fps.get() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = PipelineStats::default();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_staged(Duration::from_micros(250));
        stats.record_dropped();
        let snap = stats.snapshot();
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.staged, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.last_processing_us, 250);
    }
}

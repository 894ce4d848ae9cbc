// SPDX-License-Identifier: GPL-3.0-only

//! Detection mode and parameters shared with the control thread

use crate::constants::detection;
use crate::media::Thresholds;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Edge detector parameters as set by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeParams {
    /// Low hysteresis bound
    pub threshold: u32,
    /// Multiplier forming the high bound
    pub ratio: u32,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            threshold: detection::DEFAULT_THRESHOLD,
            ratio: detection::DEFAULT_RATIO,
        }
    }
}

impl EdgeParams {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_ratio(self.threshold, self.ratio)
    }

    fn pack(self) -> u64 {
        (u64::from(self.threshold) << 32) | u64::from(self.ratio)
    }

    fn unpack(bits: u64) -> Self {
        Self {
            threshold: (bits >> 32) as u32,
            ratio: bits as u32,
        }
    }
}

/// What the processor reads once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub detection_enabled: bool,
    pub params: EdgeParams,
    /// Bumped on every change
    pub generation: u64,
}

/// Lock-free mode record
///
/// Threshold and ratio share one word so a reader never pairs a new
/// threshold with an old ratio.
#[derive(Debug)]
pub struct ModeState {
    detection_enabled: AtomicBool,
    params: AtomicU64,
    generation: AtomicU64,
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(false, EdgeParams::default())
    }
}

impl ModeState {
    pub fn new(detection_enabled: bool, params: EdgeParams) -> Self {
        Self {
            detection_enabled: AtomicBool::new(detection_enabled),
            params: AtomicU64::new(params.pack()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.detection_enabled.store(enabled, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Flip the mode, returning the new value
    pub fn toggle_detection(&self) -> bool {
        let enabled = !self.detection_enabled.fetch_xor(true, Ordering::AcqRel);
        self.generation.fetch_add(1, Ordering::AcqRel);
        enabled
    }

    pub fn set_parameters(&self, threshold: u32, ratio: u32) {
        self.params
            .store(EdgeParams { threshold, ratio }.pack(), Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled.load(Ordering::Acquire)
    }

    pub fn params(&self) -> EdgeParams {
        EdgeParams::unpack(self.params.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        // Generation first: a concurrent change shows up as a newer
        // generation on the next snapshot, never as an older one
        let generation = self.generation.load(Ordering::Acquire);
        ModeSnapshot {
            detection_enabled: self.detection_enabled(),
            params: self.params(),
            generation,
        }
    }
}

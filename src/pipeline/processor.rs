// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame processing: conversion, mode dispatch and staging
//!
//! Raw mode expands the semiplanar frame straight to RGBA. Detection mode
//! hands the frame to a [`VisionTransform`]. A transform that is missing or
//! fails costs the current frame only; the renderer keeps showing the last
//! staged one.

use super::mode::{EdgeParams, ModeState};
use super::staging::TextureStaging;
use super::telemetry::PipelineStats;
use crate::backends::camera::RawFrame;
use crate::constants::{detection, timing};
use crate::errors::{ProcessError, ProcessResult};
use crate::media::edges::{self, EdgeDetector};
use crate::media::yuv::{self, ColorConverter, SemiplanarFrame};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Edge-detection backend invoked in detection mode
pub trait VisionTransform: Send {
    fn name(&self) -> &str;

    /// Prepare the transform; called once before the first frame
    fn init(&mut self) -> ProcessResult<()>;

    /// Write an RGBA edge image of `frame` into `output`
    fn process_frame(
        &mut self,
        frame: &SemiplanarFrame<'_>,
        params: EdgeParams,
        output: &mut [u8],
    ) -> ProcessResult<()>;

    /// Free transform resources. Idempotent.
    fn release(&mut self);
}

/// CPU Canny transform painting edges over a solid background
pub struct CannyTransform {
    detector: EdgeDetector,
    edge_color: [u8; 3],
    background: [u8; 3],
    ready: bool,
}

impl Default for CannyTransform {
    fn default() -> Self {
        Self::new(detection::EDGE_COLOR)
    }
}

impl CannyTransform {
    pub fn new(edge_color: [u8; 3]) -> Self {
        Self {
            detector: EdgeDetector::new(),
            edge_color,
            background: detection::BACKGROUND_COLOR,
            ready: false,
        }
    }
}

impl VisionTransform for CannyTransform {
    fn name(&self) -> &str {
        "canny-cpu"
    }

    fn init(&mut self) -> ProcessResult<()> {
        let found = edges::run_self_test();
        if found == 0 {
            return Err(ProcessError::TransformUnavailable(
                "self-test found no edges".into(),
            ));
        }
        debug!(edges = found, "Canny self-test passed");
        self.ready = true;
        Ok(())
    }

    fn process_frame(
        &mut self,
        frame: &SemiplanarFrame<'_>,
        params: EdgeParams,
        output: &mut [u8],
    ) -> ProcessResult<()> {
        if !self.ready {
            return Err(ProcessError::TransformUnavailable("not initialized".into()));
        }
        if output.len() != yuv::rgba_len(frame.width, frame.height) {
            return Err(ProcessError::TransformFailure(format!(
                "output holds {} bytes for a {}x{} frame",
                output.len(),
                frame.width,
                frame.height
            )));
        }

        let map = self.detector.detect(
            frame.luma(),
            frame.width as usize,
            frame.height as usize,
            params.thresholds(),
        )?;
        edges::edges_to_rgba(map, self.edge_color, self.background, output);
        Ok(())
    }

    fn release(&mut self) {
        if self.ready {
            self.ready = false;
            self.detector = EdgeDetector::new();
            debug!("Canny transform released");
        }
    }
}

/// Result of handling one raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Published with this staging sequence number
    Staged(u64),
    /// Dropped; staging had no free slot
    Dropped,
    /// Skipped after a conversion or transform failure
    Skipped,
}

pub struct FrameProcessor {
    transform: Box<dyn VisionTransform>,
    transform_error: Option<ProcessError>,
    converter: ColorConverter,
    staging: Arc<TextureStaging>,
    mode: Arc<ModeState>,
    stats: Arc<PipelineStats>,
    frames: u64,
}

impl FrameProcessor {
    /// Create a processor and initialize its transform
    ///
    /// A transform that fails to initialize leaves raw mode working;
    /// detection-mode frames are then skipped.
    pub fn new(
        mut transform: Box<dyn VisionTransform>,
        staging: Arc<TextureStaging>,
        mode: Arc<ModeState>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let transform_error = match transform.init() {
            Ok(()) => {
                info!(transform = transform.name(), "Vision transform ready");
                None
            }
            Err(e) => {
                error!(transform = transform.name(), error = %e, "Vision transform unavailable");
                Some(e)
            }
        };

        Self {
            transform,
            transform_error,
            converter: ColorConverter::new(),
            staging,
            mode,
            stats,
            frames: 0,
        }
    }

    /// Initialization error of the transform, if any
    pub fn transform_error(&self) -> Option<&ProcessError> {
        self.transform_error.as_ref()
    }

    /// Convert, process and stage one camera frame
    ///
    /// Never fails; problems are logged, counted and reported in the outcome.
    pub fn handle_raw_frame(&mut self, raw: RawFrame) -> FrameOutcome {
        self.frames += 1;
        self.stats.record_delivered();
        let started = Instant::now();

        let result = match self.converter.convert(&raw) {
            Ok(frame) => Self::process_into(
                &mut *self.transform,
                self.transform_error.as_ref(),
                &self.staging,
                &self.mode,
                &frame,
            ),
            Err(e) => Err(e),
        };
        // The raw frame is released here, after exactly one conversion
        drop(raw);

        match result {
            Ok(sequence) => {
                self.stats.record_staged(started.elapsed());
                if self.frames % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        frame = self.frames,
                        sequence,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "Frame staged"
                    );
                }
                FrameOutcome::Staged(sequence)
            }
            Err(ProcessError::NoFreeSlot) => {
                self.stats.record_dropped();
                debug!(frame = self.frames, "No free staging slot, frame dropped");
                FrameOutcome::Dropped
            }
            Err(e) => {
                self.stats.record_failed();
                warn!(frame = self.frames, error = %e, "Frame skipped");
                FrameOutcome::Skipped
            }
        }
    }

    fn process_into(
        transform: &mut dyn VisionTransform,
        transform_error: Option<&ProcessError>,
        staging: &TextureStaging,
        mode: &ModeState,
        frame: &SemiplanarFrame<'_>,
    ) -> ProcessResult<u64> {
        if staging.dimensions() != (frame.width, frame.height) {
            return Err(ProcessError::InvalidFrame(format!(
                "{}x{} frame for {}x{} staging",
                frame.width,
                frame.height,
                staging.dimensions().0,
                staging.dimensions().1
            )));
        }

        // One snapshot per frame; changes apply from the next frame on
        let snapshot = mode.snapshot();
        if snapshot.detection_enabled {
            if let Some(e) = transform_error {
                return Err(e.clone());
            }
            staging.write_next(snapshot.generation, |output| {
                transform.process_frame(frame, snapshot.params, output)
            })
        } else {
            staging.write_next(snapshot.generation, |output| {
                yuv::semiplanar_to_rgba(frame, output)
            })
        }
    }

    /// Release the transform; detection-mode frames are skipped afterwards
    pub fn release(&mut self) {
        if self.transform_error.is_none() {
            self.transform.release();
            self.transform_error = Some(ProcessError::TransformUnavailable("released".into()));
            info!(transform = self.transform.name(), "Vision transform released");
        }
    }
}

impl Drop for FrameProcessor {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::synthetic::test_pattern;
    use std::time::Duration;

    struct FailingTransform {
        init_ok: bool,
    }

    impl VisionTransform for FailingTransform {
        fn name(&self) -> &str {
            "failing"
        }
        fn init(&mut self) -> ProcessResult<()> {
            if self.init_ok {
                Ok(())
            } else {
                Err(ProcessError::TransformUnavailable("no runtime".into()))
            }
        }
        fn process_frame(
            &mut self,
            _frame: &SemiplanarFrame<'_>,
            _params: EdgeParams,
            output: &mut [u8],
        ) -> ProcessResult<()> {
            output.fill(0xAB);
            Err(ProcessError::TransformFailure("native call failed".into()))
        }
        fn release(&mut self) {}
    }

    fn raw(width: u32, height: u32, index: u64) -> RawFrame {
        RawFrame {
            width,
            height,
            planes: test_pattern(width, height, index, 2, 0),
            timestamp: Duration::from_millis(index * 33),
        }
    }

    fn processor(
        transform: Box<dyn VisionTransform>,
        detection: bool,
    ) -> (FrameProcessor, Arc<TextureStaging>, Arc<PipelineStats>) {
        let staging = Arc::new(TextureStaging::new(32, 16));
        let mode = Arc::new(ModeState::new(detection, EdgeParams::default()));
        let stats = Arc::new(PipelineStats::default());
        let processor = FrameProcessor::new(transform, staging.clone(), mode, stats.clone());
        (processor, staging, stats)
    }

    #[test]
    fn test_raw_mode_stages_color() {
        let (mut processor, staging, stats) = processor(Box::new(CannyTransform::default()), false);
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 0)), FrameOutcome::Staged(1));
        assert_eq!(stats.snapshot().staged, 1);
        assert!(staging.read_latest(|f| f.pixels.chunks(4).all(|px| px[3] == 255)).unwrap());
    }

    #[test]
    fn test_raw_mode_ignores_parameters() {
        let (mut processor, staging, _) = processor(Box::new(CannyTransform::default()), false);
        processor.handle_raw_frame(raw(32, 16, 3));
        let first = staging.read_latest(|f| f.pixels.clone()).unwrap();

        processor.mode.set_parameters(0, 9);
        processor.handle_raw_frame(raw(32, 16, 3));
        let second = staging.read_latest(|f| f.pixels.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_detection_mode_uses_edge_colors() {
        let (mut processor, staging, _) = processor(Box::new(CannyTransform::default()), true);
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 2)), FrameOutcome::Staged(1));
        let (edge, background) = staging
            .read_latest(|f| {
                let edge = f.pixels.chunks(4).filter(|px| *px == [255, 0, 255, 255]).count();
                let background = f.pixels.chunks(4).filter(|px| *px == [0, 0, 0, 255]).count();
                (edge, background)
            })
            .unwrap();
        assert!(edge > 0);
        assert_eq!(edge + background, 32 * 16);
    }

    #[test]
    fn test_transform_failure_keeps_last_frame() {
        let (mut processor, staging, stats) =
            processor(Box::new(FailingTransform { init_ok: true }), false);
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 0)), FrameOutcome::Staged(1));
        let before = staging.read_latest(|f| f.pixels.clone()).unwrap();

        processor.mode.set_detection_enabled(true);
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 1)), FrameOutcome::Skipped);
        assert_eq!(stats.snapshot().failed, 1);
        assert_eq!(staging.latest_sequence(), Some(1));
        assert_eq!(staging.read_latest(|f| f.pixels.clone()).unwrap(), before);
    }

    #[test]
    fn test_unavailable_transform_only_affects_detection() {
        let (mut processor, _, _) = processor(Box::new(FailingTransform { init_ok: false }), true);
        assert!(processor.transform_error().is_some());
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 0)), FrameOutcome::Skipped);

        processor.mode.set_detection_enabled(false);
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 1)), FrameOutcome::Staged(1));
    }

    #[test]
    fn test_wrong_size_frame_skipped() {
        let (mut processor, staging, _) = processor(Box::new(CannyTransform::default()), false);
        assert_eq!(processor.handle_raw_frame(raw(16, 16, 0)), FrameOutcome::Skipped);
        assert!(!staging.has_frame());
    }

    #[test]
    fn test_released_transform_skips_detection() {
        let (mut processor, _, _) = processor(Box::new(CannyTransform::default()), true);
        processor.release();
        assert_eq!(processor.handle_raw_frame(raw(32, 16, 0)), FrameOutcome::Skipped);
    }
}

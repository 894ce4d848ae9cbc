// SPDX-License-Identifier: GPL-3.0-only

//! Preview pipeline wiring
//!
//! ```text
//! FrameSource ──RawFrame──▶ FrameProcessor ──RGBA──▶ TextureStaging ──▶ Renderer
//!  (capture thread)          (ModeState gate)         (double buffer)   (render thread)
//! ```
//!
//! The capture thread drives conversion and processing. The render thread
//! only reads [`TextureStaging`], and the control thread only touches
//! [`ModeState`] and the telemetry through a [`PipelineControl`] handle.

pub mod mode;
pub mod processor;
pub mod staging;
pub mod telemetry;

pub use mode::{EdgeParams, ModeSnapshot, ModeState};
pub use processor::{CannyTransform, FrameOutcome, FrameProcessor, VisionTransform};
pub use staging::{StagedFrame, TextureStaging};
pub use telemetry::{FpsEstimate, PipelineStats, StatsSnapshot};

use crate::backends::camera::{CameraProvider, FrameSource, SourceState, StreamConfig};
use crate::config::Config;
use crate::errors::{CameraResult, ProcessError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Session parameters for [`EdgePipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub width: u32,
    pub height: u32,
    pub open_timeout: Duration,
    pub detection_enabled: bool,
    pub params: EdgeParams,
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            width: config.preview_width,
            height: config.preview_height,
            open_timeout: config.open_timeout(),
            detection_enabled: config.detection_enabled,
            params: EdgeParams {
                threshold: config.threshold,
                ratio: config.ratio,
            },
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Cloneable handle for the control thread
#[derive(Clone)]
pub struct PipelineControl {
    mode: Arc<ModeState>,
    fps: Arc<FpsEstimate>,
    stats: Arc<PipelineStats>,
}

impl PipelineControl {
    pub fn set_parameters(&self, threshold: u32, ratio: u32) {
        self.mode.set_parameters(threshold, ratio);
        info!(threshold, ratio, "Edge parameters updated");
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.mode.set_detection_enabled(enabled);
        info!(enabled, "Detection mode set");
    }

    pub fn toggle_detection(&self) -> bool {
        let enabled = self.mode.toggle_detection();
        info!(enabled, "Detection mode toggled");
        enabled
    }

    pub fn mode(&self) -> ModeSnapshot {
        self.mode.snapshot()
    }

    pub fn fps_estimate(&self) -> f32 {
        self.fps.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Camera source, processor and staging for one preview
pub struct EdgePipeline {
    source: FrameSource,
    processor: Arc<Mutex<FrameProcessor>>,
    staging: Arc<TextureStaging>,
    control: PipelineControl,
}

impl EdgePipeline {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        transform: Box<dyn VisionTransform>,
        options: PipelineOptions,
    ) -> Self {
        let source = FrameSource::new(provider, StreamConfig::yuv420(options.width, options.height))
            .with_open_timeout(options.open_timeout);
        let staging = Arc::new(TextureStaging::new(options.width, options.height));
        let mode = Arc::new(ModeState::new(options.detection_enabled, options.params));
        let stats = Arc::new(PipelineStats::default());

        let processor = Arc::new(Mutex::new(FrameProcessor::new(
            transform,
            Arc::clone(&staging),
            Arc::clone(&mode),
            Arc::clone(&stats),
        )));

        let handler_processor = Arc::clone(&processor);
        source.set_frame_handler(Box::new(move |raw| {
            let mut processor = handler_processor
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            processor.handle_raw_frame(raw);
        }));

        let control = PipelineControl {
            mode,
            fps: source.fps_estimate(),
            stats,
        };

        Self {
            source,
            processor,
            staging,
            control,
        }
    }

    /// Open a camera and start streaming; returns the device ID
    pub fn start(&self) -> CameraResult<String> {
        self.source.start()
    }

    /// Stop streaming and close the camera
    pub fn stop(&self) -> CameraResult<()> {
        self.source.stop()
    }

    pub fn source_state(&self) -> SourceState {
        self.source.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.source.is_streaming()
    }

    pub fn set_parameters(&self, threshold: u32, ratio: u32) {
        self.control.set_parameters(threshold, ratio);
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.control.set_detection_enabled(enabled);
    }

    pub fn toggle_detection(&self) -> bool {
        self.control.toggle_detection()
    }

    pub fn fps_estimate(&self) -> f32 {
        self.control.fps_estimate()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.control.stats()
    }

    pub fn mode(&self) -> ModeSnapshot {
        self.control.mode()
    }

    /// Handle for a control thread
    pub fn control(&self) -> PipelineControl {
        self.control.clone()
    }

    /// Staging buffer the renderer reads from
    pub fn staging(&self) -> Arc<TextureStaging> {
        Arc::clone(&self.staging)
    }

    /// Initialization error of the vision transform, if any
    pub fn transform_error(&self) -> Option<ProcessError> {
        self.processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transform_error()
            .cloned()
    }
}

impl Drop for EdgePipeline {
    fn drop(&mut self) {
        let _ = self.source.stop();
        self.processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    }
}

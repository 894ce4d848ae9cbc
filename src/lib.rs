// SPDX-License-Identifier: MPL-2.0

//! edgecam - real-time camera preview with optional edge detection
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera provider abstraction and the frame source
//! - [`media`]: YUV conversion and Canny edge detection
//! - [`pipeline`]: Mode state, frame processing, staging and telemetry
//! - [`render`]: Renderer lifecycle and the wgpu quad backend
//! - [`gpu`]: wgpu device creation
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use edgecam::backends::camera::SyntheticProvider;
//! use edgecam::pipeline::{CannyTransform, EdgePipeline, PipelineOptions};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(SyntheticProvider::default_rig(30, 2));
//! let pipeline = EdgePipeline::new(
//!     provider,
//!     Box::new(CannyTransform::default()),
//!     PipelineOptions::default(),
//! );
//! pipeline.start().unwrap();
//! pipeline.toggle_detection();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipeline;
pub mod render;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult, CameraError, ProcessError, RenderError};
pub use pipeline::{EdgeParams, EdgePipeline, PipelineControl, PipelineOptions};
pub use render::{Renderer, RendererState, WgpuBackend};

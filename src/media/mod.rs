// SPDX-License-Identifier: MPL-2.0

//! CPU image processing for the preview pipeline
//!
//! # Color Space Conversion
//!
//! Camera frames arrive as planar YUV 4:2:0 with device-specific strides.
//! The [`yuv`] module repacks them into one semiplanar buffer (luma followed
//! by V,U chroma) and expands that buffer into RGBA with BT.601 coefficients.
//!
//! # Edge Detection
//!
//! The [`edges`] module implements the Canny detector used in detection mode.
//!
//! # Modules
//!
//! - [`yuv`]: Planar to semiplanar repacking and RGBA expansion
//! - [`edges`]: Gradient, non-maximum suppression and hysteresis

pub mod edges;
pub mod yuv;

// Re-export commonly used types
pub use edges::{EdgeDetector, Thresholds, run_self_test};
pub use yuv::{ChromaLayout, ColorConverter, SemiplanarFrame};

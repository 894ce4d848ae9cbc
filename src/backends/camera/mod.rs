// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! The platform camera service is an external collaborator. The pipeline only
//! sees it through two traits:
//!
//! ```text
//! ┌─────────────────────┐
//! │     FrameSource     │  ← device selection, open lock, capture thread
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraProvider Trait│  ← enumerate / characteristics / open
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraDevice Trait │  ← session start, latest-frame reader, close
//! └─────────────────────┘
//! ```

pub mod device_lock;
pub mod frame_loop;
pub mod source;
pub mod synthetic;
pub mod types;

pub use source::{FrameHandler, FrameSource, SourceState, candidate_devices};
pub use synthetic::{SyntheticCameraSpec, SyntheticProvider};
pub use types::*;

use crate::errors::CameraResult;
use std::time::Duration;

/// Camera capability query and device open
pub trait CameraProvider: Send + Sync {
    /// Device IDs in enumeration order
    fn device_ids(&self) -> CameraResult<Vec<String>>;

    /// Facing direction and stream configuration map of one device
    fn characteristics(&self, id: &str) -> CameraResult<DeviceCharacteristics>;

    /// Open a device for the given stream configuration
    ///
    /// `on_event` receives opened / disconnected / error outcomes for the
    /// lifetime of the returned device.
    fn open(
        &self,
        id: &str,
        config: &StreamConfig,
        on_event: DeviceEventCallback,
    ) -> CameraResult<Box<dyn CameraDevice>>;
}

/// An opened camera device
pub trait CameraDevice: Send {
    /// Device ID this handle was opened with
    fn id(&self) -> &str;

    /// Create the capture session and begin continuous capture
    fn start_session(&mut self) -> CameraResult<()>;

    /// Wait up to `timeout` for a completed frame and return the newest one
    ///
    /// Older completed frames that were never handed out are discarded.
    /// `Ok(None)` means nothing completed within the timeout.
    fn acquire_latest_frame(&mut self, timeout: Duration) -> CameraResult<Option<RawFrame>>;

    /// Stop capture and tear down the session. Idempotent.
    fn close_session(&mut self);

    /// Release the device. Idempotent.
    fn close(&mut self);
}

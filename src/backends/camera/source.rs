// SPDX-License-Identifier: GPL-3.0-only

//! Frame source: device selection, session lifecycle and frame delivery
//!
//! ```text
//!   Idle ──start()──▶ Opening ──session up──▶ Streaming
//!    ▲                  │                        │
//!    │            open/select error         disconnect / device error
//!    │                  ▼                        ▼
//!    └────stop()────── Failed ◀──────────────────┘
//! ```
//!
//! `start()` and `stop()` are serialized through a [`DeviceLock`] with a
//! bounded wait. Frames are pulled on a dedicated capture thread, always
//! taking the newest completed frame, and handed to the registered handler.

use super::device_lock::DeviceLock;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::{
    CameraDevice, CameraProvider, DeviceEvent, DeviceEventCallback, Facing, RawFrame, StreamConfig,
};
use crate::constants::{capture, timing};
use crate::errors::{CameraError, CameraResult};
use crate::pipeline::telemetry::FpsEstimate;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Consumer of raw frames, called on the capture thread
pub type FrameHandler = Box<dyn FnMut(RawFrame) + Send>;

/// Lifecycle state of a [`FrameSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Opening,
    Streaming { device: String },
    Failed(CameraError),
}

type SharedState = Arc<Mutex<SourceState>>;
type SharedHandler = Arc<Mutex<Option<FrameHandler>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Devices that advertise `request`, in the order they should be tried
///
/// Back-facing devices come first, then the rest in enumeration order.
/// A device is skipped when it has no configuration map or the map lacks
/// the requested format and size.
pub fn candidate_devices(
    provider: &dyn CameraProvider,
    request: &StreamConfig,
) -> CameraResult<Vec<String>> {
    let ids = provider.device_ids()?;
    if ids.is_empty() {
        warn!("No camera devices enumerated");
        return Err(CameraError::DeviceUnavailable);
    }

    let mut candidates = Vec::with_capacity(ids.len());
    for id in ids {
        match provider.characteristics(&id) {
            Ok(chars) => candidates.push((id, chars)),
            Err(e) => warn!(id = %id, error = %e, "Failed to query camera characteristics"),
        }
    }

    // Stable sort keeps enumeration order within each group
    candidates.sort_by_key(|(_, chars)| chars.facing != Some(Facing::Back));

    let usable: Vec<String> = candidates
        .into_iter()
        .filter_map(|(id, chars)| {
            if chars.supports(request) {
                return Some(id);
            }
            let reason = CameraError::StreamConfigUnsupported { device: id.clone() };
            debug!(id = %id, request = %request, "{}", reason);
            None
        })
        .collect();

    if usable.is_empty() {
        warn!(request = %request, "No camera supports the requested stream");
        return Err(CameraError::DeviceUnavailable);
    }
    Ok(usable)
}

/// State owned by the capture thread while streaming
struct CaptureSession {
    device: Box<dyn CameraDevice>,
    handler: SharedHandler,
    state: SharedState,
    fps: Arc<FpsEstimate>,
    frames: u64,
}

impl CaptureSession {
    fn step(&mut self) -> LoopAction {
        match self.device.acquire_latest_frame(capture::FRAME_WAIT_TIMEOUT) {
            Ok(Some(frame)) => {
                self.fps.record(frame.timestamp);
                self.frames += 1;
                if self.frames % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        frames = self.frames,
                        fps = f64::from(self.fps.get()),
                        "Capture progress"
                    );
                }
                self.deliver(frame);
                LoopAction::Continue
            }
            Ok(None) => LoopAction::Continue,
            Err(e) => {
                error!(device = self.device.id(), error = %e, "Capture stopped");
                *lock(&self.state) = SourceState::Failed(e);
                LoopAction::Stop
            }
        }
    }

    fn deliver(&mut self, frame: RawFrame) {
        let mut guard = lock(&self.handler);
        let Some(consume) = guard.as_mut() else {
            return;
        };
        // A failing consumer costs one frame, never the capture thread
        if catch_unwind(AssertUnwindSafe(|| consume(frame))).is_err() {
            warn!(frame = self.frames, "Frame handler panicked, frame skipped");
        }
    }
}

/// Owns the camera for one preview session at a time
pub struct FrameSource {
    provider: Arc<dyn CameraProvider>,
    request: StreamConfig,
    open_timeout: Duration,
    device_lock: DeviceLock,
    state: SharedState,
    handler: SharedHandler,
    fps: Arc<FpsEstimate>,
    capture: Mutex<Option<CaptureLoopController<CaptureSession>>>,
}

impl FrameSource {
    pub fn new(provider: Arc<dyn CameraProvider>, request: StreamConfig) -> Self {
        Self {
            provider,
            request,
            open_timeout: capture::OPEN_LOCK_TIMEOUT,
            device_lock: DeviceLock::new(),
            state: Arc::new(Mutex::new(SourceState::Idle)),
            handler: Arc::new(Mutex::new(None)),
            fps: Arc::new(FpsEstimate::new()),
            capture: Mutex::new(None),
        }
    }

    /// Override the bounded wait used for open and close
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Register the single frame consumer, replacing any previous one
    pub fn set_frame_handler(&self, handler: FrameHandler) {
        *lock(&self.handler) = Some(handler);
    }

    pub fn state(&self) -> SourceState {
        lock(&self.state).clone()
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state(), SourceState::Streaming { .. })
            && lock(&self.capture).as_ref().is_some_and(|c| c.is_running())
    }

    /// Shared FPS estimate, updated on every delivered frame
    pub fn fps_estimate(&self) -> Arc<FpsEstimate> {
        Arc::clone(&self.fps)
    }

    /// Select, open and start streaming from a camera
    ///
    /// Returns the ID of the device that was opened.
    pub fn start(&self) -> CameraResult<String> {
        let _guard = self.device_lock.acquire(self.open_timeout)?;
        let mut slot = lock(&self.capture);

        let streaming = matches!(*lock(&self.state), SourceState::Streaming { .. });
        if streaming && slot.as_ref().is_some_and(|c| c.is_running()) {
            return Err(CameraError::AlreadyRunning);
        }
        // A previous session that failed on its own still holds the device
        Self::shutdown_capture(&mut slot);

        *lock(&self.state) = SourceState::Opening;
        match self.open_and_stream() {
            Ok((id, controller)) => {
                *slot = Some(controller);
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Failed to start camera");
                *lock(&self.state) = SourceState::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn open_and_stream(&self) -> CameraResult<(String, CaptureLoopController<CaptureSession>)> {
        let candidates = candidate_devices(self.provider.as_ref(), &self.request)?;
        let (id, mut device) = self.open_first(candidates)?;
        if let Err(e) = device.start_session() {
            device.close();
            return Err(e);
        }

        self.fps.reset();
        let session = CaptureSession {
            device,
            handler: Arc::clone(&self.handler),
            state: Arc::clone(&self.state),
            fps: Arc::clone(&self.fps),
            frames: 0,
        };

        // Set before the thread runs so an early failure is not overwritten
        *lock(&self.state) = SourceState::Streaming { device: id.clone() };

        let controller =
            CaptureLoopController::start("camera-capture", session, CaptureSession::step).map_err(
                |e| CameraError::Backend(format!("Failed to spawn capture thread: {}", e)),
            )?;

        info!(id = %id, request = %self.request, "Camera streaming");
        Ok((id, controller))
    }

    /// Open the first candidate that accepts the stream
    ///
    /// A device that rejects the configuration at open time is passed over
    /// for the next one; any other open error ends the search.
    fn open_first(&self, candidates: Vec<String>) -> CameraResult<(String, Box<dyn CameraDevice>)> {
        for id in candidates {
            match self.provider.open(&id, &self.request, self.event_callback()) {
                Ok(device) => {
                    info!(id = %id, "Selected camera");
                    return Ok((id, device));
                }
                Err(e @ CameraError::StreamConfigUnsupported { .. }) => {
                    debug!(id = %id, error = %e, "Camera rejected stream, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(request = %self.request, "No camera accepted the requested stream");
        Err(CameraError::DeviceUnavailable)
    }

    fn event_callback(&self) -> DeviceEventCallback {
        let events_state = Arc::clone(&self.state);
        Arc::new(move |event: DeviceEvent| {
            let mut state = lock(&events_state);
            match event {
                DeviceEvent::Opened => debug!("Camera reported opened"),
                DeviceEvent::Disconnected => {
                    warn!("Camera disconnected");
                    *state = SourceState::Failed(CameraError::Disconnected);
                }
                DeviceEvent::Error(code) => {
                    error!(code, "Camera reported error");
                    *state = SourceState::Failed(CameraError::DeviceError(code));
                }
            }
        })
    }

    /// Stop capture and release the device
    ///
    /// Safe to call when nothing is running.
    pub fn stop(&self) -> CameraResult<()> {
        let _guard = self.device_lock.acquire(self.open_timeout)?;
        Self::shutdown_capture(&mut lock(&self.capture));
        *lock(&self.state) = SourceState::Idle;
        Ok(())
    }

    fn shutdown_capture(slot: &mut Option<CaptureLoopController<CaptureSession>>) {
        let Some(mut capture) = slot.take() else {
            return;
        };
        match capture.stop() {
            Some(mut session) => {
                session.device.close_session();
                session.device.close();
                info!(
                    id = session.device.id(),
                    frames = session.frames,
                    "Camera closed"
                );
            }
            None => warn!("Capture thread panicked; device dropped without a clean close"),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        Self::shutdown_capture(&mut lock(&self.capture));
    }
}

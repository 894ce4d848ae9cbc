// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera provider
//!
//! Stands in for the platform camera service: it enumerates a configurable
//! set of devices and streams a moving 4:2:0 test pattern from a producer
//! thread. The chroma planes can be laid out planar (pixel stride 1) or
//! interleaved (pixel stride 2, both planes aliasing one buffer offset by a
//! byte) the way mobile camera stacks hand them out.

use super::{
    CameraDevice, CameraProvider, DeviceCharacteristics, DeviceEvent, DeviceEventCallback,
    Facing, Plane, RawFrame, StreamConfig,
};
use crate::constants::capture;
use crate::errors::{CameraError, CameraResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Description of one synthetic device
#[derive(Debug, Clone)]
pub struct SyntheticCameraSpec {
    pub id: String,
    pub facing: Option<Facing>,
    /// `None` models a device without a stream configuration map
    pub stream_configs: Option<Vec<StreamConfig>>,
    pub fps: u32,
    pub chroma_pixel_stride: usize,
    /// Extra bytes appended to every luma row
    pub luma_row_padding: usize,
}

impl SyntheticCameraSpec {
    /// A device offering the default preview size at 30 fps with interleaved chroma
    pub fn new(id: impl Into<String>, facing: Option<Facing>) -> Self {
        Self {
            id: id.into(),
            facing,
            stream_configs: Some(vec![StreamConfig::yuv420(
                capture::PREVIEW_WIDTH,
                capture::PREVIEW_HEIGHT,
            )]),
            fps: 30,
            chroma_pixel_stride: 2,
            luma_row_padding: 0,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_chroma_pixel_stride(mut self, stride: usize) -> Self {
        self.chroma_pixel_stride = stride.max(1);
        self
    }

    pub fn with_luma_row_padding(mut self, padding: usize) -> Self {
        self.luma_row_padding = padding;
        self
    }

    pub fn with_stream_configs(mut self, configs: Option<Vec<StreamConfig>>) -> Self {
        self.stream_configs = configs;
        self
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    open: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

/// In-process camera provider producing test-pattern frames
pub struct SyntheticProvider {
    cameras: Vec<SyntheticCameraSpec>,
    counters: Arc<SessionCounters>,
    links: Mutex<Vec<Weak<DeviceLink>>>,
}

impl SyntheticProvider {
    pub fn new(cameras: Vec<SyntheticCameraSpec>) -> Self {
        Self {
            cameras,
            counters: Arc::new(SessionCounters::default()),
            links: Mutex::new(Vec::new()),
        }
    }

    /// A front camera enumerated before a back camera, both at the default preview size
    pub fn default_rig(fps: u32, chroma_pixel_stride: usize) -> Self {
        Self::new(vec![
            SyntheticCameraSpec::new("0", Some(Facing::Front))
                .with_fps(fps)
                .with_chroma_pixel_stride(chroma_pixel_stride),
            SyntheticCameraSpec::new("1", Some(Facing::Back))
                .with_fps(fps)
                .with_chroma_pixel_stride(chroma_pixel_stride),
        ])
    }

    /// Devices currently open
    pub fn open_devices(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Highest number of devices that were open at the same time
    pub fn peak_open_devices(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Number of successful `open` calls
    pub fn total_opens(&self) -> usize {
        self.counters.total.load(Ordering::SeqCst)
    }

    /// Simulate the device going away. Returns false if it is not open.
    pub fn disconnect(&self, id: &str) -> bool {
        self.fail_device(id, CameraError::Disconnected, DeviceEvent::Disconnected)
    }

    /// Simulate the device reporting an error code
    pub fn report_error(&self, id: &str, code: i32) -> bool {
        self.fail_device(id, CameraError::DeviceError(code), DeviceEvent::Error(code))
    }

    fn fail_device(&self, id: &str, error: CameraError, event: DeviceEvent) -> bool {
        let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        links.retain(|link| link.strong_count() > 0);

        let mut hit = false;
        for link in links.iter().filter_map(Weak::upgrade) {
            if link.id == id {
                link.fail(error.clone(), event);
                hit = true;
            }
        }
        hit
    }

    #[cfg(test)]
    fn tracked_links(&self) -> usize {
        self.links.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn spec(&self, id: &str) -> CameraResult<&SyntheticCameraSpec> {
        self.cameras
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CameraError::Backend(format!("Unknown camera id {}", id)))
    }
}

impl CameraProvider for SyntheticProvider {
    fn device_ids(&self) -> CameraResult<Vec<String>> {
        Ok(self.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn characteristics(&self, id: &str) -> CameraResult<DeviceCharacteristics> {
        let spec = self.spec(id)?;
        Ok(DeviceCharacteristics {
            facing: spec.facing,
            stream_configs: spec.stream_configs.clone(),
        })
    }

    fn open(
        &self,
        id: &str,
        config: &StreamConfig,
        on_event: DeviceEventCallback,
    ) -> CameraResult<Box<dyn CameraDevice>> {
        let spec = self.spec(id)?;
        let supported = spec
            .stream_configs
            .as_ref()
            .is_some_and(|configs| configs.contains(config));
        if !supported {
            return Err(CameraError::StreamConfigUnsupported {
                device: id.to_string(),
            });
        }

        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(open, Ordering::SeqCst);
        self.counters.total.fetch_add(1, Ordering::SeqCst);

        let link = Arc::new(DeviceLink {
            id: id.to_string(),
            reader: FrameReader::default(),
            on_event,
        });
        let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        links.retain(|link| link.strong_count() > 0);
        links.push(Arc::downgrade(&link));
        drop(links);

        info!(id, config = %config, "Synthetic camera opened");
        (link.on_event)(DeviceEvent::Opened);

        Ok(Box::new(SyntheticDevice {
            spec: spec.clone(),
            width: config.width,
            height: config.height,
            link,
            counters: Arc::clone(&self.counters),
            stop: Arc::new(AtomicBool::new(false)),
            producer: None,
            closed: false,
        }))
    }
}

/// Shared between a device handle, its producer thread and the provider
struct DeviceLink {
    id: String,
    reader: FrameReader,
    on_event: DeviceEventCallback,
}

impl DeviceLink {
    fn fail(&self, error: CameraError, event: DeviceEvent) {
        warn!(id = %self.id, ?event, "Synthetic camera failure injected");
        self.reader.fail(error);
        (self.on_event)(event);
    }
}

#[derive(Default)]
struct ReaderState {
    frames: VecDeque<RawFrame>,
    failure: Option<CameraError>,
}

/// Bounded queue of completed frames; the oldest is discarded when full
#[derive(Default)]
struct FrameReader {
    state: Mutex<ReaderState>,
    ready: Condvar,
}

impl FrameReader {
    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, frame: RawFrame) {
        let mut state = self.lock();
        state.frames.push_back(frame);
        while state.frames.len() > capture::MAX_PENDING_FRAMES {
            state.frames.pop_front();
        }
        drop(state);
        self.ready.notify_one();
    }

    fn fail(&self, error: CameraError) {
        self.lock().failure = Some(error);
        self.ready.notify_all();
    }

    fn take_latest(&self, timeout: Duration) -> CameraResult<Option<RawFrame>> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| {
                s.frames.is_empty() && s.failure.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(error) = state.failure.clone() {
            return Err(error);
        }
        let latest = state.frames.pop_back();
        state.frames.clear();
        Ok(latest)
    }
}

/// An opened synthetic device
pub struct SyntheticDevice {
    spec: SyntheticCameraSpec,
    width: u32,
    height: u32,
    link: Arc<DeviceLink>,
    counters: Arc<SessionCounters>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    closed: bool,
}

impl CameraDevice for SyntheticDevice {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn start_session(&mut self) -> CameraResult<()> {
        if self.closed {
            return Err(CameraError::Backend("Device already closed".into()));
        }
        if self.producer.is_some() {
            return Ok(());
        }

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let link = Arc::clone(&self.link);
        let spec = self.spec.clone();
        let (width, height) = (self.width, self.height);

        let handle = thread::Builder::new()
            .name(format!("synthetic-camera-{}", spec.id))
            .spawn(move || {
                let interval = spec.frame_interval();
                let started = Instant::now();
                let mut next = started;
                let mut index: u64 = 0;

                while !stop.load(Ordering::SeqCst) {
                    let planes = test_pattern(
                        width,
                        height,
                        index,
                        spec.chroma_pixel_stride,
                        spec.luma_row_padding,
                    );
                    link.reader.push(RawFrame {
                        width,
                        height,
                        planes,
                        timestamp: started.elapsed(),
                    });
                    index += 1;

                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                debug!(id = %spec.id, frames = index, "Synthetic producer exiting");
            })
            .map_err(|e| CameraError::Backend(format!("Failed to spawn producer: {}", e)))?;

        self.producer = Some(handle);
        debug!(id = %self.spec.id, "Synthetic capture session started");
        Ok(())
    }

    fn acquire_latest_frame(&mut self, timeout: Duration) -> CameraResult<Option<RawFrame>> {
        self.link.reader.take_latest(timeout)
    }

    fn close_session(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                warn!(id = %self.spec.id, "Synthetic producer panicked");
            }
        }
    }

    fn close(&mut self) {
        self.close_session();
        if !self.closed {
            self.closed = true;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            info!(id = %self.spec.id, "Synthetic camera closed");
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build the three planes of test-pattern frame `index`
///
/// A bright square slides across a dim horizontal gradient; chroma ramps
/// left-to-right (U) and top-to-bottom (V).
pub fn test_pattern(
    width: u32,
    height: u32,
    index: u64,
    chroma_pixel_stride: usize,
    luma_row_padding: usize,
) -> [Plane; 3] {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w / 2, h / 2);

    let luma_stride = w + luma_row_padding;
    let mut luma = vec![0u8; luma_stride * h];
    let size = (w.min(h) / 4).max(1);
    let travel = w.saturating_sub(size).max(1);
    let x0 = (index as usize * 4) % travel;
    let y0 = h.saturating_sub(size) / 2;
    for y in 0..h {
        let row = &mut luma[y * luma_stride..y * luma_stride + w];
        for (x, px) in row.iter_mut().enumerate() {
            let inside = (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y);
            *px = if inside { 235 } else { 16 + (x * 64 / w.max(1)) as u8 };
        }
    }

    let u_at = |c: usize| (c * 255 / cw.max(1)) as u8;
    let v_at = |r: usize| (r * 255 / ch.max(1)) as u8;

    let (u_plane, v_plane) = if chroma_pixel_stride <= 1 {
        let mut u = Vec::with_capacity(cw * ch);
        let mut v = Vec::with_capacity(cw * ch);
        for r in 0..ch {
            for c in 0..cw {
                u.push(u_at(c));
                v.push(v_at(r));
            }
        }
        (Plane::new(u, cw, 1), Plane::new(v, cw, 1))
    } else {
        // One interleaved buffer; U starts at byte 0, V at byte 1
        let stride = chroma_pixel_stride;
        let row_stride = cw * stride;
        let mut shared = vec![0u8; row_stride * ch];
        for r in 0..ch {
            for c in 0..cw {
                let i = r * row_stride + c * stride;
                shared[i] = u_at(c);
                shared[i + 1] = v_at(r);
            }
        }
        let len = shared.len().saturating_sub(1);
        let u = shared[..len].to_vec();
        let v = shared.get(1..).map(<[u8]>::to_vec).unwrap_or_default();
        (
            Plane::new(u, row_stride, stride),
            Plane::new(v, row_stride, stride),
        )
    };

    [Plane::new(luma, luma_stride, 1), u_plane, v_plane]
}

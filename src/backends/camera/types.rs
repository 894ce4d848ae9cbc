// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use std::sync::Arc;
use std::time::Duration;

/// Which way a sensor faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    /// Rear camera (preferred for preview)
    Back,
    /// Front / selfie camera
    Front,
    /// Externally attached camera
    External,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// Pixel layout of a camera stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Planar 4:2:0, three planes with independent row/pixel strides
    Yuv420,
}

/// One entry of a device's stream configuration map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamConfig {
    pub format: StreamFormat,
    pub width: u32,
    pub height: u32,
}

impl StreamConfig {
    /// Planar 4:2:0 stream at the given size
    pub fn yuv420(width: u32, height: u32) -> Self {
        Self {
            format: StreamFormat::Yuv420,
            width,
            height,
        }
    }
}

impl std::fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}x{}", self.format, self.width, self.height)
    }
}

/// Capabilities a provider reports for one device
#[derive(Debug, Clone, Default)]
pub struct DeviceCharacteristics {
    /// Facing direction, if the device declares one
    pub facing: Option<Facing>,
    /// Stream configuration map; `None` when the device exposes none
    pub stream_configs: Option<Vec<StreamConfig>>,
}

impl DeviceCharacteristics {
    /// Whether the configuration map contains `request`
    pub fn supports(&self, request: &StreamConfig) -> bool {
        self.stream_configs
            .as_ref()
            .is_some_and(|configs| configs.contains(request))
    }
}

/// Outcomes reported through a device's state callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Opened,
    Disconnected,
    Error(i32),
}

/// State callback handed to `CameraProvider::open`
pub type DeviceEventCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// One image plane of a raw frame
#[derive(Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte offset of sample (`col`, `row`), if it lies inside the buffer
    #[inline]
    pub fn sample_index(&self, col: usize, row: usize) -> Option<usize> {
        let index = row
            .checked_mul(self.row_stride)?
            .checked_add(col.checked_mul(self.pixel_stride)?)?;
        (index < self.data.len()).then_some(index)
    }
}

impl std::fmt::Debug for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

/// A planar 4:2:0 sensor frame as delivered by the camera
///
/// Owned by the pipeline for exactly one conversion call, then dropped.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Luma, chroma-a (U / Cb), chroma-b (V / Cr)
    pub planes: [Plane; 3],
    /// Capture clock timestamp
    pub timestamp: Duration,
}

impl RawFrame {
    pub fn luma(&self) -> &Plane {
        &self.planes[0]
    }

    /// Chroma component A (U / Cb)
    pub fn chroma_a(&self) -> &Plane {
        &self.planes[1]
    }

    /// Chroma component B (V / Cr)
    pub fn chroma_b(&self) -> &Plane {
        &self.planes[2]
    }

    /// Chroma plane dimensions for 4:2:0 subsampling
    pub fn chroma_size(&self) -> (usize, usize) {
        (self.width as usize / 2, self.height as usize / 2)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Camera stream negotiation
pub mod capture {
    use super::Duration;

    /// Fixed preview width requested from the camera
    pub const PREVIEW_WIDTH: u32 = 640;

    /// Fixed preview height requested from the camera
    pub const PREVIEW_HEIGHT: u32 = 480;

    /// Bounded wait for the exclusive device open/close lock
    pub const OPEN_LOCK_TIMEOUT: Duration = Duration::from_millis(2500);

    /// How long the capture thread waits for a frame before re-checking its stop signal
    pub const FRAME_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

    /// Frames the device may hold before the oldest is discarded
    pub const MAX_PENDING_FRAMES: usize = 2;
}

/// Edge detection defaults
pub mod detection {
    /// Default low hysteresis threshold
    pub const DEFAULT_THRESHOLD: u32 = 50;

    /// Default high/low threshold ratio
    pub const DEFAULT_RATIO: u32 = 3;

    /// Upper bound the host UI exposes for the threshold slider
    pub const MAX_THRESHOLD: u32 = 255;

    /// Upper bound the host UI exposes for the ratio slider
    pub const MAX_RATIO: u32 = 10;

    /// Edge pixel color (RGB), drawn over an opaque black background
    pub const EDGE_COLOR: [u8; 3] = [255, 0, 255];

    /// Background color (RGB) of the edge map
    pub const BACKGROUND_COLOR: [u8; 3] = [0, 0, 0];
}

/// Color conversion constants
pub mod color {
    /// Neutral chroma value (no color shift); fills chroma bytes no source sample reached
    pub const NEUTRAL_CHROMA: u8 = 128;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Weight of the previous estimate in the FPS moving average
    pub const FPS_SMOOTHING: f32 = 0.9;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Render tick interval when no vsync-paced surface drives the loop (~60 Hz)
    pub const RENDER_INTERVAL: Duration = Duration::from_millis(16);

    /// Interval between FPS log lines in the CLI
    pub const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(1);
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{capture, detection, timing};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Config file name inside the application config directory
const CONFIG_FILE: &str = "config.json";

/// Application directory name under the platform config dir
const APP_DIR: &str = "edgecam";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version
    pub version: u32,
    /// Requested preview width
    pub preview_width: u32,
    /// Requested preview height
    pub preview_height: u32,
    /// Start in edge-detection mode
    pub detection_enabled: bool,
    /// Low hysteresis threshold
    pub threshold: u32,
    /// High/low threshold ratio
    pub ratio: u32,
    /// Bounded wait for the device lock, in milliseconds
    pub open_timeout_ms: u64,
    /// Render tick interval for unpaced targets, in milliseconds
    pub render_interval_ms: u64,
    /// Edge color (RGB)
    pub edge_color: [u8; 3],
    /// tracing filter directive, overrides the default when RUST_LOG is unset
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            preview_width: capture::PREVIEW_WIDTH,
            preview_height: capture::PREVIEW_HEIGHT,
            detection_enabled: false,
            threshold: detection::DEFAULT_THRESHOLD,
            ratio: detection::DEFAULT_RATIO,
            open_timeout_ms: capture::OPEN_LOCK_TIMEOUT.as_millis() as u64,
            render_interval_ms: timing::RENDER_INTERVAL.as_millis() as u64,
            edge_color: detection::EDGE_COLOR,
            log_filter: None,
        }
    }
}

impl Config {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location
    ///
    /// A missing file yields defaults. An unreadable or malformed one is an
    /// error so the caller can report it once logging is up.
    pub fn load() -> AppResult<Self> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No config directory available".into()))?;
        Self::load_from(&path)
    }

    /// Load from `path`; see [`Config::load`]
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config = serde_json::from_str::<Config>(&contents)
            .map_err(|e| AppError::Config(format!("Malformed {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config.sanitized())
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No config directory available".into()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Bounded wait for the device lock
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Render tick interval
    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms.max(1))
    }

    /// Clamp values a hand-edited file could break
    fn sanitized(mut self) -> Self {
        // 4:2:0 subsampling needs even dimensions
        if self.preview_width < 2 || self.preview_height < 2 {
            self.preview_width = capture::PREVIEW_WIDTH;
            self.preview_height = capture::PREVIEW_HEIGHT;
        }
        self.preview_width &= !1;
        self.preview_height &= !1;
        self.threshold = self.threshold.min(detection::MAX_THRESHOLD);
        self.ratio = self.ratio.clamp(1, detection::MAX_RATIO);
        self
    }
}

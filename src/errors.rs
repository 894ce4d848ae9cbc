// SPDX-License-Identifier: MPL-2.0

//! Error types for the edge-detection preview pipeline

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for camera source operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Result type for frame conversion and processing
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Conversion or transform errors
    Process(ProcessError),
    /// GPU / renderer errors
    Render(RenderError),
    /// Configuration errors
    Config(String),
}

/// Camera source errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// No usable camera device. Terminal for the session.
    DeviceUnavailable,
    /// The exclusive device lock could not be taken in time. Retryable.
    OpenTimeout,
    /// The device exposes no stream configuration for the requested format
    StreamConfigUnsupported { device: String },
    /// Device went away while streaming
    Disconnected,
    /// Device reported an error code through its state callback
    DeviceError(i32),
    /// `start()` called while a session is active
    AlreadyRunning,
    /// Any other provider failure
    Backend(String),
}

/// Frame conversion and transform errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The vision transform could not be initialized or was released
    TransformUnavailable(String),
    /// The vision transform failed on this frame
    TransformFailure(String),
    /// Frame geometry or plane layout is not usable
    InvalidFrame(String),
    /// Both staging slots are busy; the frame is dropped
    NoFreeSlot,
}

/// Renderer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Shader module failed to compile
    ShaderCompileFailure(String),
    /// Render pipeline (program) failed to link
    LinkFailure(String),
    /// No GPU adapter found
    NoAdapter,
    /// Device creation failed
    DeviceRequest(String),
    /// Surface acquisition / configuration failed
    Surface(String),
    /// Frame data did not fit the texture, or a readback failed
    Upload(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Process(e) => write!(f, "Processing error: {}", e),
            AppError::Render(e) => write!(f, "Render error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceUnavailable => write!(f, "No usable camera device"),
            CameraError::OpenTimeout => write!(f, "Timed out waiting to lock camera opening"),
            CameraError::StreamConfigUnsupported { device } => {
                write!(f, "Camera {} has no compatible stream configuration", device)
            }
            CameraError::Disconnected => write!(f, "Camera disconnected"),
            CameraError::DeviceError(code) => write!(f, "Camera device error: {}", code),
            CameraError::AlreadyRunning => write!(f, "Camera is already running"),
            CameraError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TransformUnavailable(msg) => {
                write!(f, "Vision transform unavailable: {}", msg)
            }
            ProcessError::TransformFailure(msg) => write!(f, "Vision transform failed: {}", msg),
            ProcessError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            ProcessError::NoFreeSlot => write!(f, "No free staging slot"),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ShaderCompileFailure(msg) => write!(f, "Shader compile failed: {}", msg),
            RenderError::LinkFailure(msg) => write!(f, "Shader program link failed: {}", msg),
            RenderError::NoAdapter => write!(f, "No suitable GPU adapter"),
            RenderError::DeviceRequest(msg) => write!(f, "Failed to create GPU device: {}", msg),
            RenderError::Surface(msg) => write!(f, "Surface error: {}", msg),
            RenderError::Upload(msg) => write!(f, "Texture transfer failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for ProcessError {}
impl std::error::Error for RenderError {}

impl CameraError {
    /// Whether the host may retry `start()` after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, CameraError::OpenTimeout | CameraError::Disconnected)
    }
}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        AppError::Process(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Render(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CameraError::OpenTimeout.is_retryable());
        assert!(!CameraError::DeviceUnavailable.is_retryable());
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = RenderError::LinkFailure("bad".into()).into();
        assert!(matches!(err, AppError::Render(RenderError::LinkFailure(_))));
        assert_eq!(err.to_string(), "Render error: Shader program link failed: bad");
    }
}

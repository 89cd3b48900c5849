// THEORY:
// Nothing in the vision engine is allowed to take the host process down. Every
// failure degrades to either "no detection this cycle" or "pipeline idle", so the
// error types below are split along exactly those lines:
//
// - `CaptureError`: the frame source could not be acquired or stopped yielding
//   frames. The orchestrator returns to Idle and surfaces a user-facing message.
// - `FrameError`: a single cycle could not be processed (malformed buffer, zero
//   dimensions). The cycle is logged and skipped; the loop keeps going.
// - `PersistError`: the persistence collaborator refused a record. Logged only.
// - `ConfigError`: a configuration file or value is unusable.
//
// `VisionError` is the umbrella type for callers that do not care which layer failed.

use thiserror::Error;

/// Reasons a frame source could not be acquired or read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NoDevice,

    #[error("camera device is busy")]
    DeviceBusy,

    #[error("timed out after {0} ms waiting for the camera")]
    Timeout(u64),

    #[error("camera API not supported: {0}")]
    Unsupported(String),

    #[error("capture error: {0}")]
    Other(String),
}

impl CaptureError {
    /// The message shown to an operator when capture cannot start.
    pub fn user_message(&self) -> String {
        let detail = match self {
            CaptureError::PermissionDenied => "Please grant camera permissions.".to_string(),
            CaptureError::NoDevice => "No camera found.".to_string(),
            CaptureError::DeviceBusy => "Camera is already in use.".to_string(),
            CaptureError::Timeout(_) => "Timeout waiting for video.".to_string(),
            CaptureError::Unsupported(reason) => reason.clone(),
            CaptureError::Other(reason) if reason.is_empty() => {
                "Please check your camera.".to_string()
            }
            CaptureError::Other(reason) => reason.clone(),
        };
        format!("Failed to access camera. {detail}")
    }
}

/// A per-cycle processing fault. Never fatal to the loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("malformed frame buffer: expected {expected} bytes for {width}x{height} RGBA, got {actual}")]
    MalformedBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("downscale factor {0} must be in (0, 1]")]
    InvalidScale(f64),

    #[error("detection worker failed: {0}")]
    WorkerFailed(String),
}

/// The persistence collaborator rejected or failed to store a record.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A configuration file or value is unusable.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

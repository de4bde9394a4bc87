//! Error taxonomy for camera operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::camera::State;

/// Error type for camera operations.
///
/// Each variant names the V4L2 request (or step) that failed and carries the
/// OS error reported by the driver where one exists.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device path could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Path that was passed to `open`.
        path: PathBuf,
        /// OS error from `open(2)`.
        #[source]
        source: io::Error,
    },

    /// The device is not a streaming video capture device.
    #[error("device capability check failed: {reason}")]
    Capability {
        /// What was missing, or which query failed.
        reason: &'static str,
        /// OS error, when the capability query itself failed.
        #[source]
        source: Option<io::Error>,
    },

    /// The driver rejected a format or frame interval request.
    #[error("{request} failed: {source}")]
    Format {
        /// Failed request, e.g. `VIDIOC_S_FMT`.
        request: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Buffer request, query, mapping or queueing failed.
    #[error("{request} failed: {source}")]
    Buffer {
        /// Failed request, e.g. `VIDIOC_REQBUFS`.
        request: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Stream on/off failed.
    #[error("{request} failed: {source}")]
    Stream {
        /// Failed request, e.g. `VIDIOC_STREAMON`.
        request: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Reading or writing a control failed.
    #[error("{request} for control {id:#010x} failed: {source}")]
    Control {
        /// Failed request, e.g. `VIDIOC_S_CTRL`.
        request: &'static str,
        /// Control id.
        id: u32,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// The device descriptor could not be closed.
    #[error("failed to close device: {source}")]
    Close {
        /// OS error from the last `close(2)` attempt.
        #[source]
        source: io::Error,
    },

    /// A pixel format name is not exactly four bytes.
    #[error("pixel format tag {0:?} is not 4 bytes")]
    InvalidFourCC(String),

    /// Frame data does not satisfy the converter's preconditions.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The operation is not valid in the camera's current state.
    #[error("{operation} is not valid while {state:?}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the camera was in.
        state: State,
    },
}

impl CameraError {
    /// The underlying OS error, if this error carries one.
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::Open { source, .. }
            | Self::Format { source, .. }
            | Self::Buffer { source, .. }
            | Self::Stream { source, .. }
            | Self::Control { source, .. }
            | Self::Close { source } => Some(source),
            Self::Capability { source, .. } => source.as_ref(),
            Self::InvalidFourCC(_) | Self::InvalidFrame(_) | Self::InvalidState { .. } => None,
        }
    }

    /// Name of the request or step that failed, for diagnostics.
    pub const fn request(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Capability { .. } => "VIDIOC_QUERYCAP",
            Self::Format { request, .. }
            | Self::Buffer { request, .. }
            | Self::Stream { request, .. }
            | Self::Control { request, .. } => *request,
            Self::Close { .. } => "close",
            Self::InvalidFourCC(_) => "fourcc",
            Self::InvalidFrame(_) => "convert",
            Self::InvalidState { operation, .. } => *operation,
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

//! v4l2-camera: a V4L2 capture library.
//!
//! This library drives a V4L2 capture device through its whole lifecycle
//! (open, negotiate, stream, capture, close) over a small trait-based driver
//! seam, enabling both production use with real hardware and testing with
//! mock drivers. Captured YUYV frames can be converted to RGB, and the
//! device's formats and controls can be enumerated.

pub mod buffer;
pub mod camera;
pub mod controls;
pub mod convert;
pub mod device;
pub mod diagnostics;
pub mod enumerate;
pub mod error;
pub mod format;
mod sys;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use camera::{Camera, State};
pub use controls::{Control, ControlFlags, ControlType, MenuEntry, MenuItem};
pub use convert::{yuv_to_rgb, yuyv_to_rgb};
pub use device::{list_devices, wait_readable, DeviceNode, V4l2Camera, V4l2Driver};
pub use diagnostics::{DiagnosticsSink, LogEvent, LogSink, NullSink};
pub use error::{CameraError, Result};
pub use format::{format_id, format_name, FourCC, Format, FormatDescription, Interval};
pub use traits::{DeviceCapabilities, Frame, FrameMetadata, VideoDriver};

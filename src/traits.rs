//! Core traits and types for V4L2 camera abstraction.

use std::io;
use std::time::Duration;

use crate::controls::{ControlInfo, ControlType, MenuItem};
use crate::convert::yuv_to_rgb;
use crate::format::{FourCC, Format, FormatDescription, FrameInterval, FrameSize, Interval};

/// Attempts made for a driver request interrupted by a signal before giving up.
pub const MAX_INTERRUPTED_RETRIES: usize = 100;

/// Run a driver request, retrying while it fails with `EINTR`.
///
/// Bounded by [`MAX_INTERRUPTED_RETRIES`]; the last error is returned once
/// the bound is hit.
pub fn retry_interrupted<T, F>(mut request: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempts = 1;
    loop {
        match request() {
            Err(err)
                if err.kind() == io::ErrorKind::Interrupted
                    && attempts < MAX_INTERRUPTED_RETRIES =>
            {
                attempts += 1;
            }
            result => return result,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Driver version as reported by the kernel.
    pub version: u32,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// A crop rectangle in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left offset.
    pub left: i32,
    /// Top offset.
    pub top: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Placement of one driver buffer, as reported by `VIDIOC_QUERYBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Ring slot index.
    pub index: u32,
    /// Buffer length in bytes.
    pub length: u32,
    /// Offset to pass to `mmap`.
    pub offset: u32,
}

/// A buffer the driver has filled, as reported by `VIDIOC_DQBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Ring slot index.
    pub index: u32,
    /// Bytes of frame data written into the slot.
    pub bytes_used: u32,
    /// Driver frame counter.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// Low-level access to a V4L2 capture device, one method per driver request.
///
/// All methods report the raw OS error; interpretation (retry, error
/// classification, logging) is left to the caller.
pub trait VideoDriver {
    /// A mapped driver buffer. Dropping it releases the mapping.
    type Buffer: AsRef<[u8]>;

    /// `VIDIOC_QUERYCAP`.
    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities>;

    /// `VIDIOC_CROPCAP`: the default crop rectangle.
    fn default_crop(&mut self) -> io::Result<Rect>;

    /// `VIDIOC_S_CROP`.
    fn set_crop(&mut self, rect: Rect) -> io::Result<()>;

    /// `VIDIOC_G_FMT`: pixel format and resolution (interval left unspecified).
    fn format(&mut self) -> io::Result<Format>;

    /// `VIDIOC_S_FMT` with progressive field order.
    fn set_format(&mut self, fourcc: FourCC, width: u32, height: u32) -> io::Result<()>;

    /// `VIDIOC_G_PARM`: the current time per frame.
    fn interval(&mut self) -> io::Result<Interval>;

    /// `VIDIOC_S_PARM`.
    fn set_interval(&mut self, interval: Interval) -> io::Result<()>;

    /// `VIDIOC_REQBUFS` for memory-mapped buffers; returns the granted count.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// `VIDIOC_QUERYBUF`.
    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo>;

    /// Map a queried buffer into process memory.
    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<Self::Buffer>;

    /// `VIDIOC_QBUF`: hand a slot to the driver.
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// `VIDIOC_DQBUF`: take a filled slot back. Fails with
    /// [`io::ErrorKind::WouldBlock`] when no frame is ready.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    /// `VIDIOC_STREAMON`.
    fn stream_on(&mut self) -> io::Result<()>;

    /// `VIDIOC_STREAMOFF`; also returns every queued slot to the application.
    fn stream_off(&mut self) -> io::Result<()>;

    /// `VIDIOC_ENUM_FMT`; fails past the last index.
    fn enum_format(&mut self, index: u32) -> io::Result<FormatDescription>;

    /// `VIDIOC_ENUM_FRAMESIZES`; fails past the last index.
    fn enum_frame_size(&mut self, fourcc: FourCC, index: u32) -> io::Result<FrameSize>;

    /// `VIDIOC_ENUM_FRAMEINTERVALS`; fails past the last index.
    fn enum_frame_interval(
        &mut self,
        fourcc: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> io::Result<FrameInterval>;

    /// `VIDIOC_QUERYCTRL`. `id` may carry the next-control flag.
    fn query_control(&mut self, id: u32) -> io::Result<ControlInfo>;

    /// `VIDIOC_QUERYMENU`, decoded according to the control's type.
    fn query_menu(&mut self, id: u32, index: u32, kind: ControlType) -> io::Result<MenuItem>;

    /// `VIDIOC_G_CTRL`.
    fn control(&mut self, id: u32) -> io::Result<i32>;

    /// `VIDIOC_S_CTRL`.
    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()>;

    /// Close the device descriptor.
    fn close(&mut self) -> io::Result<()>;
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// An owned copy of a captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of `data`.
    pub fourcc: FourCC,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// RGB of the pixel at `(x, y)`, decoding `data` as YUYV.
    ///
    /// Both pixels of a pair share its chroma. `None` outside the frame or
    /// past the end of `data`.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let pair_x = x & !1;
        let offset = ((y as usize) * (self.width as usize) + pair_x as usize) * 2;

        let y_val = if x % 2 == 0 {
            *self.data.get(offset)?
        } else {
            *self.data.get(offset + 2)?
        };
        let u = *self.data.get(offset + 1)?;
        let v = *self.data.get(offset + 3)?;

        Some(yuv_to_rgb(y_val, u, v))
    }
}

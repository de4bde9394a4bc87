//! Mock driver implementation for testing without hardware.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::controls::{ControlInfo, ControlType, MenuItem};
use crate::enumerate::NEXT_CTRL_FLAG;
use crate::format::{FourCC, Format, FormatDescription, FrameInterval, FrameSize, Interval};
use crate::traits::{BufferInfo, DequeuedBuffer, DeviceCapabilities, Rect, VideoDriver};

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// One pixel format advertised by the mock driver.
#[derive(Debug, Clone)]
pub struct MockFormat {
    /// Pixel format.
    pub fourcc: FourCC,
    /// Frame sizes, reported in order.
    pub sizes: Vec<FrameSize>,
    /// Frame intervals reported for every size; `None` makes interval
    /// enumeration unsupported.
    pub intervals: Option<Vec<FrameInterval>>,
}

impl MockFormat {
    /// A format with discrete sizes and discrete intervals.
    #[must_use]
    pub fn discrete(fourcc: FourCC, sizes: &[(u32, u32)], fps: &[u32]) -> Self {
        Self {
            fourcc,
            sizes: sizes
                .iter()
                .map(|&(width, height)| FrameSize::Discrete { width, height })
                .collect(),
            intervals: Some(
                fps.iter()
                    .map(|&f| FrameInterval::Discrete(Interval::from_fps(f)))
                    .collect(),
            ),
        }
    }
}

/// A mapped mock buffer; tracks how many mappings are alive.
#[derive(Debug)]
pub struct MockBuffer {
    data: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl AsRef<[u8]> for MockBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Image written into every mapped slot.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Eight vertical 100% color bars.
    ColorBars,
    /// Luma ramp from 0 on the left edge towards 255 on the right.
    Gradient,
    /// One `(y, u, v)` everywhere.
    Solid(u8, u8, u8),
}

/// Mock driver for testing without hardware.
#[derive(Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct MockDriver {
    capabilities: DeviceCapabilities,
    crop_supported: bool,
    crop: Option<Rect>,
    format: Format,
    max_size: (u32, u32),
    interval: Interval,
    reject_format: bool,
    reject_interval: bool,
    formats: Vec<MockFormat>,
    controls: Vec<ControlInfo>,
    menus: HashMap<(u32, u32), MenuItem>,
    values: HashMap<u32, i32>,
    cursor_supported: bool,
    granted_buffers: Option<u32>,
    slot_padding: Vec<usize>,
    map_failure_at: Option<u32>,
    requested: u32,
    live: Rc<Cell<usize>>,
    queued: VecDeque<u32>,
    streaming: bool,
    exposed: usize,
    sequence: u32,
    pattern: TestPattern,
    bytes_used_override: Option<u32>,
    fail_stream_on: Option<i32>,
    fail_stream_off: Option<i32>,
    fail_dequeue: Option<i32>,
    fail_queue: Option<i32>,
    pending_interrupts: usize,
    close_interrupts: usize,
    closed: bool,
    calls: Vec<&'static str>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a new mock driver with default settings: a 640x480 YUYV
    /// streaming capture device with no controls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                version: 0,
                can_capture: true,
                can_stream: true,
            },
            crop_supported: true,
            crop: None,
            format: Format::new(640, 480, FourCC::YUYV),
            max_size: (1920, 1080),
            interval: Interval::from_fps(30),
            reject_format: false,
            reject_interval: false,
            formats: vec![MockFormat::discrete(FourCC::YUYV, &[(640, 480)], &[30])],
            controls: Vec::new(),
            menus: HashMap::new(),
            values: HashMap::new(),
            cursor_supported: true,
            granted_buffers: None,
            slot_padding: Vec::new(),
            map_failure_at: None,
            requested: 0,
            live: Rc::new(Cell::new(0)),
            queued: VecDeque::new(),
            streaming: false,
            exposed: 0,
            sequence: 0,
            pattern: TestPattern::ColorBars,
            bytes_used_override: None,
            fail_stream_on: None,
            fail_stream_off: None,
            fail_dequeue: None,
            fail_queue: None,
            pending_interrupts: 0,
            close_interrupts: 0,
            closed: false,
            calls: Vec::new(),
        }
    }

    /// Set the capabilities for this mock driver.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make `VIDIOC_CROPCAP` unsupported.
    #[must_use]
    pub const fn without_crop(mut self) -> Self {
        self.crop_supported = false;
        self
    }

    /// Set the current format.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Clamp requested sizes to this maximum.
    #[must_use]
    pub const fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = (width, height);
        self
    }

    /// Reject every `VIDIOC_S_FMT`.
    #[must_use]
    pub const fn rejecting_format(mut self) -> Self {
        self.reject_format = true;
        self
    }

    /// Reject every `VIDIOC_S_PARM`.
    #[must_use]
    pub const fn rejecting_interval(mut self) -> Self {
        self.reject_interval = true;
        self
    }

    /// Replace the advertised format list.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<MockFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Add a control with its current value and menu entries.
    #[must_use]
    pub fn with_control(mut self, info: ControlInfo, menu: &[(u32, MenuItem)]) -> Self {
        for (index, item) in menu {
            self.menus.insert((info.id, *index), item.clone());
        }
        self.values.insert(info.id, info.default_value);
        self.controls.push(info);
        self.controls.sort_by_key(|c| c.id);
        self
    }

    /// Reject the next-control cursor protocol.
    #[must_use]
    pub const fn without_control_cursor(mut self) -> Self {
        self.cursor_supported = false;
        self
    }

    /// Grant at most this many buffers.
    #[must_use]
    pub const fn with_granted_buffers(mut self, count: u32) -> Self {
        self.granted_buffers = Some(count);
        self
    }

    /// Extra bytes added to each slot's length, by index.
    #[must_use]
    pub fn with_slot_padding(mut self, padding: &[usize]) -> Self {
        self.slot_padding = padding.to_vec();
        self
    }

    /// Fail mapping the slot with this index.
    #[must_use]
    pub const fn with_map_failure_at(mut self, index: u32) -> Self {
        self.map_failure_at = Some(index);
        self
    }

    /// Set the pattern written into mapped slots.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Report this byte count for every dequeued buffer.
    #[must_use]
    pub const fn with_bytes_used_override(mut self, bytes: u32) -> Self {
        self.bytes_used_override = Some(bytes);
        self
    }

    /// Fail `VIDIOC_STREAMON` with this errno.
    #[must_use]
    pub const fn failing_stream_on(mut self, errno: i32) -> Self {
        self.fail_stream_on = Some(errno);
        self
    }

    /// Fail `VIDIOC_STREAMOFF` with this errno.
    #[must_use]
    pub const fn failing_stream_off(mut self, errno: i32) -> Self {
        self.fail_stream_off = Some(errno);
        self
    }

    /// Interrupt `close` this many times before it succeeds.
    #[must_use]
    pub const fn with_close_interrupts(mut self, count: usize) -> Self {
        self.close_interrupts = count;
        self
    }

    /// Fail the next `count` driver requests with `EINTR`.
    pub fn interrupt_next(&mut self, count: usize) {
        self.pending_interrupts = count;
    }

    /// Stop failing `VIDIOC_STREAMON`.
    pub fn allow_stream_on(&mut self) {
        self.fail_stream_on = None;
    }

    /// Make `count` more frames ready for dequeueing.
    pub fn expose_frames(&mut self, count: usize) {
        self.exposed += count;
    }

    /// Fail the next dequeue with this errno.
    pub fn fail_next_dequeue(&mut self, errno: i32) {
        self.fail_dequeue = Some(errno);
    }

    /// Fail the next `VIDIOC_QBUF` with this errno.
    pub fn fail_next_queue(&mut self, errno: i32) {
        self.fail_queue = Some(errno);
    }

    /// Let every slot map again.
    pub fn clear_map_failure(&mut self) {
        self.map_failure_at = None;
    }

    /// Number of buffer mappings currently alive.
    pub fn live_mappings(&self) -> usize {
        self.live.get()
    }

    /// Number of slots queued to the driver.
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    /// Current number of reserved buffers.
    pub const fn reserved_buffers(&self) -> u32 {
        self.requested
    }

    /// Whether the stream is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether `close` succeeded.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Crop rectangle applied by `VIDIOC_S_CROP`.
    pub const fn applied_crop(&self) -> Option<Rect> {
        self.crop
    }

    /// Requests made so far, in order.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    fn enter(&mut self, request: &'static str) -> io::Result<()> {
        self.calls.push(request);
        if self.pending_interrupts > 0 {
            self.pending_interrupts -= 1;
            return Err(os_error(libc::EINTR));
        }
        Ok(())
    }

    const fn frame_size(&self) -> usize {
        self.format.width as usize * self.format.height as usize * 2
    }

    fn find_format(&self, fourcc: FourCC) -> io::Result<&MockFormat> {
        self.formats
            .iter()
            .find(|f| f.fourcc == fourcc)
            .ok_or_else(|| os_error(libc::EINVAL))
    }
}

impl VideoDriver for MockDriver {
    type Buffer = MockBuffer;

    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        self.enter("VIDIOC_QUERYCAP")?;
        Ok(self.capabilities.clone())
    }

    fn default_crop(&mut self) -> io::Result<Rect> {
        self.enter("VIDIOC_CROPCAP")?;
        if !self.crop_supported {
            return Err(os_error(libc::ENOTTY));
        }
        Ok(Rect {
            left: 0,
            top: 0,
            width: self.max_size.0,
            height: self.max_size.1,
        })
    }

    fn set_crop(&mut self, rect: Rect) -> io::Result<()> {
        self.enter("VIDIOC_S_CROP")?;
        self.crop = Some(rect);
        Ok(())
    }

    fn format(&mut self) -> io::Result<Format> {
        self.enter("VIDIOC_G_FMT")?;
        Ok(self.format)
    }

    fn set_format(&mut self, fourcc: FourCC, width: u32, height: u32) -> io::Result<()> {
        self.enter("VIDIOC_S_FMT")?;
        if self.streaming || self.requested > 0 {
            return Err(os_error(libc::EBUSY));
        }
        if self.reject_format {
            return Err(os_error(libc::EINVAL));
        }
        self.format = Format::new(width.min(self.max_size.0), height.min(self.max_size.1), fourcc);
        Ok(())
    }

    fn interval(&mut self) -> io::Result<Interval> {
        self.enter("VIDIOC_G_PARM")?;
        Ok(self.interval)
    }

    fn set_interval(&mut self, interval: Interval) -> io::Result<()> {
        self.enter("VIDIOC_S_PARM")?;
        if self.reject_interval {
            return Err(os_error(libc::EINVAL));
        }
        self.interval = interval;
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.enter("VIDIOC_REQBUFS")?;
        if self.streaming || self.live.get() > 0 {
            return Err(os_error(libc::EBUSY));
        }
        self.queued.clear();
        self.requested = self.granted_buffers.map_or(count, |max| max.min(count));
        Ok(self.requested)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        self.enter("VIDIOC_QUERYBUF")?;
        if index >= self.requested {
            return Err(os_error(libc::EINVAL));
        }
        let padding = self.slot_padding.get(index as usize).copied().unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        Ok(BufferInfo {
            index,
            length: (self.frame_size() + padding) as u32,
            offset: index * 0x1000,
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MockBuffer> {
        self.calls.push("mmap");
        if self.map_failure_at == Some(info.index) {
            return Err(os_error(libc::ENOMEM));
        }
        let mut data = generate_test_frame(self.format.width, self.format.height, self.pattern);
        data.resize(info.length as usize, 0);
        self.live.set(self.live.get() + 1);
        Ok(MockBuffer {
            data,
            live: Rc::clone(&self.live),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        self.enter("VIDIOC_QBUF")?;
        if let Some(errno) = self.fail_queue.take() {
            return Err(os_error(errno));
        }
        if index >= self.requested || self.queued.contains(&index) {
            return Err(os_error(libc::EINVAL));
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        self.enter("VIDIOC_DQBUF")?;
        if let Some(errno) = self.fail_dequeue.take() {
            return Err(os_error(errno));
        }
        if !self.streaming {
            return Err(os_error(libc::EINVAL));
        }
        if self.exposed == 0 {
            return Err(os_error(libc::EAGAIN));
        }
        let index = self.queued.pop_front().ok_or_else(|| os_error(libc::EAGAIN))?;
        self.exposed -= 1;
        let sequence = self.sequence;
        self.sequence += 1;
        #[allow(clippy::cast_possible_truncation)]
        let bytes_used = self
            .bytes_used_override
            .unwrap_or(self.frame_size() as u32);
        Ok(DequeuedBuffer {
            index,
            bytes_used,
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.enter("VIDIOC_STREAMON")?;
        if let Some(errno) = self.fail_stream_on {
            return Err(os_error(errno));
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.enter("VIDIOC_STREAMOFF")?;
        if let Some(errno) = self.fail_stream_off {
            return Err(os_error(errno));
        }
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }

    fn enum_format(&mut self, index: u32) -> io::Result<FormatDescription> {
        self.enter("VIDIOC_ENUM_FMT")?;
        let format = self
            .formats
            .get(index as usize)
            .ok_or_else(|| os_error(libc::EINVAL))?;
        Ok(FormatDescription {
            index,
            fourcc: format.fourcc,
            description: format!("Mock {}", format.fourcc),
            compressed: format.fourcc == FourCC::MJPG,
            emulated: false,
        })
    }

    fn enum_frame_size(&mut self, fourcc: FourCC, index: u32) -> io::Result<FrameSize> {
        self.enter("VIDIOC_ENUM_FRAMESIZES")?;
        self.find_format(fourcc)?
            .sizes
            .get(index as usize)
            .copied()
            .ok_or_else(|| os_error(libc::EINVAL))
    }

    fn enum_frame_interval(
        &mut self,
        fourcc: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> io::Result<FrameInterval> {
        self.enter("VIDIOC_ENUM_FRAMEINTERVALS")?;
        let format = self.find_format(fourcc)?;
        let size_supported = format.sizes.iter().any(|size| match *size {
            FrameSize::Discrete { width: w, height: h } => w == width && h == height,
            FrameSize::Stepwise {
                min_width,
                max_width,
                min_height,
                max_height,
                ..
            } => (min_width..=max_width).contains(&width) && (min_height..=max_height).contains(&height),
        });
        if !size_supported {
            return Err(os_error(libc::EINVAL));
        }
        format
            .intervals
            .as_ref()
            .ok_or_else(|| os_error(libc::ENOTTY))?
            .get(index as usize)
            .copied()
            .ok_or_else(|| os_error(libc::EINVAL))
    }

    fn query_control(&mut self, id: u32) -> io::Result<ControlInfo> {
        self.enter("VIDIOC_QUERYCTRL")?;
        let found = if id & NEXT_CTRL_FLAG != 0 {
            if !self.cursor_supported {
                return Err(os_error(libc::EINVAL));
            }
            let after = id & !NEXT_CTRL_FLAG;
            self.controls.iter().find(|c| c.id > after)
        } else {
            self.controls.iter().find(|c| c.id == id)
        };
        found.cloned().ok_or_else(|| os_error(libc::EINVAL))
    }

    fn query_menu(&mut self, id: u32, index: u32, _kind: ControlType) -> io::Result<MenuItem> {
        self.enter("VIDIOC_QUERYMENU")?;
        self.menus
            .get(&(id, index))
            .cloned()
            .ok_or_else(|| os_error(libc::EINVAL))
    }

    fn control(&mut self, id: u32) -> io::Result<i32> {
        self.enter("VIDIOC_G_CTRL")?;
        self.values
            .get(&id)
            .copied()
            .ok_or_else(|| os_error(libc::EINVAL))
    }

    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        self.enter("VIDIOC_S_CTRL")?;
        let info = self
            .controls
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| os_error(libc::EINVAL))?;
        if value < info.minimum || value > info.maximum {
            return Err(os_error(libc::ERANGE));
        }
        self.values.insert(id, value);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.calls.push("close");
        if self.close_interrupts > 0 {
            self.close_interrupts -= 1;
            return Err(os_error(libc::EINTR));
        }
        self.closed = true;
        Ok(())
    }
}

/// YUV of the eight 100% color bars, left to right.
const BARS_YUV: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

impl TestPattern {
    /// YUV shared by the pixel pair starting at column `x`.
    #[allow(clippy::cast_possible_truncation)]
    fn pair_at(self, x: u32, width: u32) -> (u8, u8, u8) {
        match self {
            Self::ColorBars => {
                let bar = (x / (width / 8).max(1)).min(7) as usize;
                BARS_YUV.get(bar).copied().unwrap_or((16, 128, 128))
            }
            Self::Gradient => (((x * 255) / width.max(1)) as u8, 128, 128),
            Self::Solid(y, u, v) => (y, u, v),
        }
    }
}

/// A `width x height` YUYV frame showing `pattern`; every row is identical.
fn generate_test_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let row: Vec<u8> = (0..width)
        .step_by(2)
        .flat_map(|x| {
            let (y, u, v) = pattern.pair_at(x, width);
            [y, u, y, v]
        })
        .collect();
    row.repeat(height as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_creation() {
        let mut driver = MockDriver::new();
        let caps = driver.query_capabilities().expect("querycap should succeed");
        assert_eq!(caps.driver, "mock");
        assert!(caps.can_capture);
        assert!(caps.can_stream);
    }

    #[test]
    fn test_mock_driver_clamps_format() {
        let mut driver = MockDriver::new().with_max_size(800, 600);
        driver
            .set_format(FourCC::YUYV, 1280, 720)
            .expect("set_format should succeed");
        let format = driver.format().expect("format should succeed");
        assert_eq!((format.width, format.height), (800, 600));
    }

    #[test]
    fn test_mock_interrupts_then_succeeds() {
        let mut driver = MockDriver::new();
        driver.interrupt_next(2);
        assert!(driver.format().is_err());
        assert!(driver.format().is_err());
        assert!(driver.format().is_ok());
    }

    #[test]
    fn test_color_bars_frame() {
        let data = generate_test_frame(640, 480, TestPattern::ColorBars);
        assert_eq!(data.len(), 640 * 480 * 2);
        // white on the left edge, black on the right
        assert_eq!(&data[..4], &[235, 128, 235, 128]);
        assert_eq!(&data[1276..1280], &[16, 128, 16, 128]);
    }

    #[test]
    fn test_gradient_frame() {
        let data = generate_test_frame(640, 480, TestPattern::Gradient);
        let last_row = &data[479 * 1280..];
        assert_eq!(last_row[0], 0);
        assert!(last_row[1276] > 200);
        let luma: Vec<u8> = last_row.iter().step_by(2).copied().collect();
        assert!(luma.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_solid_frame() {
        let data = generate_test_frame(64, 64, TestPattern::Solid(128, 64, 192));
        assert_eq!(data.len(), 64 * 64 * 2);
        assert!(data.chunks_exact(4).all(|pair| pair == [128, 64, 128, 192]));
    }
}

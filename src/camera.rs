//! Device lifecycle state machine.
//!
//! A [`Camera`] moves through `Opened → Initialized → Configured → Streaming`.
//! `stop` returns it to `Configured` and `close` ends it from any state,
//! stopping a running stream first. Every driver request goes through the
//! bounded interrupted-syscall retry, and every failure is reported to the
//! diagnostics sink before it is returned.

use std::io;

use crate::buffer::{BufferRing, DEFAULT_BUFFER_COUNT};
use crate::controls::Control;
use crate::convert::yuyv_to_rgb;
use crate::diagnostics::{DiagnosticsSink, LogEvent, LogSink};
use crate::enumerate;
use crate::error::{CameraError, Result};
use crate::format::{FourCC, Format, FormatDescription, Interval};
use crate::traits::{retry_interrupted, DeviceCapabilities, Frame, FrameMetadata, VideoDriver};

/// Attempts made to close the descriptor while `close` is interrupted.
pub const CLOSE_RETRIES: usize = 10;

/// Pixel format applied when a configuration leaves it unspecified.
pub const DEFAULT_FOURCC: FourCC = FourCC::YUYV;

/// Lifecycle state of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Descriptor released.
    Closed,
    /// Descriptor open, capabilities not yet checked.
    Opened,
    /// Capabilities verified and default crop attempted.
    Initialized,
    /// Format negotiated and buffers mapped.
    Configured,
    /// Buffers queued and stream on.
    Streaming,
}

/// A capture device and its buffer ring.
///
/// Generic over the [`VideoDriver`] so the same state machine drives real
/// hardware ([`V4l2Camera`](crate::V4l2Camera)) and test doubles.
pub struct Camera<D: VideoDriver> {
    ring: BufferRing<D::Buffer>,
    driver: D,
    state: State,
    settings: Format,
    capabilities: Option<DeviceCapabilities>,
    buffer_count: u32,
    sink: Box<dyn DiagnosticsSink>,
}

impl<D: VideoDriver> Camera<D> {
    /// Wrap an open driver. Diagnostics go to [`LogSink`] until replaced.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self {
            ring: BufferRing::new(),
            driver,
            state: State::Opened,
            settings: Format::default(),
            capabilities: None,
            buffer_count: DEFAULT_BUFFER_COUNT,
            sink: Box::new(LogSink),
        }
    }

    /// Replace the diagnostics sink.
    #[must_use]
    pub fn with_sink<S: DiagnosticsSink + 'static>(mut self, sink: S) -> Self {
        self.set_sink(sink);
        self
    }

    /// Replace the diagnostics sink.
    pub fn set_sink<S: DiagnosticsSink + 'static>(&mut self, sink: S) {
        self.sink = Box::new(sink);
    }

    /// Number of buffers requested by the next `configure`. At least one.
    pub fn set_buffer_count(&mut self, count: u32) {
        self.buffer_count = count.max(1);
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> State {
        self.state
    }

    /// Capabilities recorded by [`initialize`](Self::initialize).
    pub const fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.capabilities.as_ref()
    }

    /// Last negotiated format; zeroed before the first configure.
    pub const fn format(&self) -> Format {
        self.settings
    }

    /// Negotiated frame width in pixels.
    pub const fn width(&self) -> u32 {
        self.settings.width
    }

    /// Negotiated frame height in pixels.
    pub const fn height(&self) -> u32 {
        self.settings.height
    }

    /// Number of mapped ring slots.
    pub fn buffer_count(&self) -> usize {
        self.ring.len()
    }

    /// The underlying driver.
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// The underlying driver, mutably. Requests made through it bypass the
    /// state machine.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn info(&self, message: &str) {
        self.sink.log(&LogEvent::Info(message));
    }

    fn failure(&self, message: &str) {
        self.sink.log(&LogEvent::Failure(message));
    }

    fn report(&self, err: CameraError) -> CameraError {
        match err.os_error() {
            Some(source) => self.sink.log(&LogEvent::Error {
                context: err.request(),
                error: source,
            }),
            None => self.failure(&err.to_string()),
        }
        err
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state == State::Closed {
            return Err(self.report(CameraError::InvalidState {
                operation,
                state: self.state,
            }));
        }
        Ok(())
    }

    /// Issue one driver request with retry, mapping and reporting failure.
    fn request<T, F, E>(&mut self, mut call: F, wrap: E) -> Result<T>
    where
        F: FnMut(&mut D) -> io::Result<T>,
        E: FnOnce(io::Error) -> CameraError,
    {
        let driver = &mut self.driver;
        retry_interrupted(|| call(&mut *driver)).map_err(|source| self.report(wrap(source)))
    }

    /// Verify the device captures video with streaming I/O and apply its
    /// default crop rectangle. Cropping failures are logged, not returned.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_open("initialize")?;
        if self.state >= State::Initialized {
            return Ok(());
        }

        let caps = self.request(
            D::query_capabilities,
            |source| CameraError::Capability {
                reason: "VIDIOC_QUERYCAP failed",
                source: Some(source),
            },
        )?;
        if !caps.can_capture {
            return Err(self.report(CameraError::Capability {
                reason: "not a video capture device",
                source: None,
            }));
        }
        if !caps.can_stream {
            return Err(self.report(CameraError::Capability {
                reason: "streaming i/o not supported",
                source: None,
            }));
        }

        let driver = &mut self.driver;
        let cropped = retry_interrupted(|| driver.default_crop())
            .and_then(|rect| retry_interrupted(|| driver.set_crop(rect)));
        if let Err(err) = cropped {
            self.failure(&format!("cropping not applied: {err}"));
        }

        self.info(&format!("initialized {} ({})", caps.card, caps.driver));
        self.capabilities = Some(caps);
        self.state = State::Initialized;
        Ok(())
    }

    /// Unmap the ring and drop the driver's buffer reservation.
    fn release_buffers(&mut self) -> Result<()> {
        if !self.ring.is_prepared() {
            return Ok(());
        }
        self.ring.teardown();
        self.request(
            |driver| driver.request_buffers(0),
            |source| CameraError::Buffer {
                request: "VIDIOC_REQBUFS",
                source,
            },
        )
        .map(drop)
    }

    /// Negotiate `format` and map a fresh buffer ring for it.
    ///
    /// A zero width or height keeps the current resolution, an unspecified
    /// FourCC means [`DEFAULT_FOURCC`], and an unspecified interval keeps
    /// the current frame rate. The driver may adjust what it is given; the
    /// negotiated values are available from [`format`](Self::format).
    pub fn configure(&mut self, format: Format) -> Result<()> {
        self.ensure_open("configure")?;
        if self.state == State::Streaming {
            self.stop()?;
        } else {
            self.release_buffers()?;
        }
        self.state = self.state.min(State::Initialized);
        self.initialize()?;

        if format.width > 0 && format.height > 0 {
            let fourcc = if format.fourcc.is_unspecified() {
                DEFAULT_FOURCC
            } else {
                format.fourcc
            };
            self.request(
                |driver| driver.set_format(fourcc, format.width, format.height),
                |source| CameraError::Format {
                    request: "VIDIOC_S_FMT",
                    source,
                },
            )?;
        }
        if !format.interval.is_unspecified() {
            self.request(
                |driver| driver.set_interval(format.interval),
                |source| CameraError::Format {
                    request: "VIDIOC_S_PARM",
                    source,
                },
            )?;
        }

        let negotiated = self.request(D::format, |source| CameraError::Format {
            request: "VIDIOC_G_FMT",
            source,
        })?;
        let interval = if format.interval.is_unspecified() {
            self.settings.interval
        } else {
            format.interval
        };
        self.settings = negotiated.with_interval(interval);

        let count = self.buffer_count;
        let prepared = self.ring.prepare(&mut self.driver, count);
        prepared.map_err(|err| self.report(err))?;

        self.state = State::Configured;
        self.info(&format!(
            "configured {} with {} buffers",
            self.settings,
            self.ring.len()
        ));
        Ok(())
    }

    /// Read the current pixel format, resolution and frame interval.
    pub fn get_format(&mut self) -> Result<Format> {
        self.ensure_open("get_format")?;
        let format = self.request(D::format, |source| CameraError::Format {
            request: "VIDIOC_G_FMT",
            source,
        })?;
        let interval: Interval = self.request(D::interval, |source| {
            CameraError::Format {
                request: "VIDIOC_G_PARM",
                source,
            }
        })?;
        Ok(format.with_interval(interval))
    }

    /// Apply `format` as [`configure`](Self::configure) does and return what
    /// the driver actually accepted.
    pub fn set_format(&mut self, format: Format) -> Result<Format> {
        self.configure(format)?;
        self.get_format()
    }

    /// Queue every ring slot and turn the stream on.
    ///
    /// Configures with the last loaded settings first if no ring is mapped.
    /// On failure the camera stays `Configured` and `start` may be retried.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_open("start")?;
        if self.state == State::Streaming {
            return Ok(());
        }
        if !self.ring.is_prepared() {
            self.configure(self.settings)?;
        }

        let started = self.ring.queue_all(&mut self.driver).and_then(|()| {
            let driver = &mut self.driver;
            retry_interrupted(|| driver.stream_on()).map_err(|source| CameraError::Stream {
                request: "VIDIOC_STREAMON",
                source,
            })
        });
        if let Err(err) = started {
            let driver = &mut self.driver;
            if let Err(off) = retry_interrupted(|| driver.stream_off()) {
                log::debug!("stream-off after failed start: {off}");
            }
            self.ring.reclaim_all();
            self.state = State::Configured;
            return Err(self.report(err));
        }

        self.state = State::Streaming;
        self.info("streaming started");
        Ok(())
    }

    /// Turn the stream off and release every mapped buffer.
    ///
    /// Buffers are released even when stream-off fails; the first failure
    /// is returned.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open("stop")?;

        let mut result = Ok(());
        if self.state == State::Streaming {
            result = self.request(D::stream_off, |source| CameraError::Stream {
                request: "VIDIOC_STREAMOFF",
                source,
            });
            self.ring.reclaim_all();
        }
        let released = self.release_buffers();
        if self.state > State::Configured {
            self.state = State::Configured;
        }

        if result.is_ok() {
            result = released;
        }
        if result.is_ok() {
            self.info("streaming stopped");
        }
        result
    }

    /// Capture one frame into the head buffer.
    ///
    /// Returns `Ok(false)` if no frame is ready yet; wait for the device to
    /// become readable and call again. On `Ok(true)` the frame is available
    /// from [`frame`](Self::frame) until the next capture.
    pub fn capture(&mut self) -> Result<bool> {
        if self.state != State::Streaming {
            return Err(self.report(CameraError::InvalidState {
                operation: "capture",
                state: self.state,
            }));
        }
        let captured = self.ring.capture_into_head(&mut self.driver);
        let captured = captured.map_err(|err| self.report(err))?;
        if let Some(err) = self.ring.take_requeue_failure() {
            // The frame is good; the slot is queued again on the next capture.
            self.report(err);
        }
        if captured {
            log::trace!(
                "captured frame {} ({} bytes)",
                self.ring.metadata().sequence,
                self.ring.metadata().bytes_used
            );
        }
        Ok(captured)
    }

    /// The most recently captured frame; empty before the first capture.
    pub fn frame(&self) -> &[u8] {
        self.ring.head()
    }

    /// Metadata of the most recently captured frame.
    pub const fn frame_metadata(&self) -> FrameMetadata {
        self.ring.metadata()
    }

    /// An owned copy of the most recently captured frame.
    pub fn snapshot(&self) -> Frame {
        Frame {
            data: self.ring.head().to_vec(),
            width: self.settings.width,
            height: self.settings.height,
            fourcc: self.settings.fourcc,
            metadata: self.ring.metadata(),
        }
    }

    /// The most recently captured frame as packed RGB.
    ///
    /// Only YUYV frames can be converted; compressed formats are passed
    /// through untouched by [`frame`](Self::frame).
    pub fn frame_rgb(&self) -> Result<Vec<u8>> {
        if self.settings.fourcc != FourCC::YUYV {
            return Err(CameraError::InvalidFrame(format!(
                "cannot convert {} to RGB",
                self.settings.fourcc
            )));
        }
        yuyv_to_rgb(self.ring.head(), self.settings.width, self.settings.height)
    }

    /// Read a control value.
    pub fn control(&mut self, id: u32) -> Result<i32> {
        self.ensure_open("control")?;
        self.request(
            |driver| driver.control(id),
            |source| CameraError::Control {
                request: "VIDIOC_G_CTRL",
                id,
                source,
            },
        )
    }

    /// Write a control value.
    pub fn set_control(&mut self, id: u32, value: i32) -> Result<()> {
        self.ensure_open("set_control")?;
        self.request(
            |driver| driver.set_control(id, value),
            |source| CameraError::Control {
                request: "VIDIOC_S_CTRL",
                id,
                source,
            },
        )
    }

    /// Every supported format, size and frame interval combination.
    pub fn list_formats(&mut self) -> Vec<Format> {
        enumerate::list_formats(&mut self.driver)
    }

    /// The pixel formats the device offers.
    pub fn list_pixel_formats(&mut self) -> Vec<FormatDescription> {
        enumerate::list_pixel_formats(&mut self.driver)
    }

    /// The device's controls.
    pub fn list_controls(&mut self) -> Vec<Control> {
        enumerate::list_controls(&mut self.driver)
    }

    /// Stop streaming if needed and close the device.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        if self.state == State::Streaming || self.ring.is_prepared() {
            // Already reported through the sink; closing goes ahead regardless.
            let _ = self.stop();
        }

        let mut attempts = 0;
        let closed = loop {
            attempts += 1;
            match self.driver.close() {
                Err(err) if err.kind() == io::ErrorKind::Interrupted && attempts < CLOSE_RETRIES => {}
                result => break result,
            }
        };
        self.state = State::Closed;
        closed.map_err(|source| self.report(CameraError::Close { source }))?;
        self.info("closed");
        Ok(())
    }
}

impl<D: VideoDriver> Drop for Camera<D> {
    fn drop(&mut self) {
        if self.state == State::Streaming {
            let driver = &mut self.driver;
            if let Err(err) = retry_interrupted(|| driver.stream_off()) {
                log::warn!("stream-off on drop failed: {err}");
            }
        }
    }
}

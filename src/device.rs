//! V4L2 driver implementation over raw ioctls and `mmap`.

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::Duration;

use crate::camera::Camera;
use crate::controls::{ControlInfo, ControlType, MenuItem};
use crate::error::{CameraError, Result};
use crate::format::{FourCC, Format, FormatDescription, FrameInterval, FrameSize, Interval};
use crate::sys;
use crate::traits::{
    retry_interrupted, BufferInfo, DequeuedBuffer, DeviceCapabilities, Rect, VideoDriver,
};

/// A camera backed by a real V4L2 device node.
pub type V4l2Camera = Camera<V4l2Driver>;

impl Camera<V4l2Driver> {
    /// Open a device node (e.g. `/dev/video0`) for non-blocking capture.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let driver = V4l2Driver::open(path).map_err(|source| {
            log::error!("CAMERA ERROR [open] {}: {source}", path.display());
            CameraError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        log::info!("CAMERA INFO [opened {}]", path.display());
        Ok(Self::new(driver))
    }

    /// Capture one frame, waiting up to `timeout` for the device to become
    /// readable whenever no frame is ready.
    ///
    /// Returns `Ok(false)` if the wait timed out.
    pub fn wait_and_capture(&mut self, timeout: Duration) -> Result<bool> {
        loop {
            if self.capture()? {
                return Ok(true);
            }
            let ready = wait_readable(self.driver().as_raw_fd(), timeout).map_err(|source| {
                CameraError::Stream {
                    request: "poll",
                    source,
                }
            })?;
            if !ready {
                log::debug!("no frame within {timeout:?}");
                return Ok(false);
            }
        }
    }
}

/// A video device node found on the system.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    /// Node index, e.g. 0 for `/dev/video0`.
    pub index: usize,
    /// Path to the node.
    pub path: PathBuf,
    /// Name reported by sysfs, if any.
    pub name: Option<String>,
}

/// List `/dev/video*` nodes.
pub fn list_devices() -> Vec<DeviceNode> {
    v4l::context::enum_devices()
        .iter()
        .map(|node| DeviceNode {
            index: node.index(),
            path: node.path().to_path_buf(),
            name: node.name(),
        })
        .collect()
}

/// Wait until `fd` is readable (a frame is ready), for at most `timeout`.
///
/// Returns `Ok(false)` on timeout. Interrupted waits are restarted.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    let ready = retry_interrupted(|| {
        // SAFETY: `pollfd` is a valid, exclusively borrowed array of one entry.
        match unsafe { libc::poll(&mut pollfd, 1, millis) } {
            n if n < 0 => Err(io::Error::last_os_error()),
            n => Ok(n),
        }
    })?;
    Ok(ready > 0 && pollfd.revents & libc::POLLIN != 0)
}

/// A driver buffer mapped into process memory. Unmapped on drop.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl AsRef<[u8]> for MmapRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: `ptr` maps `len` readable bytes for as long as `self` lives.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: the region was returned by a successful `mmap` of `len` bytes
        // and is unmapped exactly once.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            log::warn!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

/// Low-level access to a V4L2 device node.
#[derive(Debug)]
pub struct V4l2Driver {
    fd: RawFd,
    closed: bool,
}

impl V4l2Driver {
    /// Open a device node read/write and non-blocking.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(Self {
            fd: file.into_raw_fd(),
            closed: false,
        })
    }
}

fn mmap_buffer(index: u32) -> sys::v4l2_buffer {
    let mut buf: sys::v4l2_buffer = sys::zeroed();
    buf.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
    buf.memory = sys::MEMORY_MMAP;
    buf.index = index;
    buf
}

impl AsRawFd for V4l2Driver {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for V4l2Driver {
    fn drop(&mut self) {
        if !self.closed {
            // SAFETY: `fd` is owned by this driver and still open.
            unsafe { libc::close(self.fd) };
        }
    }
}

const fn to_rect(rect: sys::v4l2_rect) -> Rect {
    Rect {
        left: rect.left,
        top: rect.top,
        width: rect.width,
        height: rect.height,
    }
}

const fn to_interval(fract: sys::v4l2_fract) -> Interval {
    Interval::new(fract.numerator, fract.denominator)
}

impl VideoDriver for V4l2Driver {
    type Buffer = MmapRegion;

    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        let mut caps: sys::v4l2_capability = sys::zeroed();
        // SAFETY: `caps` is a valid `v4l2_capability` for the kernel to fill.
        unsafe { sys::vidioc_querycap(self.fd, &mut caps) }?;

        let bits = if caps.capabilities & sys::CAP_DEVICE_CAPS != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        };
        let flags = v4l::capability::Flags::from_bits_truncate(bits);
        Ok(DeviceCapabilities {
            driver: sys::c_string(&caps.driver),
            card: sys::c_string(&caps.card),
            bus_info: sys::c_string(&caps.bus_info),
            version: caps.version,
            can_capture: flags.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: flags.contains(v4l::capability::Flags::STREAMING),
        })
    }

    fn default_crop(&mut self) -> io::Result<Rect> {
        let mut cropcap: sys::v4l2_cropcap = sys::zeroed();
        cropcap.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        // SAFETY: `cropcap` is a valid `v4l2_cropcap`.
        unsafe { sys::vidioc_cropcap(self.fd, &mut cropcap) }?;
        Ok(to_rect(cropcap.defrect))
    }

    fn set_crop(&mut self, rect: Rect) -> io::Result<()> {
        let mut crop: sys::v4l2_crop = sys::zeroed();
        crop.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        crop.c.left = rect.left;
        crop.c.top = rect.top;
        crop.c.width = rect.width;
        crop.c.height = rect.height;
        // SAFETY: `crop` is a valid `v4l2_crop` the kernel only reads.
        unsafe { sys::vidioc_s_crop(self.fd, &crop) }?;
        Ok(())
    }

    fn format(&mut self) -> io::Result<Format> {
        let mut fmt: sys::v4l2_format = sys::zeroed();
        fmt.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        // SAFETY: `fmt` is a valid `v4l2_format`.
        unsafe { sys::vidioc_g_fmt(self.fd, &mut fmt) }?;
        // SAFETY: the kernel fills the `pix` member for capture buffers.
        let pix = unsafe { fmt.fmt.pix };
        Ok(Format::new(
            pix.width,
            pix.height,
            FourCC::from_u32(pix.pixelformat),
        ))
    }

    fn set_format(&mut self, fourcc: FourCC, width: u32, height: u32) -> io::Result<()> {
        let mut pix: sys::v4l2_pix_format = sys::zeroed();
        pix.width = width;
        pix.height = height;
        pix.pixelformat = fourcc.to_u32();
        pix.field = sys::FIELD_NONE;

        let mut fmt: sys::v4l2_format = sys::zeroed();
        fmt.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        fmt.fmt.pix = pix;
        // SAFETY: `fmt` is a valid `v4l2_format`.
        unsafe { sys::vidioc_s_fmt(self.fd, &mut fmt) }?;
        Ok(())
    }

    fn interval(&mut self) -> io::Result<Interval> {
        let mut parm: sys::v4l2_streamparm = sys::zeroed();
        parm.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        // SAFETY: `parm` is a valid `v4l2_streamparm`.
        unsafe { sys::vidioc_g_parm(self.fd, &mut parm) }?;
        // SAFETY: the kernel fills the `capture` member for capture buffers.
        let capture = unsafe { parm.parm.capture };
        Ok(to_interval(capture.timeperframe))
    }

    fn set_interval(&mut self, interval: Interval) -> io::Result<()> {
        let mut capture: sys::v4l2_captureparm = sys::zeroed();
        capture.timeperframe.numerator = interval.numerator;
        capture.timeperframe.denominator = interval.denominator;

        let mut parm: sys::v4l2_streamparm = sys::zeroed();
        parm.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        parm.parm.capture = capture;
        // SAFETY: `parm` is a valid `v4l2_streamparm`.
        unsafe { sys::vidioc_s_parm(self.fd, &mut parm) }?;
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut req: sys::v4l2_requestbuffers = sys::zeroed();
        req.count = count;
        req.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        req.memory = sys::MEMORY_MMAP;
        // SAFETY: `req` is a valid `v4l2_requestbuffers`.
        unsafe { sys::vidioc_reqbufs(self.fd, &mut req) }?;
        Ok(req.count)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let mut buf = mmap_buffer(index);
        // SAFETY: `buf` is a valid `v4l2_buffer`.
        unsafe { sys::vidioc_querybuf(self.fd, &mut buf) }?;
        Ok(BufferInfo {
            index,
            length: buf.length,
            // SAFETY: `offset` is the member set for `V4L2_MEMORY_MMAP`.
            offset: unsafe { buf.m.offset },
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MmapRegion> {
        let len = info.length as usize;
        let offset = libc::off_t::try_from(info.offset)
            .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;
        // SAFETY: maps a driver buffer at the offset it reported; the result
        // is checked before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))?;
        Ok(MmapRegion { ptr, len })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buf = mmap_buffer(index);
        // SAFETY: `buf` is a valid `v4l2_buffer`.
        unsafe { sys::vidioc_qbuf(self.fd, &mut buf) }?;
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut buf = mmap_buffer(0);
        // SAFETY: `buf` is a valid `v4l2_buffer`.
        unsafe { sys::vidioc_dqbuf(self.fd, &mut buf) }?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let timestamp = Duration::new(
            buf.timestamp.tv_sec.max(0) as u64,
            (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000),
        );
        Ok(DequeuedBuffer {
            index: buf.index,
            bytes_used: buf.bytesused,
            sequence: buf.sequence,
            timestamp,
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let typ = sys::STREAM_TYPE_VIDEO_CAPTURE;
        // SAFETY: the kernel reads one `int`.
        unsafe { sys::vidioc_streamon(self.fd, &typ) }?;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let typ = sys::STREAM_TYPE_VIDEO_CAPTURE;
        // SAFETY: the kernel reads one `int`.
        unsafe { sys::vidioc_streamoff(self.fd, &typ) }?;
        Ok(())
    }

    fn enum_format(&mut self, index: u32) -> io::Result<FormatDescription> {
        let mut desc: sys::v4l2_fmtdesc = sys::zeroed();
        desc.index = index;
        desc.type_ = sys::BUF_TYPE_VIDEO_CAPTURE;
        // SAFETY: `desc` is a valid `v4l2_fmtdesc`.
        unsafe { sys::vidioc_enum_fmt(self.fd, &mut desc) }?;
        Ok(FormatDescription {
            index,
            fourcc: FourCC::from_u32(desc.pixelformat),
            description: sys::c_string(&desc.description),
            compressed: desc.flags & sys::FMT_FLAG_COMPRESSED != 0,
            emulated: desc.flags & sys::FMT_FLAG_EMULATED != 0,
        })
    }

    fn enum_frame_size(&mut self, fourcc: FourCC, index: u32) -> io::Result<FrameSize> {
        let mut size: sys::v4l2_frmsizeenum = sys::zeroed();
        size.index = index;
        size.pixel_format = fourcc.to_u32();
        // SAFETY: `size` is a valid `v4l2_frmsizeenum`.
        unsafe { sys::vidioc_enum_framesizes(self.fd, &mut size) }?;

        let frmsize = size.__bindgen_anon_1;
        // SAFETY: `type_` selects the union member the kernel filled.
        Ok(unsafe {
            if size.type_ == sys::FRMSIZE_TYPE_DISCRETE {
                let d = frmsize.discrete;
                FrameSize::Discrete {
                    width: d.width,
                    height: d.height,
                }
            } else {
                let s = frmsize.stepwise;
                FrameSize::Stepwise {
                    min_width: s.min_width,
                    max_width: s.max_width,
                    step_width: s.step_width,
                    min_height: s.min_height,
                    max_height: s.max_height,
                    step_height: s.step_height,
                }
            }
        })
    }

    fn enum_frame_interval(
        &mut self,
        fourcc: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> io::Result<FrameInterval> {
        let mut ival: sys::v4l2_frmivalenum = sys::zeroed();
        ival.index = index;
        ival.pixel_format = fourcc.to_u32();
        ival.width = width;
        ival.height = height;
        // SAFETY: `ival` is a valid `v4l2_frmivalenum`.
        unsafe { sys::vidioc_enum_frameintervals(self.fd, &mut ival) }?;

        let frmival = ival.__bindgen_anon_1;
        // SAFETY: `type_` selects the union member the kernel filled.
        Ok(unsafe {
            if ival.type_ == sys::FRMIVAL_TYPE_DISCRETE {
                FrameInterval::Discrete(to_interval(frmival.discrete))
            } else {
                let s = frmival.stepwise;
                FrameInterval::Stepwise {
                    min: to_interval(s.min),
                    max: to_interval(s.max),
                    step: to_interval(s.step),
                }
            }
        })
    }

    fn query_control(&mut self, id: u32) -> io::Result<ControlInfo> {
        let mut query: sys::v4l2_queryctrl = sys::zeroed();
        query.id = id;
        // SAFETY: `query` is a valid `v4l2_queryctrl`.
        unsafe { sys::vidioc_queryctrl(self.fd, &mut query) }?;
        Ok(ControlInfo {
            id: query.id,
            kind: query.type_,
            name: sys::c_string(&query.name),
            minimum: query.minimum,
            maximum: query.maximum,
            step: query.step,
            default_value: query.default_value,
            flags: query.flags,
        })
    }

    fn query_menu(&mut self, id: u32, index: u32, kind: ControlType) -> io::Result<MenuItem> {
        let mut menu: sys::v4l2_querymenu = sys::zeroed();
        menu.id = id;
        menu.index = index;
        // SAFETY: `menu` is a valid `v4l2_querymenu`.
        unsafe { sys::vidioc_querymenu(self.fd, &mut menu) }?;

        // Copied out of the packed struct before reading the union.
        let item = menu.__bindgen_anon_1;
        // SAFETY: integer menus fill `value`, every other menu fills `name`.
        Ok(unsafe {
            if kind == ControlType::IntegerMenu {
                MenuItem::Value(item.value)
            } else {
                MenuItem::Name(sys::c_string(&item.name))
            }
        })
    }

    fn control(&mut self, id: u32) -> io::Result<i32> {
        let mut ctrl: sys::v4l2_control = sys::zeroed();
        ctrl.id = id;
        // SAFETY: `ctrl` is a valid `v4l2_control`.
        unsafe { sys::vidioc_g_ctrl(self.fd, &mut ctrl) }?;
        Ok(ctrl.value)
    }

    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        let mut ctrl: sys::v4l2_control = sys::zeroed();
        ctrl.id = id;
        ctrl.value = value;
        // SAFETY: `ctrl` is a valid `v4l2_control`.
        unsafe { sys::vidioc_s_ctrl(self.fd, &mut ctrl) }?;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        // SAFETY: `fd` is owned by this driver and still open.
        if unsafe { libc::close(self.fd) } == 0 {
            self.closed = true;
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            // The descriptor is released even when close reports an error.
            self.closed = true;
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_device() {
        let result = V4l2Camera::open("/dev/nonexistent-video-device");
        assert!(matches!(result, Err(CameraError::Open { .. })));
    }

    #[test]
    fn test_open_error_keeps_path() {
        let err = V4l2Camera::open("/nonexistent/video0")
            .err()
            .expect("open should fail");
        assert!(matches!(
            &err,
            CameraError::Open { path, .. } if path == Path::new("/nonexistent/video0")
        ));
        assert_eq!(
            err.os_error().map(io::Error::kind),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_wait_readable_times_out() {
        let mut fds = [0; 2];
        // SAFETY: `fds` has room for the two descriptors `pipe` writes.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let ready = wait_readable(fds[0], Duration::from_millis(10)).expect("poll should succeed");
        assert!(!ready);

        // SAFETY: writes one byte from a valid buffer to the pipe.
        assert_eq!(unsafe { libc::write(fds[1], b"x".as_ptr().cast(), 1) }, 1);
        let ready = wait_readable(fds[0], Duration::from_millis(10)).expect("poll should succeed");
        assert!(ready);

        for fd in fds {
            // SAFETY: both descriptors were opened above.
            unsafe { libc::close(fd) };
        }
    }

    #[test]
    fn test_list_devices_does_not_fail() {
        for node in list_devices() {
            assert!(node.path.starts_with("/dev"));
        }
    }
}

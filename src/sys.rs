//! ioctl wrappers for the V4L2 requests used by
//! [`V4l2Driver`](crate::device::V4l2Driver).
//!
//! Struct layouts come from the `videodev2.h` bindings that `v4l` re-exports.

#![allow(unsafe_code)]

use std::mem;

pub use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_control, v4l2_crop, v4l2_cropcap, v4l2_fmtdesc,
    v4l2_format, v4l2_fract, v4l2_frmivalenum, v4l2_frmsizeenum, v4l2_pix_format,
    v4l2_captureparm, v4l2_queryctrl, v4l2_querymenu, v4l2_rect, v4l2_requestbuffers,
    v4l2_streamparm,
};

pub const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
/// `BUF_TYPE_VIDEO_CAPTURE` as the `int` taken by stream on/off.
pub const STREAM_TYPE_VIDEO_CAPTURE: libc::c_int = 1;
pub const MEMORY_MMAP: u32 = 1;
pub const FIELD_NONE: u32 = 1;

pub const FMT_FLAG_COMPRESSED: u32 = 0x0001;
pub const FMT_FLAG_EMULATED: u32 = 0x0002;

pub const FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const FRMIVAL_TYPE_DISCRETE: u32 = 1;

const VIDIOC: u8 = b'V';

/// Zero-initialise a plain-old-data kernel struct.
pub fn zeroed<T: Pod>() -> T {
    // SAFETY: `Pod` is only implemented for the integer, array and union
    // kernel structs below, for which all-zero bytes is a valid value.
    unsafe { mem::zeroed() }
}

/// Kernel structs that may be zero-initialised.
pub trait Pod {}

impl Pod for v4l2_capability {}
impl Pod for v4l2_cropcap {}
impl Pod for v4l2_crop {}
impl Pod for v4l2_rect {}
impl Pod for v4l2_format {}
impl Pod for v4l2_pix_format {}
impl Pod for v4l2_streamparm {}
impl Pod for v4l2_captureparm {}
impl Pod for v4l2_requestbuffers {}
impl Pod for v4l2_buffer {}
impl Pod for v4l2_fmtdesc {}
impl Pod for v4l2_frmsizeenum {}
impl Pod for v4l2_frmivalenum {}
impl Pod for v4l2_queryctrl {}
impl Pod for v4l2_querymenu {}
impl Pod for v4l2_control {}

/// NUL-terminated fixed-size kernel string.
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or_default()).into_owned()
}

nix::ioctl_read!(vidioc_querycap, VIDIOC, 0, v4l2_capability);
nix::ioctl_readwrite!(vidioc_enum_fmt, VIDIOC, 2, v4l2_fmtdesc);
nix::ioctl_readwrite!(vidioc_g_fmt, VIDIOC, 4, v4l2_format);
nix::ioctl_readwrite!(vidioc_s_fmt, VIDIOC, 5, v4l2_format);
nix::ioctl_readwrite!(vidioc_reqbufs, VIDIOC, 8, v4l2_requestbuffers);
nix::ioctl_readwrite!(vidioc_querybuf, VIDIOC, 9, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_qbuf, VIDIOC, 15, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, VIDIOC, 17, v4l2_buffer);
nix::ioctl_write_ptr!(vidioc_streamon, VIDIOC, 18, libc::c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, VIDIOC, 19, libc::c_int);
nix::ioctl_readwrite!(vidioc_g_parm, VIDIOC, 21, v4l2_streamparm);
nix::ioctl_readwrite!(vidioc_s_parm, VIDIOC, 22, v4l2_streamparm);
nix::ioctl_readwrite!(vidioc_g_ctrl, VIDIOC, 27, v4l2_control);
nix::ioctl_readwrite!(vidioc_s_ctrl, VIDIOC, 28, v4l2_control);
nix::ioctl_readwrite!(vidioc_queryctrl, VIDIOC, 36, v4l2_queryctrl);
nix::ioctl_readwrite!(vidioc_querymenu, VIDIOC, 37, v4l2_querymenu);
nix::ioctl_readwrite!(vidioc_cropcap, VIDIOC, 58, v4l2_cropcap);
nix::ioctl_write_ptr!(vidioc_s_crop, VIDIOC, 60, v4l2_crop);
nix::ioctl_readwrite!(vidioc_enum_framesizes, VIDIOC, 74, v4l2_frmsizeenum);
nix::ioctl_readwrite!(vidioc_enum_frameintervals, VIDIOC, 75, v4l2_frmivalenum);
